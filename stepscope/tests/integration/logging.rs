// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{capture_logs, catch, logging_config, recording_session};
use pretty_assertions::assert_eq;
use stepscope::{StepConfig, step};

#[test]
fn step_lines_are_logged_when_enabled() {
    let (session, _sink) = recording_session(logging_config());

    let ((), logs) = capture_logs(|| {
        session.in_scope(|| {
            step("passes").run(|| {});
            step("fails").propagate(true).run(|| {
                _ = catch(|| panic!("caught"));
            });
        })
    });

    let step_lines: Vec<_> = logs
        .lines()
        .filter(|line| line.contains("stepscope::step"))
        .map(|line| {
            let start = line.find("[STEP").expect("step line has a marker");
            let end = line.find(" caller=").expect("step line has a caller field");
            &line[start..end]
        })
        .collect();
    assert_eq!(
        step_lines,
        [
            "[STEP START] 'passes'",
            "[STEP END] 'passes' - PASS",
            "[STEP START] 'fails'",
            "[STEP END] 'fails' - FAIL",
        ]
    );
    assert!(
        logs.lines()
            .any(|line| line.contains("stepscope::observer") && line.contains("panic: caught")),
        "observer trace is logged:\n{logs}"
    );
}

#[test]
fn nothing_is_logged_by_default() {
    let (session, _sink) = recording_session(StepConfig::default());

    let ((), logs) = capture_logs(|| {
        session.in_scope(|| {
            step("quiet").propagate(true).run(|| {
                _ = catch(|| panic!("caught"));
            });
        })
    });

    assert!(!logs.contains("[STEP"), "unexpected step lines:\n{logs}");
    assert!(
        !logs.contains("stepscope::observer"),
        "unexpected observer trace:\n{logs}"
    );
}

#[test]
fn caller_location_is_a_field() {
    let (session, _sink) = recording_session(logging_config());

    let ((), logs) = capture_logs(|| session.in_scope(|| step("located").run(|| {})));

    let start_line = logs
        .lines()
        .find(|line| line.contains("[STEP START] 'located'"))
        .unwrap();
    assert!(
        start_line.contains(&format!("caller={}", file!())),
        "caller field in: {start_line}"
    );
}
