// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{catch, recording_session};
use pretty_assertions::assert_eq;
use stepscope::{
    AggregateFailure, FailureKind, InstrumentationFault, ScopeKind, ScopeStatus, StepConfig,
    aggregate_step, step,
};

#[test]
fn children_run_to_completion() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            aggregate_step("G").run(|agg| {
                agg.step("c1").run(|| panic!("X"));
                agg.step("c2").run(|| {});
                agg.step("c3").run(|| panic!("Y"));
            })
        })
    });

    let payload = result.unwrap_err();
    let failure = payload.downcast_ref::<AggregateFailure>().unwrap();
    let entries: Vec<_> = failure
        .failures()
        .iter()
        .map(|entry| (entry.child_title.as_str(), entry.failure.message.as_str()))
        .collect();
    assert_eq!(entries, [("c1", "X"), ("c3", "Y")]);
    assert_eq!(
        failure.to_string(),
        "2 failure(s) occurred during 'G': 'c1' failed: panic: X; 'c3' failed: panic: Y"
    );

    for (title, status) in [
        ("c1", ScopeStatus::Failed),
        ("c2", ScopeStatus::Passed),
        ("c3", ScopeStatus::Failed),
        ("G", ScopeStatus::Failed),
    ] {
        assert_eq!(sink.find(title).unwrap().status, status, "status of {title}");
    }

    let group = sink.find("G").unwrap();
    assert_eq!(group.kind, ScopeKind::AggregateStep);
    assert_eq!(group.children.len(), 3);
    // G reports after all its children.
    assert_eq!(sink.reports().last().unwrap().title, "G");
}

#[test]
fn no_failing_children_passes() {
    let (session, sink) = recording_session(StepConfig::default());

    let value = session.in_scope(|| {
        aggregate_step("G").run(|agg| {
            let a = agg.step("a").run(|| 1).unwrap();
            let b = agg.step("b").run(|| 2).unwrap();
            a + b
        })
    });

    assert_eq!(value, 3);
    assert_eq!(sink.find("G").unwrap().status, ScopeStatus::Passed);
}

#[test]
fn reraising_child_counts() {
    let (session, _sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        aggregate_step("G").try_run(|agg| {
            agg.step("reraises")
                .propagate(true)
                .raise_on_parent(true)
                .run(|| {
                    _ = catch(|| panic!("caught then re-raised"));
                });
            agg.step("swallows").propagate(true).run(|| {
                _ = catch(|| panic!("caught and swallowed"));
            });
        })
    });

    let failure = result.unwrap_err();
    let titles: Vec<_> = failure
        .failures()
        .iter()
        .map(|entry| entry.child_title.as_str())
        .collect();
    assert_eq!(titles, ["reraises"]);
}

#[test]
fn swallowed_child_counts_when_configured() {
    let (session, sink) = recording_session(StepConfig {
        aggregate_observed_failures: true,
        ..Default::default()
    });

    let result = session.in_scope(|| {
        aggregate_step("G").try_run(|agg| {
            agg.step("swallows").propagate(true).run(|| {
                _ = catch(|| panic!("caught and swallowed"));
            });
        })
    });

    let failure = result.unwrap_err();
    assert_eq!(failure.failures().len(), 1);
    assert_eq!(failure.failures()[0].failure.message, "caught and swallowed");
    assert_eq!(sink.find("G").unwrap().status, ScopeStatus::Failed);
}

#[test]
fn nested_aggregate_is_one_entry() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        aggregate_step("outer").try_run(|outer| {
            outer.aggregate("inner", |inner| {
                inner.step("i1").run(|| panic!("one"));
                inner.step("i2").run(|| panic!("two"));
            });
            outer.step("sibling").run(|| panic!("three"));
        })
    });

    let failure = result.unwrap_err();
    assert_eq!(failure.failures().len(), 2);
    let nested = &failure.failures()[0];
    assert_eq!(nested.child_title, "inner");
    assert_eq!(nested.failure.kind, FailureKind::Aggregate);
    assert!(
        nested.failure.message.starts_with("2 failure(s) occurred during 'inner'"),
        "{}",
        nested.failure.message
    );
    assert_eq!(failure.failures()[1].child_title, "sibling");

    let outer = sink.find("outer").unwrap();
    let inner = sink.find("inner").unwrap();
    assert_eq!(inner.parent_id, Some(outer.id));
    assert_eq!(outer.children.len(), 2);
}

#[test]
fn body_panic_escapes_immediately() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            aggregate_step("G").run(|agg| {
                agg.step("c1").run(|| panic!("child"));
                panic!("body");
            })
        })
    });

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"body"));
    let group = sink.find("G").unwrap();
    assert_eq!(group.status, ScopeStatus::Failed);
    assert_eq!(group.failure.unwrap().message, "body");
}

#[test]
fn faults_are_not_aggregated() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            aggregate_step("G").run(|agg| {
                agg.step("misnested").run(|| {
                    // Leaks a guard past the end of its enclosing step.
                    std::mem::forget(step("leaked").enter());
                });
                agg.step("after").run(|| {});
            })
        })
    });

    let payload = result.unwrap_err();
    assert!(
        payload.downcast_ref::<InstrumentationFault>().is_some(),
        "the fault escaped the aggregate"
    );
    assert_eq!(sink.find("misnested").unwrap().status, ScopeStatus::Broken);
    assert!(sink.find("after").is_none(), "siblings after a fault are skipped");
    assert_eq!(sink.find("G").unwrap().status, ScopeStatus::Broken);
}

#[test]
fn plain_step_in_body_is_a_child_but_escapes() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            aggregate_step("G").run(|agg| {
                step("plain").run(|| panic!("not caught"));
                agg.step("after").run(|| {});
            })
        })
    });

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"not caught"));
    assert!(sink.find("after").is_none());
    let plain = sink.find("plain").unwrap();
    let group = sink.find("G").unwrap();
    assert_eq!(group.children, [plain.id]);
    assert_eq!(group.status, ScopeStatus::Failed);
    assert_eq!(group.failure.unwrap().message, "not caught");
}
