// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{catch, recording_session};
use pretty_assertions::assert_eq;
use std::io;
use stepscope::{
    Failure, FailureKind, ObserveResultExt, ScopeStatus, StepConfig, step,
};

#[test]
fn caught_panic_is_swallowed_but_reported() {
    let (session, sink) = recording_session(StepConfig::default());

    let value = session.in_scope(|| {
        step("A").propagate(true).run(|| {
            _ = catch(|| panic!("E1"));
            "done"
        })
    });

    assert_eq!(value, "done");
    let report = sink.find("A").unwrap();
    assert_eq!(report.status, ScopeStatus::Failed);
    assert_eq!(report.failure.unwrap().message, "E1");
}

#[test]
fn caught_panic_is_reraised_after_exit() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            step("A").propagate(true).raise_on_parent(true).run(|| {
                _ = catch(|| panic!("E1"));
            })
        })
    });

    let payload = result.unwrap_err();
    let failure = payload.downcast_ref::<Failure>().unwrap();
    assert_eq!(failure.kind, FailureKind::Panic);
    assert_eq!(failure.message, "E1");
    // The scope reported before the re-raise.
    assert_eq!(sink.reports().len(), 1);
    assert_eq!(sink.find("A").unwrap().status, ScopeStatus::Failed);
}

#[test]
fn without_propagate_caught_panics_are_ignored() {
    let (session, sink) = recording_session(StepConfig::default());

    session.in_scope(|| {
        step("A").run(|| {
            _ = catch(|| panic!("E1"));
        })
    });

    let report = sink.find("A").unwrap();
    assert_eq!(report.status, ScopeStatus::Passed);
    assert!(report.failure.is_none());
    assert!(report.observed.is_empty());
}

#[test]
fn first_cause_is_kept() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            step("A").propagate(true).raise_on_parent(true).run(|| {
                _ = catch(|| panic!("first"));
                _ = catch(|| panic!("second"));
            })
        })
    });

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<Failure>().unwrap().message, "first");

    let report = sink.find("A").unwrap();
    let observed: Vec<_> = report.observed.iter().map(|f| f.message.as_str()).collect();
    assert_eq!(observed, ["first", "second"]);
}

#[test]
fn nested_scopes_observe_the_same_first_cause() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            step("outer").propagate(true).raise_on_parent(true).run(|| {
                step("middle").run(|| {
                    step("inner").propagate(true).run(|| {
                        _ = catch(|| panic!("deep"));
                    });
                });
            })
        })
    });

    // Only the outermost scope re-raises.
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<Failure>().unwrap().message, "deep");

    for (title, status) in [
        ("inner", ScopeStatus::Failed),
        ("middle", ScopeStatus::Passed),
        ("outer", ScopeStatus::Failed),
    ] {
        let report = sink.find(title).unwrap();
        assert_eq!(report.status, status, "status of {title}");
    }
    assert_eq!(
        sink.find("inner").unwrap().failure,
        sink.find("outer").unwrap().failure,
    );
}

#[test]
fn reraise_reaches_outer_scope_once() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            step("outer").propagate(true).run(|| {
                step("inner").propagate(true).raise_on_parent(true).run(|| {
                    _ = catch(|| panic!("E1"));
                });
            })
        })
    });

    // The re-raise escapes outer unchanged, and is not observed a second time.
    assert!(result.is_err());
    let outer = sink.find("outer").unwrap();
    assert_eq!(outer.status, ScopeStatus::Failed);
    assert_eq!(outer.observed.len(), 1);
    assert_eq!(outer.failure.unwrap().message, "E1");
}

#[test]
fn escaping_panic_keeps_unwinding() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| catch(|| step("A").run(|| panic!("escapes"))));

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"escapes"));
    let report = sink.find("A").unwrap();
    assert_eq!(report.status, ScopeStatus::Failed);
    let failure = report.failure.unwrap();
    assert_eq!(failure.message, "escapes");
    assert_eq!(failure.location.unwrap().file, file!());
}

#[test]
fn observed_result_error() {
    let (session, sink) = recording_session(StepConfig::default());

    let result = session.in_scope(|| {
        catch(|| {
            step("A").propagate(true).raise_on_parent(true).run(|| {
                let read: io::Result<String> = Err(io::Error::other("missing fixture"));
                read.observe_err().unwrap_or_default()
            })
        })
    });

    let payload = result.unwrap_err();
    let failure = payload.downcast_ref::<Failure>().unwrap();
    assert!(matches!(failure.kind, FailureKind::Error { .. }), "{failure:?}");
    assert_eq!(failure.message, "missing fixture");
    assert_eq!(sink.find("A").unwrap().status, ScopeStatus::Failed);
}
