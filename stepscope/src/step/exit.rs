// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opening and closing scopes.
//!
//! Every form of step (closure, guard, future, aggregate) goes through
//! [`open`] on entry and [`close`] exactly once on exit. `close` decides the
//! terminal status and reports it, and returns what the caller must raise.

use crate::{
    context::{ExecutionContext, stack::ScopeSpec, try_with_current, with_current},
    errors::{AggregateEntry, AggregateFailure, InstrumentationFault},
    failure::from_unwind,
    observer,
    session::StepSession,
};
use chrono::{DateTime, FixedOffset};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    time::Instant,
};
use stepscope_metadata::{
    Failure, FailureKind, ScopeId, ScopeKind, ScopeReport, ScopeStatus, SourceLocation,
};
use tracing::info;

/// Identifies an open scope to [`close`].
///
/// Unlike the scope record, which stays in its execution context, a token can
/// travel with a future across threads.
#[derive(Debug)]
pub(crate) struct ScopeToken {
    pub(crate) id: ScopeId,
    pub(crate) title: String,
    kind: ScopeKind,
    location: SourceLocation,
    started_at: DateTime<FixedOffset>,
    entered: Instant,
    propagate: bool,
    raise_on_parent: bool,
}

/// How the body of a scope finished.
#[derive(Debug)]
pub(crate) enum BodyOutcome {
    /// The body returned normally.
    Returned,

    /// A failure is escaping the body: a panic unwinding through it, or a
    /// cancellation.
    Escaping(Failure),
}

/// What the caller of [`close`] must do once the scope has reported.
#[derive(Debug)]
pub(crate) enum ExitAction {
    Continue,
    Reraise(Failure),
    RaiseAggregate(AggregateFailure),
    Fault(InstrumentationFault),
}

/// Opens a scope in the current execution context.
pub(crate) fn open(spec: ScopeSpec) -> ScopeToken {
    observer::install();

    let opened = with_current(|cx| cx.open(spec));
    let started = opened.started;
    if opened.session.config().log_steps {
        info!(
            target: "stepscope::step",
            caller = %started.location,
            "[STEP START] '{}'",
            started.title,
        );
    }
    opened.session.sink().scope_started(&started);

    ScopeToken {
        id: opened.id,
        title: started.title,
        kind: started.kind,
        location: started.location,
        started_at: started.started_at,
        entered: Instant::now(),
        propagate: opened.propagate,
        raise_on_parent: opened.raise_on_parent,
    }
}

/// Closes a scope: sets its terminal status, reports it, and returns what the
/// caller must raise.
pub(crate) fn close(token: &ScopeToken, outcome: BodyOutcome) -> ExitAction {
    let (report, session, action) = with_current(|cx| reconcile(cx, token, outcome));

    if session.config().log_steps {
        info!(
            target: "stepscope::step",
            caller = %report.location,
            "[STEP END] '{}' - {}",
            report.title,
            report.status.log_label(),
        );
    }
    session.sink().scope_finished(&report);
    action
}

fn reconcile(
    cx: &mut ExecutionContext,
    token: &ScopeToken,
    outcome: BodyOutcome,
) -> (ScopeReport, StepSession, ExitAction) {
    let mut record = match cx.pop(token.id) {
        Ok(record) => record,
        Err(innermost) => return reconcile_fault(cx, token, innermost),
    };
    let session = record.session.clone();
    let parent = record.parent;

    let (report, action) = match outcome {
        BodyOutcome::Escaping(failure) => {
            let status = if failure.is_fault() {
                ScopeStatus::Broken
            } else {
                ScopeStatus::Failed
            };
            (record.finish(status, Some(failure)), ExitAction::Continue)
        }
        BodyOutcome::Returned if !record.failures.is_empty() => {
            let aggregate =
                AggregateFailure::new(record.title.clone(), std::mem::take(&mut record.failures));
            let failure = Failure::new(
                FailureKind::Aggregate,
                aggregate.to_string(),
                Some(record.location.clone()),
            );
            (
                record.finish(ScopeStatus::Failed, Some(failure)),
                ExitAction::RaiseAggregate(aggregate),
            )
        }
        BodyOutcome::Returned => match record.observed.clone() {
            Some(observed) if record.propagate => {
                let action = if record.raise_on_parent {
                    ExitAction::Reraise(observed.clone())
                } else {
                    if session.config().aggregate_observed_failures {
                        add_to_aggregate(cx, parent, &record.title, &observed);
                    }
                    ExitAction::Continue
                };
                (record.finish(ScopeStatus::Failed, Some(observed)), action)
            }
            _ => (record.finish(ScopeStatus::Passed, None), ExitAction::Continue),
        },
    };

    (report, session, action)
}

/// Handles a scope that is not the innermost scope of the current context.
///
/// Only the scope's own record is removed; the rest of the stack is left as
/// it is.
fn reconcile_fault(
    cx: &mut ExecutionContext,
    token: &ScopeToken,
    innermost: Option<ScopeId>,
) -> (ScopeReport, StepSession, ExitAction) {
    match cx.remove(token.id) {
        Some(record) => {
            let fault = InstrumentationFault::NestingMismatch {
                id: token.id,
                title: token.title.clone(),
                innermost,
            };
            let session = record.session.clone();
            let failure = fault.to_failure(Some(token.location.clone()));
            let report = record.finish(ScopeStatus::Broken, Some(failure));
            (report, session, ExitAction::Fault(fault))
        }
        None => {
            let fault = InstrumentationFault::ScopeNotFound {
                id: token.id,
                title: token.title.clone(),
            };
            let failure = fault.to_failure(Some(token.location.clone()));
            let report = token.broken_report(failure);
            (report, cx.session(), ExitAction::Fault(fault))
        }
    }
}

/// Records a failure against the direct parent, if the parent is an
/// aggregate step.
fn add_to_aggregate(
    cx: &mut ExecutionContext,
    parent: Option<ScopeId>,
    child_title: &str,
    failure: &Failure,
) {
    let Some(parent) = parent.and_then(|id| cx.stack.get_mut(id)) else {
        return;
    };
    if parent.kind == ScopeKind::AggregateStep {
        parent.failures.push(AggregateEntry {
            child_title: child_title.to_owned(),
            failure: failure.clone(),
        });
    }
}

impl ScopeToken {
    /// Synthesizes the report of a scope whose record could not be found.
    fn broken_report(&self, failure: Failure) -> ScopeReport {
        ScopeReport {
            id: self.id,
            title: self.title.clone(),
            kind: self.kind,
            status: ScopeStatus::Broken,
            parent_id: None,
            children: Vec::new(),
            propagate: self.propagate,
            raise_on_parent: self.raise_on_parent,
            failure: Some(failure),
            observed: Vec::new(),
            location: self.location.clone(),
            started_at: self.started_at,
            duration: self.entered.elapsed(),
        }
    }
}

/// Raises whatever `action` requires.
///
/// Re-raised failures are resumed rather than panicked with, so the panic hook
/// does not observe them a second time. The hook is also what records the
/// last panic, so a re-raise records itself: guards exiting while it unwinds
/// report it as their escaping failure.
pub(crate) fn raise(action: ExitAction) {
    match action {
        ExitAction::Continue => {}
        ExitAction::Reraise(failure) => {
            try_with_current(|cx| cx.last_panic = Some(failure.clone()));
            panic::resume_unwind(Box::new(failure))
        }
        ExitAction::RaiseAggregate(aggregate) => panic::panic_any(aggregate),
        ExitAction::Fault(fault) => panic::panic_any(fault),
    }
}

/// Closes a scope that a panic is unwinding through, then continues
/// unwinding with the same payload.
///
/// If closing the scope faults, the fault is raised instead: it must never be
/// mistaken for a failure of the code under test.
pub(crate) fn unwind_through(token: &ScopeToken, payload: Box<dyn Any + Send>) -> ! {
    let failure = escaping_failure(payload.as_ref());
    match close(token, BodyOutcome::Escaping(failure)) {
        ExitAction::Fault(fault) => panic::panic_any(fault),
        _ => panic::resume_unwind(payload),
    }
}

/// Builds the failure for a payload caught in the current context.
pub(crate) fn escaping_failure(payload: &(dyn Any + Send)) -> Failure {
    let last_panic = with_current(|cx| cx.last_panic.clone());
    from_unwind(payload, last_panic.as_ref())
}

/// Runs `body` in a new scope, returning its value together with the action
/// the caller must take. Panics escaping `body` keep unwinding once the scope
/// has reported.
pub(crate) fn run_scope_inner<R>(
    spec: ScopeSpec,
    body: impl FnOnce(ScopeId) -> R,
) -> (R, ExitAction) {
    let token = open(spec);
    match panic::catch_unwind(AssertUnwindSafe(|| body(token.id))) {
        Ok(value) => {
            let action = close(&token, BodyOutcome::Returned);
            (value, action)
        }
        Err(payload) => unwind_through(&token, payload),
    }
}

/// Runs `body` in a new scope, raising whatever the scope's exit requires.
pub(crate) fn run_scope<R>(spec: ScopeSpec, body: impl FnOnce(ScopeId) -> R) -> R {
    let (value, action) = run_scope_inner(spec, body);
    raise(action);
    value
}
