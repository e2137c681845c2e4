// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Step scopes.
//!
//! A step is a named region of test code. When a step exits it is marked
//! passed or failed and reported to the current
//! [`StepSession`](crate::StepSession).
//!
//! By default, a step fails only if a panic unwinds out of it. With
//! [`propagate`](Step::propagate), a step also fails if a panic is raised
//! anywhere beneath it, even if that panic is caught before reaching the
//! step's boundary:
//!
//! ```
//! use stepscope::step;
//!
//! step("log in").propagate(true).run(|| {
//!     // The panic is caught here, but "log in" is still marked failed.
//!     let _ = std::panic::catch_unwind(|| panic!("wrong password"));
//! });
//! ```
//!
//! With [`raise_on_parent`](Step::raise_on_parent) as well, the first such
//! panic is raised again once the step has exited.
//!
//! Steps come in three forms: [`Step::run`] for closures, [`Step::enter`] for
//! a guard, and [`Step::run_async`] for futures.

mod exit;
mod future;

pub(crate) use exit::{BodyOutcome, ExitAction, escaping_failure, raise, run_scope_inner};
pub use future::StepFuture;

use crate::context::{stack::ScopeSpec, try_with_current};
use exit::{ScopeToken, close, open, run_scope};
use std::{future::Future, marker::PhantomData, panic::Location, thread};
use stepscope_metadata::{Failure, FailureKind, ScopeId, ScopeKind};
use tracing::{error, warn};

/// Creates a step with the given title.
///
/// The caller's source location is recorded in the step's report.
#[track_caller]
pub fn step(title: impl Into<String>) -> Step {
    Step {
        spec: ScopeSpec {
            title: title.into(),
            kind: ScopeKind::Step,
            propagate: false,
            raise_on_parent: false,
            location: Location::caller().into(),
        },
    }
}

/// A step that has not been entered yet.
///
/// Created by [`step`].
#[derive(Clone, Debug)]
#[must_use = "a step does nothing until it is run or entered"]
pub struct Step {
    spec: ScopeSpec,
}

impl Step {
    pub(crate) fn title(&self) -> &str {
        &self.spec.title
    }

    /// If true, a panic raised anywhere beneath this step marks it failed, even
    /// if the panic is caught before it reaches the step's boundary.
    ///
    /// Defaults to false.
    pub fn propagate(mut self, propagate: bool) -> Self {
        self.spec.propagate = propagate;
        self
    }

    /// If true, and [`propagate`](Self::propagate) is set, the first panic
    /// observed beneath this step is raised again once the step exits.
    ///
    /// Has no effect unless `propagate` is set. Defaults to false.
    pub fn raise_on_parent(mut self, raise_on_parent: bool) -> Self {
        self.spec.raise_on_parent = raise_on_parent;
        self
    }

    /// Runs `body` inside this step, and returns its value.
    ///
    /// Panics escaping `body` continue unwinding unchanged after the step has
    /// reported. If the step re-raises an observed panic, the panic payload is
    /// the observed [`Failure`].
    pub fn run<R>(self, body: impl FnOnce() -> R) -> R {
        run_scope(self.spec, |_| body())
    }

    /// Enters this step, returning a guard that exits it when dropped or when
    /// [`ScopeHandle::exit`] is called.
    pub fn enter(self) -> ScopeHandle {
        let token = open(self.spec);
        ScopeHandle {
            id: token.id,
            token: Some(token),
            _not_send: PhantomData,
        }
    }

    /// Runs `fut` inside this step.
    ///
    /// The step is entered when the returned future is first polled, and exits
    /// when `fut` completes, when it panics, or when the returned future is
    /// dropped before completion. In the last case the step is marked failed
    /// with a [`FailureKind::Cancelled`] failure.
    ///
    /// Between polls, the step and any steps still open inside `fut` are
    /// parked in the returned future, so it may be moved to and polled on
    /// another thread. Guards held across `.await` outside of a step future
    /// are not parked: tasks using them should be wrapped with
    /// [`in_step_context`](crate::in_step_context).
    pub fn run_async<F: Future>(self, fut: F) -> StepFuture<F> {
        StepFuture::new(self.spec, fut)
    }
}

/// A guard for an entered step.
///
/// Created by [`Step::enter`]. Guards must be exited or dropped in the reverse
/// order they were entered in, on the thread they were entered on.
#[derive(Debug)]
#[must_use = "the step exits as soon as the handle is dropped"]
pub struct ScopeHandle {
    id: ScopeId,
    // Taken on exit.
    token: Option<ScopeToken>,
    _not_send: PhantomData<*const ()>,
}

impl ScopeHandle {
    /// Returns the id of the step.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Exits the step.
    ///
    /// If the step re-raises an observed failure, it is returned as an `Err`
    /// instead of being raised. An instrumentation fault, for example exiting
    /// steps out of order, is also returned as an `Err`, with a failure kind of
    /// [`FailureKind::Fault`].
    pub fn exit(mut self) -> Result<(), Failure> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        match close(&token, BodyOutcome::Returned) {
            ExitAction::Continue => Ok(()),
            ExitAction::Reraise(failure) => Err(failure),
            ExitAction::RaiseAggregate(aggregate) => Err(Failure::new(
                FailureKind::Aggregate,
                aggregate.to_string(),
                None,
            )),
            ExitAction::Fault(fault) => Err(fault.to_failure(None)),
        }
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let outcome = if thread::panicking() {
            let failure = try_with_current(|cx| cx.last_panic.clone())
                .flatten()
                .unwrap_or_else(|| {
                    Failure::panic("step exited while its thread was unwinding", None)
                });
            BodyOutcome::Escaping(failure)
        } else {
            BodyOutcome::Returned
        };
        log_unraised(&token, close(&token, outcome));
    }
}

/// Logs an exit action that cannot be raised from a drop.
fn log_unraised(token: &ScopeToken, action: ExitAction) {
    match action {
        ExitAction::Continue => {}
        ExitAction::Reraise(failure) => {
            warn!(
                "step '{}' was dropped without calling exit; not re-raising {failure}",
                token.title
            );
        }
        ExitAction::RaiseAggregate(aggregate) => {
            warn!(
                "step '{}' was dropped without calling exit; not raising {aggregate}",
                token.title
            );
        }
        ExitAction::Fault(fault) => {
            error!("{fault}");
        }
    }
}
