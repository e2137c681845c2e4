// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate steps.
//!
//! An aggregate step runs several child steps to completion even if some of
//! them fail, then raises a single [`AggregateFailure`] listing every child
//! that did:
//!
//! ```should_panic
//! use stepscope::aggregate_step;
//!
//! aggregate_step("check the cart").run(|agg| {
//!     agg.step("item count").run(|| assert_eq!(2 + 1, 3));
//!     agg.step("total").run(|| assert_eq!(10 * 2, 21));
//!     // Still runs, even though "total" failed.
//!     agg.step("currency").run(|| assert_eq!("EUR", "USD"));
//! });
//! ```
//!
//! Children are started through the [`Aggregate`] handle passed to the body.
//! A panic raised in the body itself, outside any child, escapes the
//! aggregate immediately. This includes a failure escaping a plain
//! [`step`](crate::step()) called directly in the body: the step is listed in
//! the aggregate's `children`, but it is not caught, and later children do not
//! run.

use crate::{
    context::{stack::ScopeSpec, with_current},
    errors::{AggregateEntry, AggregateFailure, InstrumentationFault},
    step::{ExitAction, Step, escaping_failure, raise, run_scope_inner, step},
};
use std::{
    marker::PhantomData,
    panic::{self, AssertUnwindSafe, Location},
};
use stepscope_metadata::{ScopeId, ScopeKind};
use tracing::{debug, warn};

/// Creates an aggregate step with the given title.
#[track_caller]
pub fn aggregate_step(title: impl Into<String>) -> AggregateStep {
    AggregateStep {
        spec: ScopeSpec {
            title: title.into(),
            kind: ScopeKind::AggregateStep,
            propagate: false,
            raise_on_parent: false,
            location: Location::caller().into(),
        },
    }
}

/// An aggregate step that has not been run yet.
///
/// Created by [`aggregate_step`].
#[derive(Clone, Debug)]
#[must_use = "an aggregate step does nothing until it is run"]
pub struct AggregateStep {
    spec: ScopeSpec,
}

impl AggregateStep {
    /// Runs `body` inside this aggregate step.
    ///
    /// If any child failed, the aggregate step reports, and then panics with
    /// an [`AggregateFailure`] payload.
    pub fn run<R>(self, body: impl FnOnce(&Aggregate) -> R) -> R {
        match self.try_run(body) {
            Ok(value) => value,
            Err(failure) => panic::panic_any(failure),
        }
    }

    /// Runs `body` inside this aggregate step, returning the combined failure
    /// of its children as an error instead of raising it.
    ///
    /// Panics escaping `body` outside of a child, and instrumentation faults,
    /// are still raised.
    pub fn try_run<R>(self, body: impl FnOnce(&Aggregate) -> R) -> Result<R, AggregateFailure> {
        let (value, action) = run_scope_inner(self.spec, |id| {
            body(&Aggregate {
                id,
                _not_send: PhantomData,
            })
        });
        match action {
            ExitAction::RaiseAggregate(failure) => Err(failure),
            action => {
                raise(action);
                Ok(value)
            }
        }
    }
}

/// The handle through which an aggregate step starts its children.
///
/// A failure escaping a child started through this handle is recorded, and
/// the body carries on with the next child. Instrumentation faults are the
/// exception: they are never recorded against the aggregate, and escape it
/// straight away, so children after a fault do not run and the aggregate is
/// reported [`Broken`](crate::ScopeStatus::Broken).
#[derive(Debug)]
pub struct Aggregate {
    id: ScopeId,
    _not_send: PhantomData<*const ()>,
}

impl Aggregate {
    /// Returns the id of the aggregate step.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Creates a child step.
    #[track_caller]
    pub fn step(&self, title: impl Into<String>) -> ChildStep<'_> {
        ChildStep {
            aggregate: self,
            step: step(title),
        }
    }

    /// Runs a nested aggregate step as a child.
    ///
    /// If the nested aggregate fails, its combined failure becomes one entry of
    /// this aggregate's failure, and `None` is returned.
    #[track_caller]
    pub fn aggregate<R>(
        &self,
        title: impl Into<String>,
        body: impl FnOnce(&Aggregate) -> R,
    ) -> Option<R> {
        let nested = aggregate_step(title);
        let title = nested.spec.title.clone();
        self.run_child(title, || nested.run(body))
    }

    fn run_child<R>(&self, title: String, child: impl FnOnce() -> R) -> Option<R> {
        let innermost = with_current(|cx| cx.stack.top_id());
        if innermost != Some(self.id) {
            warn!(
                "step '{title}' was started through aggregate {} while {} was the innermost \
                 scope; its failures will not be aggregated",
                self.id,
                innermost.map_or_else(|| "no scope".to_owned(), |id| id.to_string()),
            );
            return Some(child());
        }

        let payload = match panic::catch_unwind(AssertUnwindSafe(child)) {
            Ok(value) => return Some(value),
            Err(payload) => payload,
        };
        if payload.is::<InstrumentationFault>() {
            panic::resume_unwind(payload);
        }

        let failure = escaping_failure(payload.as_ref());
        debug!("aggregate {} caught failure of '{title}': {failure}", self.id);
        with_current(|cx| {
            if let Some(record) = cx.stack.get_mut(self.id) {
                record.failures.push(AggregateEntry {
                    child_title: title,
                    failure,
                });
            }
        });
        None
    }
}

/// A child step of an aggregate step.
///
/// Created by [`Aggregate::step`].
#[derive(Debug)]
#[must_use = "a step does nothing until it is run"]
pub struct ChildStep<'a> {
    aggregate: &'a Aggregate,
    step: Step,
}

impl ChildStep<'_> {
    /// See [`Step::propagate`].
    pub fn propagate(mut self, propagate: bool) -> Self {
        self.step = self.step.propagate(propagate);
        self
    }

    /// See [`Step::raise_on_parent`].
    pub fn raise_on_parent(mut self, raise_on_parent: bool) -> Self {
        self.step = self.step.raise_on_parent(raise_on_parent);
        self
    }

    /// Runs `body` as a child of the aggregate step.
    ///
    /// Returns `None` if a failure escaped the child. The failure is recorded
    /// against the aggregate, and later children still run.
    pub fn run<R>(self, body: impl FnOnce() -> R) -> Option<R> {
        let title = self.step.title().to_owned();
        let step = self.step;
        self.aggregate.run_child(title, || step.run(body))
    }
}
