// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The raise observer.
//!
//! Panics are observed by a process-wide panic hook, which runs at the point a
//! panic is raised, before any `catch_unwind` further up the stack gets
//! control. This is what lets a `propagate` step notice a panic that the code
//! inside it catches and discards.
//!
//! The hook is installed the first time a step is entered and chains to the
//! hook that was installed before it, so default panic output is preserved.
//! Hooks installed *after* it must chain to it in the same way, or panics will
//! stop being observed.
//!
//! `Result` errors never pass through the hook. Code that handles an error
//! inside a step, but wants the step to know about it, reports it with
//! [`observe_error`] or [`ObserveResultExt::observe_err`].

use crate::{
    context::try_with_current,
    failure::{error_chain, from_payload},
};
use std::{
    any::type_name,
    error::Error,
    panic::{self, Location, PanicHookInfo},
    sync::Once,
    thread,
};
use stepscope_metadata::{Failure, FailureKind, ScopeId, SourceLocation};
use tracing::debug;

static INSTALL: Once = Once::new();

/// Installs the panic hook that observes panics raised inside steps.
///
/// This is idempotent, and is called automatically when a step is entered.
pub fn install() {
    // take_hook panics if called while panicking. A later call will install
    // the hook instead.
    if thread::panicking() {
        return;
    }
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            on_raise(info);
            previous(info);
        }));
    });
}

fn on_raise(info: &PanicHookInfo<'_>) {
    let location = info.location().map(SourceLocation::from);
    let failure = from_payload(info.payload(), location);
    record(failure, RaiseKind::Panic);
}

/// Records a `Result` error against the steps that are observing failures in
/// the current execution context, exactly as if it had been raised as a panic.
///
/// The error is not consumed, and nothing is raised: the caller remains
/// responsible for handling it. Steps that observe the error are marked
/// failed when they exit, and re-raise it if configured to.
#[track_caller]
pub fn observe_error<E: Error + ?Sized>(error: &E) {
    let failure = Failure::new(
        FailureKind::Error {
            type_name: type_name::<E>().to_owned(),
        },
        error_chain(error),
        Some(Location::caller().into()),
    );
    record(failure, RaiseKind::Error);
}

/// Extension trait for observing the error in a [`Result`].
pub trait ObserveResultExt {
    /// Calls [`observe_error`] if `self` is an `Err`, then returns `self`
    /// unchanged.
    #[track_caller]
    fn observe_err(self) -> Self;
}

impl<T, E: Error> ObserveResultExt for Result<T, E> {
    #[track_caller]
    fn observe_err(self) -> Self {
        if let Err(error) = &self {
            observe_error(error);
        }
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RaiseKind {
    Panic,
    Error,
}

fn record(failure: Failure, kind: RaiseKind) {
    // If the context is unavailable (the thread is exiting, or the panic came
    // from inside stepscope while it held the context), nothing is recorded.
    let traced = try_with_current(|cx| {
        let attributed = cx.attribute(&failure);
        if kind == RaiseKind::Panic {
            cx.last_panic = Some(failure.clone());
        }
        let traced = !attributed.is_empty() && cx.session().config().debug_trace;
        traced.then_some(attributed)
    })
    .flatten();

    if let Some(attributed) = traced {
        debug!(
            target: "stepscope::observer",
            "observed {failure} (attributed to {})",
            display_ids(&attributed),
        );
    }
}

fn display_ids(ids: &[ScopeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
