// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Step scopes for test code, with failure attribution that survives local
//! `catch_unwind`.
//!
//! A test is divided into named [steps](step()), which may nest. Each step is
//! reported as passed or failed when it exits. Steps created with
//! [`propagate`](Step::propagate) are marked failed if a panic is raised
//! anywhere beneath them, even when the code under test catches that panic
//! itself. [Aggregate steps](aggregate_step()) run all of their children and
//! raise one combined failure at the end.
//!
//! Reports go to the [`StepSink`](reporter::StepSink) of the current
//! [`StepSession`]. Per-step log lines and observer tracing are emitted
//! through [`tracing`](https://docs.rs/tracing), and are switched on through
//! [`StepConfig`].
//!
//! Step state is kept per thread. Async tasks that share threads should be
//! wrapped with [`in_step_context`].

mod aggregate;
pub mod config;
mod context;
pub mod errors;
mod failure;
pub mod observer;
pub mod reporter;
mod session;
mod step;

pub use aggregate::{Aggregate, AggregateStep, ChildStep, aggregate_step};
pub use config::StepConfig;
pub use context::{InStepContext, StepContextExt, in_step_context};
pub use errors::{AggregateEntry, AggregateFailure, InstrumentationFault};
pub use observer::{ObserveResultExt, observe_error};
pub use session::{SessionGuard, StepSession};
pub use step::{ScopeHandle, Step, StepFuture, step};
pub use stepscope_metadata::{
    Failure, FailureKind, ScopeId, ScopeKind, ScopeReport, ScopeStarted, ScopeStatus,
    SourceLocation,
};
