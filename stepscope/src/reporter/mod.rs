// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting of step scopes as they start and finish.
//!
//! Scopes report to the [`StepSink`] of the session they were entered in.
//! This module provides:
//!
//! - [`NullSink`]: discards everything. Used when no session is configured.
//! - [`RecordingSink`]: keeps finished reports in memory, and can rebuild the
//!   scope tree from them.
//! - [`JsonLinesSink`]: writes one JSON object per finished scope, readable
//!   with [`stepscope_metadata::read_json_lines`].

mod recorder;
mod structured;

pub use recorder::*;
pub use structured::*;

use stepscope_metadata::{ScopeReport, ScopeStarted};

/// Receives step scope events.
///
/// Sinks are shared across threads and called from whichever thread a scope
/// runs on. They are never called while step state is borrowed, so a sink may
/// itself open steps, though the resulting scopes report to the same sink.
pub trait StepSink: Send + Sync {
    /// Called after a scope is entered.
    fn scope_started(&self, started: &ScopeStarted) {
        let _ = started;
    }

    /// Called once a scope has reached its terminal status, before any failure
    /// is raised out of it.
    fn scope_finished(&self, report: &ScopeReport);
}

/// A sink that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl StepSink for NullSink {
    fn scope_finished(&self, _report: &ScopeReport) {}
}
