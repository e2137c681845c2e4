// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// A process-unique identifier for a step scope.
///
/// Identifiers are allocated in increasing order as scopes are entered, so
/// within one execution context a child always has a larger id than its parent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Creates a new scope id from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value of this id.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    /// A single step.
    Step,

    /// A step that runs all of its children and fails once at the end.
    AggregateStep,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::AggregateStep => write!(f, "aggregate step"),
        }
    }
}

/// The status of a scope.
///
/// A scope is [`Running`](Self::Running) while it is open, and moves to one of
/// the terminal statuses exactly once, when it exits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeStatus {
    /// The scope is still open.
    Running,

    /// The scope exited without a failure.
    Passed,

    /// A failure escaped the scope, or was observed inside a propagating scope.
    Failed,

    /// The instrumentation itself faulted while the scope was open or closing.
    Broken,
}

impl ScopeStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns true if this status counts as a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Broken)
    }

    /// Returns the short label used in step log lines.
    pub fn log_label(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Passed => "PASS",
            Self::Failed => "FAIL",
            Self::Broken => "BROKEN",
        }
    }
}

impl fmt::Display for ScopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Broken => write!(f, "broken"),
        }
    }
}
