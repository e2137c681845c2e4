// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::{error, fmt, panic::Location};

/// A source location, captured from a panic or from a `#[track_caller]` call site.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct SourceLocation {
    /// The source file.
    pub file: String,

    /// The 1-based line number.
    pub line: u32,

    /// The 1-based column number.
    pub column: u32,
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_owned(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Where a [`Failure`] came from.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FailureKind {
    /// A panic raised by instrumented code.
    Panic,

    /// A `Result` error explicitly observed by instrumented code.
    Error {
        /// The Rust type name of the error.
        #[serde(rename = "type-name")]
        type_name: String,
    },

    /// The combined failure raised by an aggregate step.
    Aggregate,

    /// A fault in the step instrumentation itself.
    Fault,

    /// The step was cancelled before it completed, for example because its
    /// future was dropped.
    Cancelled,
}

/// A failure captured by a step: what kind it was, its message, and where it
/// was raised.
///
/// A `Failure` is also the payload used when a step re-raises an observed
/// panic, so callers catching the unwind can downcast to it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct Failure {
    /// The kind of failure.
    pub kind: FailureKind,

    /// The failure message.
    pub message: String,

    /// Where the failure was raised, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Failure {
    /// Creates a new failure.
    pub fn new(
        kind: FailureKind,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }

    /// Creates a panic failure.
    pub fn panic(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::new(FailureKind::Panic, message, location)
    }

    /// Returns true if this failure was produced by the instrumentation rather
    /// than by the code under test.
    pub fn is_fault(&self) -> bool {
        matches!(self.kind, FailureKind::Fault)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Panic => write!(f, "panic: {}", self.message),
            FailureKind::Error { type_name } => write!(f, "{type_name}: {}", self.message),
            FailureKind::Aggregate => write!(f, "{}", self.message),
            FailureKind::Fault => write!(f, "instrumentation fault: {}", self.message),
            FailureKind::Cancelled => write!(f, "cancelled: {}", self.message),
        }
    }
}

impl error::Error for Failure {}
