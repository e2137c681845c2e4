// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by stepscope.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::fmt;
use stepscope_metadata::{Failure, ScopeId};
use thiserror::Error;

/// An error that occurred while loading step configuration.
#[derive(Debug, Error)]
#[error(
    "failed to load step configuration{}",
    .config_file.as_ref().map_or_else(String::new, |path| format!(" from `{path}`"))
)]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, err: ConfigError) -> Self {
        Self { config_file, err }
    }

    /// Returns the configuration file being read, if one was specified.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }
}

/// An internal invariant of the step instrumentation was violated.
///
/// A fault marks the affected scope as [`Broken`](stepscope_metadata::ScopeStatus::Broken)
/// and is never folded into an aggregate's failure list, so that instrumentation
/// bugs stay distinguishable from failures of the code under test.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum InstrumentationFault {
    /// A scope exited while another scope was the innermost open scope.
    #[error(
        "scope {id} ('{title}') exited while {} was the innermost open scope",
        .innermost.map_or_else(|| "no scope".to_owned(), |id| format!("scope {id}"))
    )]
    NestingMismatch {
        /// The scope that exited.
        id: ScopeId,
        /// Its title.
        title: String,
        /// The scope at the top of the stack when the exit happened.
        innermost: Option<ScopeId>,
    },

    /// A scope exited in an execution context that has no record of it.
    #[error("scope {id} ('{title}') exited outside the execution context it was opened in")]
    ScopeNotFound {
        /// The scope that exited.
        id: ScopeId,
        /// Its title.
        title: String,
    },
}

/// One failed child of an aggregate step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AggregateEntry {
    /// The title of the child scope.
    pub child_title: String,

    /// The failure that escaped the child.
    pub failure: Failure,
}

/// The combined failure raised by an aggregate step when one or more of its
/// children failed.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub struct AggregateFailure {
    title: String,
    failures: Vec<AggregateEntry>,
}

impl AggregateFailure {
    pub(crate) fn new(title: impl Into<String>, failures: Vec<AggregateEntry>) -> Self {
        Self {
            title: title.into(),
            failures,
        }
    }

    /// Returns the title of the aggregate step.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the failed children, in order of occurrence.
    pub fn failures(&self) -> &[AggregateEntry] {
        &self.failures
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failure(s) occurred during '{}': ",
            self.failures.len(),
            self.title
        )?;
        for (index, entry) in self.failures.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "'{}' failed: {}", entry.child_title, entry.failure)?;
        }
        Ok(())
    }
}

/// Returned by [`StepSession::install_global`](crate::session::StepSession::install_global)
/// if a global session was already installed.
#[derive(Clone, Debug, Error)]
#[error("a global step session was already installed")]
#[non_exhaustive]
pub struct SessionInstallError;
