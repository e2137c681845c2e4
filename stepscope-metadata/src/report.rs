// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Failure, ReadReportsError, ScopeId, ScopeKind, ScopeStatus, SourceLocation};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{io::BufRead, time::Duration};

/// Sent to a reporting sink when a scope is entered.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScopeStarted {
    /// The id of the scope.
    pub id: ScopeId,

    /// The human-readable title of the scope.
    pub title: String,

    /// The kind of scope.
    pub kind: ScopeKind,

    /// The enclosing scope in the same execution context, if any.
    pub parent_id: Option<ScopeId>,

    /// Where the scope was created.
    pub location: SourceLocation,

    /// When the scope was entered.
    pub started_at: DateTime<FixedOffset>,
}

/// Sent to a reporting sink when a scope exits.
///
/// Exactly one report is produced per scope, and its status is always terminal.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScopeReport {
    /// The id of the scope.
    pub id: ScopeId,

    /// The human-readable title of the scope.
    pub title: String,

    /// The kind of scope.
    pub kind: ScopeKind,

    /// The terminal status of the scope.
    pub status: ScopeStatus,

    /// The enclosing scope in the same execution context, if any.
    pub parent_id: Option<ScopeId>,

    /// Children of an aggregate step, in the order they were entered.
    ///
    /// Always empty for plain steps. Use [`Self::parent_id`] to rebuild the
    /// full tree.
    #[serde(default)]
    pub children: Vec<ScopeId>,

    /// Whether the scope observed failures that were caught before reaching
    /// its boundary.
    pub propagate: bool,

    /// Whether the scope re-raises its first observed failure on exit.
    pub raise_on_parent: bool,

    /// The failure that determined the status: the escaping failure if there
    /// was one, otherwise the first observed failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,

    /// Every failure observed while the scope was open, first cause first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observed: Vec<Failure>,

    /// Where the scope was created.
    pub location: SourceLocation,

    /// When the scope was entered.
    pub started_at: DateTime<FixedOffset>,

    /// How long the scope was open.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl ScopeReport {
    /// Returns the first observed failure, if any.
    pub fn first_observed(&self) -> Option<&Failure> {
        self.observed.first()
    }
}

/// Reads reports written one JSON object per line.
///
/// Blank lines are skipped.
pub fn read_json_lines(reader: impl BufRead) -> Result<Vec<ScopeReport>, ReadReportsError> {
    let mut reports = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(ReadReportsError::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        let report = serde_json::from_str(&line).map_err(|err| ReadReportsError::Json {
            line: index + 1,
            err,
        })?;
        reports.push(report);
    }
    Ok(reports)
}
