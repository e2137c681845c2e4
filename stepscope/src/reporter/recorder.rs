// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::StepSink;
use std::sync::{Mutex, MutexGuard, PoisonError};
use stepscope_metadata::{ScopeId, ScopeReport, ScopeStarted};

/// A sink that keeps events in memory.
///
/// Mostly useful in tests, and for runner integrations that render reports
/// once a test has finished.
#[derive(Debug, Default)]
pub struct RecordingSink {
    started: Mutex<Vec<ScopeStarted>>,
    finished: Mutex<Vec<ScopeReport>>,
}

impl RecordingSink {
    /// Creates a new, empty `RecordingSink`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the start events received so far, in order.
    pub fn started(&self) -> Vec<ScopeStarted> {
        lock(&self.started).clone()
    }

    /// Returns the reports received so far, in the order scopes finished.
    pub fn reports(&self) -> Vec<ScopeReport> {
        lock(&self.finished).clone()
    }

    /// Returns the first finished report with the given title.
    pub fn find(&self, title: &str) -> Option<ScopeReport> {
        lock(&self.finished)
            .iter()
            .find(|report| report.title == title)
            .cloned()
    }

    /// Rebuilds the scope tree from finished reports.
    ///
    /// Roots are scopes with no parent, or whose parent has not finished.
    /// Siblings are ordered by id, which is the order they were entered in.
    pub fn tree(&self) -> Vec<ReportNode> {
        let mut reports = self.reports();
        reports.sort_by_key(|report| report.id);
        let known: Vec<ScopeId> = reports.iter().map(|report| report.id).collect();

        let (roots, mut rest): (Vec<_>, Vec<_>) = reports.into_iter().partition(|report| {
            report
                .parent_id
                .is_none_or(|parent| known.binary_search(&parent).is_err())
        });
        roots
            .into_iter()
            .map(|report| ReportNode::build(report, &mut rest))
            .collect()
    }

    /// Discards everything recorded so far.
    pub fn clear(&self) {
        lock(&self.started).clear();
        lock(&self.finished).clear();
    }
}

impl StepSink for RecordingSink {
    fn scope_started(&self, started: &ScopeStarted) {
        lock(&self.started).push(started.clone());
    }

    fn scope_finished(&self, report: &ScopeReport) {
        lock(&self.finished).push(report.clone());
    }
}

// A panic while holding the lock can only come from a clone or a push, which
// leave the vector intact.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A finished scope together with its finished children.
#[derive(Clone, Debug)]
pub struct ReportNode {
    /// The report for this scope.
    pub report: ScopeReport,

    /// Child scopes, in the order they were entered.
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    fn build(report: ScopeReport, rest: &mut Vec<ScopeReport>) -> Self {
        let (direct, remaining): (Vec<_>, Vec<_>) = std::mem::take(rest)
            .into_iter()
            .partition(|child| child.parent_id == Some(report.id));
        *rest = remaining;
        let children = direct
            .into_iter()
            .map(|child| Self::build(child, rest))
            .collect();
        Self { report, children }
    }

    /// Returns the titles of this node and its descendants, depth first.
    pub fn titles(&self) -> Vec<&str> {
        let mut titles = vec![self.report.title.as_str()];
        for child in &self.children {
            titles.extend(child.titles());
        }
        titles
    }
}
