// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scope records and the per-context stack of open scopes.

use crate::{errors::AggregateEntry, session::StepSession};
use chrono::{DateTime, FixedOffset, Local};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};
use stepscope_metadata::{
    Failure, ScopeId, ScopeKind, ScopeReport, ScopeStarted, ScopeStatus, SourceLocation,
};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_scope_id() -> ScopeId {
    ScopeId::new(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Everything needed to open a scope.
#[derive(Clone, Debug)]
pub(crate) struct ScopeSpec {
    pub(crate) title: String,
    pub(crate) kind: ScopeKind,
    pub(crate) propagate: bool,
    pub(crate) raise_on_parent: bool,
    pub(crate) location: SourceLocation,
}

/// One open step or aggregate step.
#[derive(Debug)]
pub(crate) struct ScopeRecord {
    pub(crate) id: ScopeId,
    pub(crate) title: String,
    pub(crate) kind: ScopeKind,
    pub(crate) status: ScopeStatus,
    pub(crate) propagate: bool,
    pub(crate) raise_on_parent: bool,
    /// The first failure observed while this scope was armed.
    pub(crate) observed: Option<Failure>,
    /// Failures observed after the first one.
    pub(crate) later_observations: Vec<Failure>,
    pub(crate) parent: Option<ScopeId>,
    /// Child scope ids. Only populated for aggregate steps.
    pub(crate) children: Vec<ScopeId>,
    /// Failures that escaped direct children. Only populated for aggregate steps.
    pub(crate) failures: Vec<AggregateEntry>,
    pub(crate) location: SourceLocation,
    pub(crate) started_at: DateTime<FixedOffset>,
    started: Instant,
    /// The session the scope reports to, fixed at entry.
    pub(crate) session: StepSession,
}

impl ScopeRecord {
    pub(crate) fn new(spec: ScopeSpec, parent: Option<ScopeId>, session: StepSession) -> Self {
        Self {
            id: next_scope_id(),
            title: spec.title,
            kind: spec.kind,
            status: ScopeStatus::Running,
            propagate: spec.propagate,
            // raise_on_parent only has an effect on propagating scopes.
            raise_on_parent: spec.propagate && spec.raise_on_parent,
            observed: None,
            later_observations: Vec::new(),
            parent,
            children: Vec::new(),
            failures: Vec::new(),
            location: spec.location,
            started_at: Local::now().fixed_offset(),
            started: Instant::now(),
            session,
        }
    }

    /// Records an observed failure. Returns true if it became the first cause.
    pub(crate) fn observe(&mut self, failure: &Failure) -> bool {
        if self.observed.is_none() {
            self.observed = Some(failure.clone());
            true
        } else {
            self.later_observations.push(failure.clone());
            false
        }
    }

    pub(crate) fn started_event(&self) -> ScopeStarted {
        ScopeStarted {
            id: self.id,
            title: self.title.clone(),
            kind: self.kind,
            parent_id: self.parent,
            location: self.location.clone(),
            started_at: self.started_at,
        }
    }

    /// Moves the record to its terminal status and produces its report.
    ///
    /// Consuming the record guarantees the terminal transition happens once.
    pub(crate) fn finish(mut self, status: ScopeStatus, failure: Option<Failure>) -> ScopeReport {
        debug_assert!(status.is_terminal(), "finish called with {status}");
        self.status = status;

        let mut observed = Vec::with_capacity(1 + self.later_observations.len());
        observed.extend(self.observed);
        observed.extend(self.later_observations);

        ScopeReport {
            id: self.id,
            title: self.title,
            kind: self.kind,
            status: self.status,
            parent_id: self.parent,
            children: self.children,
            propagate: self.propagate,
            raise_on_parent: self.raise_on_parent,
            failure,
            observed,
            location: self.location,
            started_at: self.started_at,
            duration: self.started.elapsed(),
        }
    }
}

/// The stack of open scopes of one execution context, outermost first.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    records: Vec<ScopeRecord>,
}

impl ScopeStack {
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn top(&self) -> Option<&ScopeRecord> {
        self.records.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut ScopeRecord> {
        self.records.last_mut()
    }

    pub(crate) fn top_id(&self) -> Option<ScopeId> {
        self.top().map(|record| record.id)
    }

    pub(crate) fn get_mut(&mut self, id: ScopeId) -> Option<&mut ScopeRecord> {
        // Lookups are almost always for scopes near the top.
        self.records.iter_mut().rev().find(|record| record.id == id)
    }

    pub(crate) fn push(&mut self, record: ScopeRecord) {
        self.records.push(record);
    }

    pub(crate) fn pop(&mut self) -> Option<ScopeRecord> {
        self.records.pop()
    }

    /// Removes a record from anywhere in the stack, leaving the others in place.
    pub(crate) fn remove(&mut self, id: ScopeId) -> Option<ScopeRecord> {
        let index = self.records.iter().rposition(|record| record.id == id)?;
        Some(self.records.remove(index))
    }

    /// Removes the record `id` and every record above it, outermost first.
    pub(crate) fn split_off(&mut self, id: ScopeId) -> Option<Vec<ScopeRecord>> {
        let index = self.records.iter().rposition(|record| record.id == id)?;
        Some(self.records.split_off(index))
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.records.iter().map(|record| record.id)
    }
}
