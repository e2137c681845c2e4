// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-execution-context step state.
//!
//! Every thread owns an [`ExecutionContext`] in thread-local storage, created
//! on first use and dropped with the thread. It holds the stack of open
//! scopes, the scopes armed for observation, the last panic raised on the
//! thread, and the session scopes report to.
//!
//! Async tasks share threads, so a task that opens steps across `.await`
//! points needs a context of its own: [`in_step_context`] gives the wrapped
//! future a private context that is swapped into the thread's slot for the
//! duration of each poll.

pub(crate) mod stack;
mod task;

pub use task::{InStepContext, StepContextExt, in_step_context};

use crate::session::StepSession;
use stack::{ScopeRecord, ScopeSpec, ScopeStack};
use std::{cell::RefCell, mem};
use stepscope_metadata::{Failure, ScopeId, ScopeKind, ScopeStarted};
use tracing::warn;

thread_local! {
    static CURRENT: RefCell<ExecutionContext> = RefCell::new(ExecutionContext::new(None));
}

/// Runs `f` against the current execution context.
///
/// # Panics
///
/// Panics if called re-entrantly from within `f`. Callers must not run user
/// code, sinks or logging while the context is borrowed.
pub(crate) fn with_current<R>(f: impl FnOnce(&mut ExecutionContext) -> R) -> R {
    CURRENT.with_borrow_mut(f)
}

/// Like [`with_current`], but returns `None` instead of panicking if the
/// context is being torn down or is already borrowed.
///
/// Used from the panic hook, which may run at any point.
pub(crate) fn try_with_current<R>(f: impl FnOnce(&mut ExecutionContext) -> R) -> Option<R> {
    CURRENT
        .try_with(|cell| cell.try_borrow_mut().ok().map(|mut cx| f(&mut cx)))
        .ok()
        .flatten()
}

/// Exchanges the thread's current context with `other`.
fn swap_current(other: &mut ExecutionContext) {
    // Ignore failures: during thread teardown there is nothing to swap with.
    _ = CURRENT.try_with(|cell| {
        if let Ok(mut current) = cell.try_borrow_mut() {
            mem::swap(&mut *current, other);
        }
    });
}

/// What [`ExecutionContext::open`] hands back to the scope controller, for use
/// once the context is no longer borrowed.
#[derive(Debug)]
pub(crate) struct OpenedScope {
    pub(crate) id: ScopeId,
    pub(crate) started: ScopeStarted,
    pub(crate) propagate: bool,
    pub(crate) raise_on_parent: bool,
    pub(crate) session: StepSession,
}

/// Step state owned by one thread or task.
#[derive(Debug)]
pub(crate) struct ExecutionContext {
    pub(crate) stack: ScopeStack,
    /// Scopes that requested observation, in the order they were entered.
    pub(crate) armed: Vec<ScopeId>,
    /// The last panic raised while this context was current.
    pub(crate) last_panic: Option<Failure>,
    session: Option<StepSession>,
}

impl ExecutionContext {
    pub(crate) fn new(session: Option<StepSession>) -> Self {
        Self {
            stack: ScopeStack::default(),
            armed: Vec::new(),
            last_panic: None,
            session,
        }
    }

    /// Returns the session scopes entered now would report to.
    pub(crate) fn session(&self) -> StepSession {
        match &self.session {
            Some(session) => session.clone(),
            None => StepSession::global(),
        }
    }

    /// Returns the session explicitly bound to this context, if any.
    pub(crate) fn bound_session(&self) -> Option<&StepSession> {
        self.session.as_ref()
    }

    pub(crate) fn replace_session(&mut self, session: Option<StepSession>) -> Option<StepSession> {
        mem::replace(&mut self.session, session)
    }

    /// Opens a scope on top of the stack, linking it to its parent and arming
    /// it for observation if requested.
    pub(crate) fn open(&mut self, spec: ScopeSpec) -> OpenedScope {
        let session = self.session();
        let parent = self.stack.top_mut();
        let parent_id = parent.as_ref().map(|parent| parent.id);
        let record = ScopeRecord::new(spec, parent_id, session.clone());

        if let Some(parent) = parent
            && parent.kind == ScopeKind::AggregateStep
        {
            parent.children.push(record.id);
        }
        if record.propagate {
            self.armed.push(record.id);
        }

        let opened = OpenedScope {
            id: record.id,
            started: record.started_event(),
            propagate: record.propagate,
            raise_on_parent: record.raise_on_parent,
            session,
        };
        self.stack.push(record);
        opened
    }

    /// Pops scope `id` and disarms it, if it is the innermost open scope.
    ///
    /// Otherwise, returns the id of the innermost open scope.
    pub(crate) fn pop(&mut self, id: ScopeId) -> Result<ScopeRecord, Option<ScopeId>> {
        match self.stack.top_id() {
            Some(top) if top == id => {}
            innermost => return Err(innermost),
        }
        let record = self.stack.pop().ok_or(None)?;
        self.disarm(id);
        Ok(record)
    }

    /// Removes a scope from anywhere in the stack and disarms it.
    pub(crate) fn remove(&mut self, id: ScopeId) -> Option<ScopeRecord> {
        let record = self.stack.remove(id)?;
        self.disarm(id);
        Some(record)
    }

    /// Takes scope `id`, and every scope opened above it, off this context.
    ///
    /// Returns `None` if `id` is not open here.
    pub(crate) fn detach(&mut self, id: ScopeId) -> Option<Vec<ScopeRecord>> {
        let segment = self.stack.split_off(id)?;
        self.armed
            .retain(|armed| !segment.iter().any(|record| record.id == *armed));
        Some(segment)
    }

    /// Puts scopes taken off by [`Self::detach`] back on top of this
    /// context's stack, re-arming those that observe failures.
    pub(crate) fn attach(&mut self, segment: Vec<ScopeRecord>) {
        for record in segment {
            if record.propagate {
                self.armed.push(record.id);
            }
            self.stack.push(record);
        }
    }

    fn disarm(&mut self, id: ScopeId) {
        if let Some(index) = self.armed.iter().rposition(|armed| *armed == id) {
            self.armed.remove(index);
        }
    }

    /// Attributes a failure to every armed scope of this context.
    ///
    /// Returns the ids of the scopes the failure was recorded against.
    pub(crate) fn attribute(&mut self, failure: &Failure) -> Vec<ScopeId> {
        let mut attributed = Vec::with_capacity(self.armed.len());
        for &id in &self.armed {
            if let Some(record) = self.stack.get_mut(id) {
                record.observe(failure);
                attributed.push(id);
            }
        }
        attributed
    }

    /// Creates the context for a new task, inheriting the session bound here.
    pub(crate) fn for_task(&self) -> Self {
        Self::new(self.bound_session().cloned())
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            let open: Vec<_> = self.stack.ids().map(|id| id.to_string()).collect();
            warn!(
                "execution context dropped with {} step scope(s) still open: {}",
                self.stack.len(),
                open.join(", ")
            );
        }
    }
}
