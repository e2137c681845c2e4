// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sessions: the configuration and sink that step scopes report to.
//!
//! A scope captures the session of its execution context when it is entered
//! and reports to it when it exits, even if the context's session changes in
//! between. Sessions are looked up in this order:
//!
//! 1. The session bound to the current execution context with
//!    [`StepSession::enter`] or [`StepSession::in_scope`].
//! 2. The process-wide session set by [`StepSession::install_global`].
//! 3. [`StepConfig::global`] with a [`NullSink`].

use crate::{
    config::StepConfig,
    context::{try_with_current, with_current},
    errors::SessionInstallError,
    reporter::{NullSink, StepSink},
};
use debug_ignore::DebugIgnore;
use std::{
    marker::PhantomData,
    sync::{Arc, OnceLock},
};

static GLOBAL_SESSION: OnceLock<StepSession> = OnceLock::new();

/// A configuration and sink that step scopes report to.
///
/// Cloning a session is cheap: clones share the configuration and the sink.
#[derive(Clone, Debug)]
pub struct StepSession {
    config: Arc<StepConfig>,
    sink: DebugIgnore<Arc<dyn StepSink>>,
}

impl StepSession {
    /// Creates a new session.
    pub fn new(config: StepConfig, sink: Arc<dyn StepSink>) -> Self {
        Self {
            config: Arc::new(config),
            sink: DebugIgnore(sink),
        }
    }

    /// Creates a session with default configuration that discards reports.
    pub fn detached() -> Self {
        Self::new(StepConfig::default(), Arc::new(NullSink))
    }

    /// Returns the configuration for this session.
    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// Returns the sink for this session.
    pub fn sink(&self) -> &Arc<dyn StepSink> {
        &self.sink
    }

    /// Binds this session to the current execution context until the returned
    /// guard is dropped, at which point the previously bound session (if any)
    /// is restored.
    pub fn enter(&self) -> SessionGuard {
        let previous = with_current(|cx| cx.replace_session(Some(self.clone())));
        SessionGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }

    /// Runs `f` with this session bound to the current execution context.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Installs this session as the process-wide default.
    ///
    /// This can only be done once per process.
    pub fn install_global(self) -> Result<(), SessionInstallError> {
        GLOBAL_SESSION.set(self).map_err(|_| SessionInstallError)
    }

    /// Returns the session that a scope entered now would report to.
    pub fn current() -> Self {
        try_with_current(|cx| cx.session()).unwrap_or_else(Self::global)
    }

    /// Returns the process-wide session, falling back to the global
    /// configuration and a [`NullSink`].
    pub(crate) fn global() -> Self {
        if let Some(session) = GLOBAL_SESSION.get() {
            return session.clone();
        }
        static FALLBACK: OnceLock<StepSession> = OnceLock::new();
        FALLBACK
            .get_or_init(|| Self::new(StepConfig::global().clone(), Arc::new(NullSink)))
            .clone()
    }
}

/// Restores the previously bound session when dropped.
///
/// Returned by [`StepSession::enter`]. The guard must be dropped on the thread
/// it was created on.
#[derive(Debug)]
#[must_use = "the session is unbound as soon as the guard is dropped"]
pub struct SessionGuard {
    previous: Option<Option<StepSession>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // The context may already be gone if the thread is exiting.
            try_with_current(|cx| cx.replace_session(previous));
        }
    }
}
