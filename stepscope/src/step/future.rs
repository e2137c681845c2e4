// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    BodyOutcome, log_unraised,
    exit::{ScopeToken, close, open, raise, unwind_through},
};
use crate::context::{
    stack::{ScopeRecord, ScopeSpec},
    with_current,
};
use pin_project_lite::pin_project;
use std::{
    future::Future,
    mem,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll},
};
use stepscope_metadata::{Failure, FailureKind};

pin_project! {
    /// A future running inside a step.
    ///
    /// Created by [`Step::run_async`](super::Step::run_async).
    ///
    /// The step's scope, together with any scopes opened inside the future and
    /// still open, is only on the current execution context while the future
    /// is being polled. Between polls it is parked inside the future, so the
    /// future can be polled on any thread.
    #[must_use = "futures do nothing unless polled"]
    pub struct StepFuture<F> {
        #[pin]
        inner: Option<F>,
        state: StepState,
    }

    impl<F> PinnedDrop for StepFuture<F> {
        fn drop(this: Pin<&mut Self>) {
            let mut this = this.project();
            let StepState::Open { token, parked } = mem::replace(this.state, StepState::Done) else {
                this.inner.set(None);
                return;
            };
            // Attach before dropping the inner future, so that steps open
            // inside it exit on top of this one.
            with_current(|cx| cx.attach(parked));
            this.inner.set(None);
            let cancelled = Failure::new(
                FailureKind::Cancelled,
                format!("step '{}' was dropped before it completed", token.title),
                None,
            );
            log_unraised(&token, close(&token, BodyOutcome::Escaping(cancelled)));
        }
    }
}

#[derive(Debug)]
enum StepState {
    NotStarted(ScopeSpec),
    Open {
        token: ScopeToken,
        // Empty while the future is being polled.
        parked: Vec<ScopeRecord>,
    },
    Done,
}

impl<F> StepFuture<F> {
    pub(super) fn new(spec: ScopeSpec, fut: F) -> Self {
        Self {
            inner: Some(fut),
            state: StepState::NotStarted(spec),
        }
    }
}

impl<F> std::fmt::Debug for StepFuture<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepFuture")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<F: Future> Future for StepFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let token = match mem::replace(this.state, StepState::Done) {
            StepState::NotStarted(spec) => open(spec),
            StepState::Open { token, parked } => {
                with_current(|cx| cx.attach(parked));
                token
            }
            StepState::Done => panic!("StepFuture polled after completion"),
        };
        let Some(inner) = this.inner.as_mut().as_pin_mut() else {
            panic!("StepFuture polled after completion");
        };

        let output = match panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => {
                // If the scope is gone, closing it later reports the fault.
                let parked = with_current(|cx| cx.detach(token.id)).unwrap_or_default();
                *this.state = StepState::Open { token, parked };
                return Poll::Pending;
            }
            Ok(Poll::Ready(output)) => output,
            Err(payload) => {
                this.inner.set(None);
                unwind_through(&token, payload)
            }
        };

        this.inner.set(None);
        raise(close(&token, BodyOutcome::Returned));
        Poll::Ready(output)
    }
}
