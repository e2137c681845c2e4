// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ExecutionContext, swap_current, with_current};
use pin_project_lite::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Runs `fut` in an execution context of its own.
///
/// Steps opened by `fut` are kept separate from steps opened by other tasks
/// that share the thread, and panics raised while `fut` is polled are only
/// attributed to `fut`'s scopes. The new context inherits the session bound
/// to the caller's context, if any.
pub fn in_step_context<F: Future>(fut: F) -> InStepContext<F> {
    let context = with_current(|cx| cx.for_task());
    InStepContext {
        inner: Some(fut),
        context,
    }
}

/// Extension trait providing [`in_step_context`] as a method on futures.
pub trait StepContextExt: Future + Sized {
    /// Runs this future in an execution context of its own.
    ///
    /// See [`in_step_context`].
    fn in_step_context(self) -> InStepContext<Self> {
        in_step_context(self)
    }
}

impl<F: Future> StepContextExt for F {}

pin_project! {
    /// A future running in an execution context of its own.
    ///
    /// Created by [`in_step_context`].
    #[must_use = "futures do nothing unless polled"]
    pub struct InStepContext<F> {
        #[pin]
        inner: Option<F>,
        context: ExecutionContext,
    }

    impl<F> PinnedDrop for InStepContext<F> {
        fn drop(this: Pin<&mut Self>) {
            let mut this = this.project();
            // Steps still open inside the future close as it is dropped, so
            // they need to see this task's context.
            let _swapped = Swapped::new(this.context);
            this.inner.set(None);
        }
    }
}

impl<F> std::fmt::Debug for InStepContext<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InStepContext")
            .field("done", &self.inner.is_none())
            .field("context", &self.context)
            .finish()
    }
}

impl<F: Future> Future for InStepContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let _swapped = Swapped::new(this.context);
        let inner = this
            .inner
            .as_mut()
            .as_pin_mut()
            .expect("InStepContext polled after completion");
        let output = std::task::ready!(inner.poll(cx));
        this.inner.set(None);
        Poll::Ready(output)
    }
}

/// Keeps a task's context in the thread slot until dropped, then puts the
/// thread's own context back.
struct Swapped<'a> {
    context: &'a mut ExecutionContext,
}

impl<'a> Swapped<'a> {
    fn new(context: &'a mut ExecutionContext) -> Self {
        swap_current(context);
        Self { context }
    }
}

impl Drop for Swapped<'_> {
    fn drop(&mut self) {
        swap_current(self.context);
    }
}
