use crate::Context;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

pin_project! {
    /// A future that runs with a [`Context`] attached.
    ///
    /// The context is attached before each poll of the inner future and
    /// detached as soon as that poll returns, so it never leaks onto other
    /// tasks sharing the worker thread.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        otel_cx: Context,
    }
}

impl<T> WithContext<T> {
    /// The context this future attaches while polling.
    pub fn context(&self) -> &Context {
        &self.otel_cx
    }
}

impl<T: Future> Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.otel_cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

/// Extension trait allowing futures to be run with a [`Context`].
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this type, returning a
    /// `WithContext` wrapper.
    fn with_context(self, otel_cx: Context) -> WithContext<Self> {
        WithContext {
            inner: self,
            otel_cx,
        }
    }

    /// Attaches the current [`Context`] to this type.
    ///
    /// Use this before handing a future to another task so it keeps the
    /// caller's trace.
    fn with_current_context(self) -> WithContext<Self> {
        self.with_context(Context::current())
    }
}

impl<T: Sized> FutureExt for T {}
