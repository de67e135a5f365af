//! Execution-scoped context propagation.
//!
//! A [`Context`] is an immutable bag of values (the active span, baggage, and
//! arbitrary typed entries) that belongs to one logical request. Each thread
//! keeps a stack of contexts; [`attach`] pushes a frame and returns a
//! [`ContextToken`], [`detach`] pops exactly that frame and restores the one
//! below it.
//!
//! Prefer the scoped forms, which guarantee the pop on every exit path:
//!
//! * [`Context::attach`] returns a [`ContextGuard`] that detaches on drop.
//! * [`FutureExt::with_context`] attaches around every poll of a future.
//!
//! ```
//! use telepipe::Context;
//!
//! #[derive(Debug, PartialEq)]
//! struct RequestId(u64);
//!
//! let cx = Context::new().with_value(RequestId(7));
//! {
//!     let _guard = cx.attach();
//!     assert_eq!(Context::current().get::<RequestId>(), Some(&RequestId(7)));
//! }
//! assert_eq!(Context::current().get::<RequestId>(), None);
//! ```
use crate::otel_error;
use crate::trace::ContextSpan;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

mod future_ext;
pub use future_ext::{FutureExt, WithContext};

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

/// Errors raised while manipulating the current-context stack.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContextError {
    /// A token was detached while it was not the top frame of the stack,
    /// meaning a previous attach was never paired with its detach.
    #[error("context stack corruption: token {token} detached while {top:?} is the current frame")]
    StackCorruption {
        /// The frame the caller tried to detach.
        token: u64,
        /// The frame that is actually on top, if any.
        top: Option<u64>,
    },
}

/// An execution-scoped collection of values.
///
/// Contexts are immutable; every `with_*` method returns a new context that
/// shares unchanged entries with the original.
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span: Option<Arc<ContextSpan>>,
    entries: Option<Arc<EntryMap>>,
}

type EntryMap = HashMap<TypeId, Arc<dyn Any + Sync + Send>>;

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Self::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value.
    ///
    /// Avoids the clone performed by [`Context::current`].
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|stack| f(&stack.borrow().current))
    }

    /// Returns a clone of the current thread's context with the given value.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        Self::map_current(|cx| cx.with_value(value))
    }

    /// Returns a reference to the entry for the corresponding value type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()?
            .get(&TypeId::of::<T>())?
            .downcast_ref()
    }

    /// Returns a copy of the context with the new value included, replacing
    /// any previous value of the same type.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut entries = self
            .entries
            .as_ref()
            .map(|entries| (**entries).clone())
            .unwrap_or_default();
        entries.insert(TypeId::of::<T>(), Arc::new(value));

        Context {
            span: self.span.clone(),
            entries: Some(Arc::new(entries)),
        }
    }

    /// Replaces the current context on this thread until the returned guard is
    /// dropped.
    ///
    /// Guards must be dropped in the reverse order they were created; dropping
    /// a guard out of order is reported as an internal error and leaves the
    /// stack untouched.
    pub fn attach(self) -> ContextGuard {
        ContextGuard {
            token: Some(attach(self)),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Context");
        match &self.span {
            Some(span) => dbg.field("span", span.span_context()),
            None => dbg.field("span", &"None"),
        };
        dbg.field("entries", &self.entries.as_ref().map_or(0, |e| e.len()))
            .finish()
    }
}

/// Identifies one frame pushed by [`attach`].
///
/// A token is consumed by [`detach`] and cannot leave the thread that created
/// it.
#[derive(Debug, PartialEq, Eq)]
pub struct ContextToken {
    id: u64,
    // ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl ContextToken {
    /// The frame id this token restores on detach.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Pushes `cx` as the current context of this thread.
pub fn attach(cx: Context) -> ContextToken {
    let id = CURRENT_CONTEXT.with(|stack| stack.borrow_mut().push(cx));
    ContextToken {
        id,
        _marker: PhantomData,
    }
}

/// Pops the frame identified by `token`, restoring the context that was
/// current when it was attached.
///
/// Fails with [`ContextError::StackCorruption`] when `token` is not the most
/// recently attached live frame; the stack is left unchanged in that case.
pub fn detach(token: ContextToken) -> Result<(), ContextError> {
    CURRENT_CONTEXT.with(|stack| stack.borrow_mut().pop(token.id))
}

/// A guard that restores the previous context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    token: Option<ContextToken>,
}

impl ContextGuard {
    /// Detaches now, reporting a corrupted stack to the caller instead of the
    /// internal log.
    pub fn detach(mut self) -> Result<(), ContextError> {
        match self.token.take() {
            Some(token) => detach(token),
            None => Ok(()),
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(err) = detach(token) {
                otel_error!(
                    name: "Context.DetachFailed",
                    error = format!("{err}")
                );
            }
        }
    }
}

struct Frame {
    id: u64,
    prior: Context,
}

/// The per-thread stack of attached contexts.
///
/// `current` is the top of the stack; `frames` holds what each attach
/// replaced, tagged with the id handed out in its token.
struct ContextStack {
    current: Context,
    frames: Vec<Frame>,
    next_id: u64,
}

impl ContextStack {
    const INITIAL_CAPACITY: usize = 8;

    fn push(&mut self, cx: Context) -> u64 {
        self.next_id += 1;
        let prior = std::mem::replace(&mut self.current, cx);
        self.frames.push(Frame {
            id: self.next_id,
            prior,
        });
        self.next_id
    }

    fn pop(&mut self, id: u64) -> Result<(), ContextError> {
        match self.frames.last() {
            Some(top) if top.id == id => {
                if let Some(frame) = self.frames.pop() {
                    self.current = frame.prior;
                }
                Ok(())
            }
            top => Err(ContextError::StackCorruption {
                token: id,
                top: top.map(|frame| frame.id),
            }),
        }
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current: Context::default(),
            frames: Vec::with_capacity(ContextStack::INITIAL_CAPACITY),
            next_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId};
    use std::sync::Barrier;
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct ValueA(u64);
    #[derive(Debug, PartialEq)]
    struct ValueB(u64);

    fn span_cx(trace: u128, span: u64) -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from(trace),
            SpanId::from(span),
            TraceFlags::SAMPLED,
            true,
        ))
    }

    #[test]
    fn context_immutable() {
        let cx = Context::new();
        assert_eq!(cx.get::<ValueA>(), None);

        let cx_new = cx.with_value(ValueA(1));
        assert_eq!(cx.get::<ValueA>(), None);
        assert_eq!(cx_new.get::<ValueA>(), Some(&ValueA(1)));

        let cx_replaced = cx_new.with_value(ValueA(2));
        assert_eq!(cx_new.get::<ValueA>(), Some(&ValueA(1)));
        assert_eq!(cx_replaced.get::<ValueA>(), Some(&ValueA(2)));
    }

    #[test]
    fn nested_guards_restore_in_order() {
        let _outer = Context::new().with_value(ValueA(1)).attach();
        assert_eq!(Context::current().get(), Some(&ValueA(1)));
        {
            let _inner = Context::current_with_value(ValueB(2)).attach();
            let current = Context::current();
            assert_eq!(current.get(), Some(&ValueA(1)));
            assert_eq!(current.get(), Some(&ValueB(2)));
        }
        assert_eq!(Context::current().get::<ValueB>(), None);
        assert_eq!(Context::current().get(), Some(&ValueA(1)));
    }

    #[test]
    fn attach_then_detach_restores_prior_frame() {
        let before = Context::map_current(|cx| cx.get::<ValueA>().is_none());
        assert!(before);

        let token = attach(Context::new().with_value(ValueA(5)));
        assert_eq!(Context::current().get(), Some(&ValueA(5)));
        detach(token).expect("top frame detaches");
        assert_eq!(Context::current().get::<ValueA>(), None);
    }

    #[test]
    fn out_of_order_detach_is_stack_corruption() {
        let first = attach(Context::new().with_value(ValueA(1)));
        let second = attach(Context::new().with_value(ValueA(2)));
        let first_id = first.id();
        let second_id = second.id();

        // `first` is not on top; nothing changes.
        let err = detach(first).unwrap_err();
        assert_eq!(
            err,
            ContextError::StackCorruption {
                token: first_id,
                top: Some(second_id),
            }
        );
        assert_eq!(Context::current().get(), Some(&ValueA(2)));

        detach(second).expect("second is the top frame");
        assert_eq!(Context::current().get(), Some(&ValueA(1)));
    }

    #[test]
    fn detach_on_empty_stack_is_stack_corruption() {
        let token = ContextToken {
            id: u64::MAX,
            _marker: PhantomData,
        };
        assert!(matches!(
            detach(token),
            Err(ContextError::StackCorruption { top: None, .. })
        ));
    }

    #[test]
    fn guard_explicit_detach() {
        let guard = Context::new().with_value(ValueA(3)).attach();
        assert!(guard.detach().is_ok());
        assert_eq!(Context::current().get::<ValueA>(), None);
    }

    #[test]
    fn guard_detaches_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = Context::new().with_value(ValueA(9)).attach();
            panic!("handler failed");
        });
        assert!(result.is_err());
        assert_eq!(Context::current().get::<ValueA>(), None);
    }

    #[test]
    fn concurrent_requests_do_not_share_frames() {
        const WORKERS: u64 = 8;
        let barrier = Arc::new(Barrier::new(WORKERS as usize));

        let handles: Vec<_> = (1..=WORKERS)
            .map(|worker| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    for round in 0..50u64 {
                        let span_id = worker * 1000 + round;
                        let token = attach(span_cx(worker as u128, span_id));
                        barrier.wait();
                        let seen = Context::map_current(|cx| {
                            cx.span().map(|span| span.span_context().span_id())
                        });
                        assert_eq!(seen, Some(SpanId::from(span_id)));
                        barrier.wait();
                        detach(token).expect("paired detach");
                        assert!(!Context::current().has_active_span());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker completes");
        }
    }
}
