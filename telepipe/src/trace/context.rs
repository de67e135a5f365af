use crate::trace::{SpanContext, SpanId};
use crate::Context;
use std::sync::{Arc, Mutex};

/// The span slot carried by a [`Context`].
///
/// It records which span is active for the request and collects the ids of
/// spans started as its children, so the owning span can report them when
/// it ends. Children are recorded by id only; the slot never owns them.
#[derive(Debug)]
pub struct ContextSpan {
    span_context: SpanContext,
    children: Mutex<Vec<SpanId>>,
}

impl ContextSpan {
    /// Create a slot for the given span.
    pub fn new(span_context: SpanContext) -> Self {
        ContextSpan {
            span_context,
            children: Mutex::new(Vec::new()),
        }
    }

    /// The identity of the active span.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Record `child` as started under this span.
    pub fn record_child(&self, child: SpanId) {
        if let Ok(mut children) = self.children.lock() {
            children.push(child);
        }
    }

    /// Ids of spans started under this span so far.
    pub fn child_span_ids(&self) -> Vec<SpanId> {
        self.children
            .lock()
            .map(|children| children.clone())
            .unwrap_or_default()
    }
}

/// Methods for storing and retrieving trace data in a [`Context`].
pub trait TraceContextExt {
    /// Returns a clone of the current context with the span slot replaced.
    fn current_with_span(span: Arc<ContextSpan>) -> Self;

    /// Returns a clone of this context with the span slot replaced.
    fn with_span(&self, span: Arc<ContextSpan>) -> Self;

    /// The span slot of this context, if a span is active.
    fn span(&self) -> Option<&Arc<ContextSpan>>;

    /// Returns whether a valid span is active in this context.
    fn has_active_span(&self) -> bool;

    /// Returns a copy of this context with a span that was propagated from a
    /// remote process as the active parent.
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self;
}

impl TraceContextExt for Context {
    fn current_with_span(span: Arc<ContextSpan>) -> Self {
        Context::map_current(|cx| cx.with_span(span))
    }

    fn with_span(&self, span: Arc<ContextSpan>) -> Self {
        let mut cx = self.clone();
        cx.span = Some(span);
        cx
    }

    fn span(&self) -> Option<&Arc<ContextSpan>> {
        self.span.as_ref()
    }

    fn has_active_span(&self) -> bool {
        self.span
            .as_ref()
            .is_some_and(|span| span.span_context().is_valid())
    }

    fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_span(Arc::new(ContextSpan::new(span_context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{TraceFlags, TraceId};

    #[test]
    fn span_slot_is_shared_between_clones() {
        let sc = SpanContext::new(TraceId::from(7u128), SpanId::from(1u64), TraceFlags::SAMPLED, false);
        let cx = Context::new().with_span(Arc::new(ContextSpan::new(sc.clone())));
        let clone = cx.clone();

        clone.span().unwrap().record_child(SpanId::from(2u64));
        clone.span().unwrap().record_child(SpanId::from(3u64));

        assert!(cx.has_active_span());
        assert_eq!(cx.span().unwrap().span_context(), &sc);
        assert_eq!(
            cx.span().unwrap().child_span_ids(),
            vec![SpanId::from(2u64), SpanId::from(3u64)]
        );
    }

    #[test]
    fn invalid_span_is_not_active() {
        let cx = Context::new().with_remote_span_context(SpanContext::empty_context());
        assert!(!cx.has_active_span());
        assert!(!Context::new().has_active_span());
    }
}
