use crate::trace::span::SpanRecord;
use crate::trace::{SdkTracerProvider, Span};
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;
use telepipe::trace::{SpanContext, SpanKind, Status, TraceContextExt, TraceFlags};
use telepipe::{Context, InstrumentationScope, KeyValue};

/// Starts spans on behalf of one instrumentation scope.
///
/// Cheap to clone; all clones share the provider's processors.
#[derive(Clone)]
pub struct Tracer {
    scope: InstrumentationScope,
    provider: SdkTracerProvider,
}

impl fmt::Debug for Tracer {
    /// Omitting `provider` here is necessary to avoid cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("name", &self.scope.name())
            .field("version", &self.scope.version())
            .finish()
    }
}

impl Tracer {
    pub(crate) fn new(scope: InstrumentationScope, provider: SdkTracerProvider) -> Self {
        Tracer { scope, provider }
    }

    pub(crate) fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    pub(crate) fn instrumentation_scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Starts a span as a child of the current context's span, or as a new
    /// root.
    pub fn start<T>(&self, name: T) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        Context::map_current(|cx| self.start_with_context(name, cx))
    }

    /// Starts a span as a child of the span in `parent_cx`, or as a new root
    /// when it has none.
    pub fn start_with_context<T>(&self, name: T, parent_cx: &Context) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.build_with_context(SpanBuilder::from_name(name), parent_cx)
    }

    /// Creates a [`SpanBuilder`] for a span with more options.
    pub fn span_builder<T>(&self, name: T) -> SpanBuilder
    where
        T: Into<Cow<'static, str>>,
    {
        SpanBuilder::from_name(name)
    }

    /// Starts a span from a builder under the given parent context.
    pub fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Span {
        let id_generator = self.provider.id_generator();
        let parent = parent_cx
            .span()
            .filter(|span| span.span_context().is_valid());

        let span_id = id_generator.new_span_id();
        let (trace_id, trace_flags, parent_span_id) = match parent {
            Some(parent) => {
                parent.record_child(span_id);
                let parent_context = parent.span_context();
                (
                    parent_context.trace_id(),
                    parent_context.trace_flags(),
                    Some(parent_context.span_id()),
                )
            }
            None => (id_generator.new_trace_id(), TraceFlags::SAMPLED, None),
        };

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, false);
        let record = SpanRecord {
            parent_span_id,
            span_kind: builder.span_kind.unwrap_or_default(),
            name: builder.name,
            start_time: builder.start_time.unwrap_or_else(SystemTime::now),
            attributes: builder.attributes.unwrap_or_default(),
            events: Vec::new(),
            status: Status::Unset,
        };

        let mut span = Span::new(span_context, record, self.clone());
        for processor in self.provider.span_processors() {
            processor.on_start(&mut span, parent_cx);
        }
        span
    }

    /// Runs `f` inside a new span made current for its duration.
    ///
    /// The span is ended when `f` returns or unwinds, and the previous
    /// context is restored.
    ///
    /// ```
    /// # #[cfg(feature = "testing")]
    /// # {
    /// use telepipe::trace::TraceContextExt;
    /// use telepipe_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    ///
    /// let exporter = InMemorySpanExporter::default();
    /// let provider = SdkTracerProvider::builder()
    ///     .with_simple_exporter(exporter.clone())
    ///     .build();
    /// let tracer = provider.tracer("checkout");
    ///
    /// tracer.in_span("parent", |cx| {
    ///     assert!(cx.has_active_span());
    ///     tracer.in_span("child", |_cx| {});
    /// });
    ///
    /// let spans = exporter.get_finished_spans().unwrap();
    /// assert_eq!(spans[0].name, "child");
    /// assert_eq!(spans[1].child_span_ids, vec![spans[0].span_context.span_id()]);
    /// # }
    /// ```
    pub fn in_span<T, F, N>(&self, name: N, f: F) -> T
    where
        F: FnOnce(Context) -> T,
        N: Into<Cow<'static, str>>,
    {
        let span = self.start(name);
        let cx = Context::current_with_span(span.slot());
        let _span = span;
        let _guard = cx.clone().attach();
        f(cx)
    }
}

/// Options for a span that is about to start.
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// Span name
    pub name: Cow<'static, str>,
    /// Span kind, `Internal` when unset
    pub span_kind: Option<SpanKind>,
    /// Initial attributes
    pub attributes: Option<Vec<KeyValue>>,
    /// Start time, now when unset
    pub start_time: Option<SystemTime>,
}

impl SpanBuilder {
    /// Create a new span builder from a span name
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..SpanBuilder::default()
        }
    }

    /// Assign span kind
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Assign span attributes
    pub fn with_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Assign span start time
    pub fn with_start_time<T: Into<SystemTime>>(self, start_time: T) -> Self {
        SpanBuilder {
            start_time: Some(start_time.into()),
            ..self
        }
    }

    /// Start the span in the current context.
    pub fn start(self, tracer: &Tracer) -> Span {
        Context::map_current(|cx| tracer.build_with_context(self, cx))
    }

    /// Start the span under the given parent context.
    pub fn start_with_context(self, tracer: &Tracer, parent_cx: &Context) -> Span {
        tracer.build_with_context(self, parent_cx)
    }
}
