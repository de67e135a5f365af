//! # Span
//!
//! A `Span` is a single timed operation. It is mutated only by the code that
//! started it, ended exactly once (explicitly or on drop), and then handed to
//! the provider's span processors as an immutable [`SpanData`].
use crate::trace::{SpanData, SpanEvent, Tracer};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;
use telepipe::trace::{ContextSpan, SpanContext, SpanId, SpanKind, Status};
use telepipe::KeyValue;

/// Single operation within a trace.
#[derive(Debug)]
pub struct Span {
    slot: Arc<ContextSpan>,
    data: Option<SpanRecord>,
    tracer: Tracer,
}

/// Mutable state of a span that has not ended yet.
#[derive(Debug, Clone)]
pub(crate) struct SpanRecord {
    pub(crate) parent_span_id: Option<SpanId>,
    pub(crate) span_kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) events: Vec<SpanEvent>,
    pub(crate) status: Status,
}

impl Span {
    pub(crate) fn new(span_context: SpanContext, data: SpanRecord, tracer: Tracer) -> Self {
        Span {
            slot: Arc::new(ContextSpan::new(span_context)),
            data: Some(data),
            tracer,
        }
    }

    /// The span's identity.
    pub fn span_context(&self) -> &SpanContext {
        self.slot.span_context()
    }

    /// The context entry for this span. Put it into a
    /// [`Context`](telepipe::Context) with
    /// [`TraceContextExt::with_span`](telepipe::trace::TraceContextExt::with_span)
    /// to make this span the parent of spans started in that context.
    pub fn slot(&self) -> Arc<ContextSpan> {
        self.slot.clone()
    }

    /// `false` once the span has ended.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Sets a single attribute. Setting an existing key replaces its value.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(data) = self.data.as_mut() {
            match data.attributes.iter_mut().find(|kv| kv.key == attribute.key) {
                Some(existing) => existing.value = attribute.value,
                None => data.attributes.push(attribute),
            }
        }
    }

    /// Sets several attributes.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    /// Records an event at the current time.
    pub fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Records an event at the given time.
    pub fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        if let Some(data) = self.data.as_mut() {
            data.events.push(SpanEvent {
                name: name.into(),
                timestamp,
                attributes,
            });
        }
    }

    /// Records an error as an `exception` event.
    pub fn record_error(&mut self, err: &dyn std::error::Error) {
        self.add_event(
            "exception",
            vec![KeyValue::new("exception.message", err.to_string())],
        );
    }

    /// Sets the status. `Ok` is final; `Error` cannot be downgraded to `Unset`.
    pub fn set_status(&mut self, status: Status) {
        if let Some(data) = self.data.as_mut() {
            if data.status.can_be_replaced_by(&status) {
                data.status = status;
            }
        }
    }

    /// Renames the span.
    pub fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        if let Some(data) = self.data.as_mut() {
            data.name = new_name.into();
        }
    }

    /// Ends the span now. Later calls do nothing.
    pub fn end(&mut self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// Ends the span at the given time. Later calls do nothing.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        let Some(data) = self.data.take() else {
            return;
        };
        let provider = self.tracer.provider();
        if provider.is_shutdown() {
            return;
        }

        let span_data = SpanData {
            span_context: self.slot.span_context().clone(),
            parent_span_id: data.parent_span_id,
            span_kind: data.span_kind,
            name: data.name,
            start_time: data.start_time,
            end_time: timestamp.max(data.start_time),
            attributes: data.attributes,
            events: data.events,
            status: data.status,
            child_span_ids: self.slot.child_span_ids(),
            instrumentation_scope: self.tracer.instrumentation_scope().clone(),
        };

        match provider.span_processors() {
            [] => {}
            [processor] => processor.on_end(span_data),
            processors => {
                for processor in processors {
                    processor.on_end(span_data.clone());
                }
            }
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use crate::trace::{InMemorySpanExporter, SdkTracerProvider};
    use std::time::{Duration, SystemTime};
    use telepipe::trace::{SpanKind, Status};
    use telepipe::{Key, KeyValue};

    fn setup() -> (SdkTracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (provider, exporter)
    }

    #[test]
    fn end_only_once() {
        let (provider, exporter) = setup();
        let mut span = provider.tracer("test").start("once");
        span.end();
        span.end();
        drop(span);
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn drop_ends_span() {
        let (provider, exporter) = setup();
        {
            let _span = provider.tracer("test").start("dropped");
        }
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "dropped");
    }

    #[test]
    fn no_changes_after_end() {
        let (provider, exporter) = setup();
        let mut span = provider.tracer("test").start("frozen");
        span.end();
        assert!(!span.is_recording());
        span.set_attribute(KeyValue::new("late", true));
        span.update_name("renamed");
        drop(span);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "frozen");
        assert!(spans[0].attributes.is_empty());
    }

    #[test]
    fn mutations_are_exported() {
        let (provider, exporter) = setup();
        let tracer = provider.tracer("test");
        let mut span = tracer
            .span_builder("GET /")
            .with_kind(SpanKind::Server)
            .start(&tracer);
        span.set_attribute(KeyValue::new("http.route", "/"));
        span.set_attribute(KeyValue::new("http.route", "/items"));
        span.add_event("cache miss", vec![KeyValue::new("key", "item:7")]);
        span.record_error(&std::fmt::Error);
        span.set_status(Status::error("boom"));
        span.update_name("GET /items");
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        let data = &spans[0];
        assert_eq!(data.name, "GET /items");
        assert_eq!(data.span_kind, SpanKind::Server);
        assert_eq!(data.attributes, vec![KeyValue::new("http.route", "/items")]);
        assert_eq!(data.events.len(), 2);
        assert_eq!(data.events[0].name, "cache miss");
        assert_eq!(data.events[1].name, "exception");
        assert_eq!(data.events[1].attributes[0].key, Key::new("exception.message"));
        assert_eq!(data.status, Status::error("boom"));
        assert_eq!(data.parent_span_id, None);
        assert_eq!(data.instrumentation_scope.name(), "test");
    }

    #[test]
    fn status_precedence() {
        let (provider, exporter) = setup();
        let mut span = provider.tracer("test").start("status");
        span.set_status(Status::Ok);
        span.set_status(Status::error("too late"));
        span.set_status(Status::Unset);
        span.end();
        assert_eq!(exporter.get_finished_spans().unwrap()[0].status, Status::Ok);
    }

    #[test]
    fn end_time_not_before_start() {
        let (provider, exporter) = setup();
        let mut span = provider.tracer("test").start("clock");
        span.end_with_timestamp(SystemTime::UNIX_EPOCH);
        let data = &exporter.get_finished_spans().unwrap()[0];
        assert_eq!(data.end_time, data.start_time);
        assert_eq!(data.duration(), Duration::ZERO);
    }

    #[test]
    fn ended_after_shutdown_is_not_exported() {
        let (provider, exporter) = setup();
        let mut span = provider.tracer("test").start("late");
        provider.shutdown().unwrap();
        span.end();
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }
}
