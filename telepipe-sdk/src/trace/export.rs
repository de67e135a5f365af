//! Trace exporters
use crate::error::ExportResult;
use crate::Resource;
use std::borrow::Cow;
use std::fmt::Debug;
use std::future::Future;
use std::time::SystemTime;
use telepipe::trace::{SpanContext, SpanId, SpanKind, Status};
use telepipe::{InstrumentationScope, KeyValue};

/// Receives finished spans from a span processor and delivers them to a sink.
pub trait SpanExporter: Send + Sync + Debug + 'static {
    /// Exports a batch of finished spans.
    ///
    /// Never called concurrently for the same exporter instance. Retries, if
    /// any, are the exporter's business; a returned error is logged by the
    /// processor and the batch is dropped.
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = ExportResult> + Send;

    /// Flushes anything the exporter buffers itself.
    fn force_flush(&mut self) -> ExportResult {
        Ok(())
    }

    /// Called once when the pipeline shuts down. Later exports may fail.
    fn shutdown(&mut self) -> ExportResult {
        Ok(())
    }

    /// Set the resource describing the process for this exporter.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A finished span.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Trace id, span id and flags of the span
    pub span_context: SpanContext,
    /// Span id of the parent, `None` for a root span
    pub parent_span_id: Option<SpanId>,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span attributes
    pub attributes: Vec<KeyValue>,
    /// Span events
    pub events: Vec<SpanEvent>,
    /// Span status
    pub status: Status,
    /// Ids of the spans started as children of this one before it ended
    pub child_span_ids: Vec<SpanId>,
    /// Instrumentation scope that produced this span
    pub instrumentation_scope: InstrumentationScope,
}

impl SpanData {
    /// Duration between start and end, zero if the clock went backwards.
    pub fn duration(&self) -> std::time::Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanEvent {
    /// Event name
    pub name: Cow<'static, str>,
    /// When the event happened
    pub timestamp: SystemTime,
    /// Event attributes
    pub attributes: Vec<KeyValue>,
}
