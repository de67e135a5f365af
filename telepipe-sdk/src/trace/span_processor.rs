//! # Span Processor Interface
//!
//! Span processors are hooks invoked when a span starts and ends. They sit
//! between the [`Tracer`](crate::trace::Tracer) and a [`SpanExporter`]:
//!
//! ```ascii
//!   +-----+--------------+   +-----------------------+   +-------------------+
//!   |     |              |   |                       |   |                   |
//!   | SDK | Tracer.span()+---> (Batch)SpanProcessor  +--->    SpanExporter   |
//!   |     | Span.end()   |   | (Simple)SpanProcessor |   |                   |
//!   +-----+--------------+   +-----------------------+   +-------------------+
//! ```
use crate::batch::{BatchConfig, BatchConfigBuilder, BatchExport, BatchWorker};
use crate::error::{ExportError, ExportResult};
use crate::trace::{Span, SpanData, SpanExporter};
use crate::Resource;
use futures_executor::block_on;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use telepipe::{otel_debug, otel_warn, Context};

/// Hooks for span start and end.
pub trait SpanProcessor: Send + Sync + Debug {
    /// Called when a span starts, with the parent context it started in.
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    /// Called once when a span ends. Must not block for long; the caller is
    /// on the request path.
    fn on_end(&self, span: SpanData);

    /// Export all ended spans that have not yet been exported.
    fn force_flush(&self) -> ExportResult;

    /// Flush and release resources. Called once by the provider.
    fn shutdown(&self) -> ExportResult;

    /// Set the resource for the exporter behind this processor.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// Exports every span synchronously as it ends.
///
/// Useful for tests and debugging; request threads pay the export cost.
#[derive(Debug)]
pub struct SimpleSpanProcessor<E> {
    exporter: Mutex<E>,
    is_shutdown: AtomicBool,
}

impl<E: SpanExporter> SimpleSpanProcessor<E> {
    /// Create a new [SimpleSpanProcessor] using the provided exporter.
    pub fn new(exporter: E) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl<E: SpanExporter> SpanProcessor for SimpleSpanProcessor<E> {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            otel_debug!(name: "SimpleSpanProcessor.OnEnd.AfterShutdown");
            return;
        }
        let result = self
            .exporter
            .lock()
            .map_err(ExportError::from)
            .and_then(|exporter| block_on(exporter.export(vec![span])));
        if let Err(err) = result {
            otel_warn!(
                name: "SimpleSpanProcessor.ExportFailed",
                error = format!("{err}")
            );
        }
    }

    fn force_flush(&self) -> ExportResult {
        self.exporter.lock()?.force_flush()
    }

    fn shutdown(&self) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ExportError::AlreadyShutdown);
        }
        self.exporter.lock()?.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(exporter) = self.exporter.get_mut() {
            exporter.set_resource(resource);
        }
    }
}

/// Buffers ended spans and exports them from a dedicated thread.
///
/// The queue holds at most `max_queue_size` spans; when it is full the
/// oldest span is dropped. See [`BatchConfig`] for the export cadence.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    worker: BatchWorker<SpanData>,
}

impl BatchSpanProcessor {
    /// Creates a processor and starts its worker thread.
    pub fn new<E: SpanExporter>(exporter: E, config: BatchConfig) -> Self {
        BatchSpanProcessor {
            worker: BatchWorker::spawn("BatchSpanProcessor", SpanBatchExport(exporter), config),
        }
    }

    /// A builder with [`BatchConfigBuilder::for_spans`] as configuration.
    pub fn builder<E: SpanExporter>(exporter: E) -> BatchSpanProcessorBuilder<E> {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfigBuilder::for_spans().build(),
        }
    }

    /// Number of spans dropped because the queue was full.
    pub fn dropped_count(&self) -> usize {
        self.worker.dropped_count()
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        self.worker.push(span);
    }

    fn force_flush(&self) -> ExportResult {
        self.worker.force_flush()
    }

    fn shutdown(&self) -> ExportResult {
        self.worker.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.worker.set_resource(resource);
    }
}

/// Builder for [`BatchSpanProcessor`].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E: SpanExporter> BatchSpanProcessorBuilder<E> {
    /// Set the [`BatchConfig`].
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Build a new instance of [`BatchSpanProcessor`].
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

struct SpanBatchExport<E>(E);

impl<E: SpanExporter> BatchExport<SpanData> for SpanBatchExport<E> {
    fn export(&mut self, batch: Vec<SpanData>) -> ExportResult {
        block_on(self.0.export(batch))
    }

    fn force_flush(&mut self) -> ExportResult {
        self.0.force_flush()
    }

    fn shutdown(&mut self) -> ExportResult {
        self.0.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.0.set_resource(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SdkTracerProvider};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct FailingExporter;

    impl SpanExporter for FailingExporter {
        async fn export(&self, _batch: Vec<SpanData>) -> ExportResult {
            Err(ExportError::Failed("collector unavailable".into()))
        }
    }

    fn slow_batches() -> BatchConfig {
        BatchConfigBuilder::default()
            .with_scheduled_delay(Duration::from_secs(3600))
            .build()
    }

    #[test]
    fn simple_processor_exports_on_end() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .build();
        drop(provider.tracer("test").start("simple"));
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn simple_processor_swallows_export_errors() {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(FailingExporter)
            .build();
        drop(provider.tracer("test").start("lost"));
        provider.shutdown().unwrap();
    }

    #[test]
    fn simple_processor_shutdown_twice() {
        let processor = SimpleSpanProcessor::new(InMemorySpanExporter::default());
        processor.shutdown().unwrap();
        assert_eq!(processor.shutdown(), Err(ExportError::AlreadyShutdown));
    }

    #[test]
    fn batch_processor_exports_on_flush() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(
                BatchSpanProcessor::builder(exporter.clone())
                    .with_batch_config(slow_batches())
                    .build(),
            )
            .build();

        let tracer = provider.tracer("test");
        for name in ["a", "b", "c"] {
            drop(tracer.start(name));
        }
        assert!(exporter.get_finished_spans().unwrap().is_empty());

        provider.force_flush().unwrap();
        let names: Vec<_> = exporter
            .get_finished_spans()
            .unwrap()
            .iter()
            .map(|span| span.name.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn batch_processor_drains_on_shutdown() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(BatchSpanProcessor::new(exporter.clone(), slow_batches()))
            .build();
        drop(provider.tracer("test").start("pending"));

        provider.shutdown().unwrap();
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn batch_processor_drops_oldest_when_full() {
        let exporter = InMemorySpanExporter::default();
        let config = BatchConfigBuilder::default()
            .with_scheduled_delay(Duration::from_secs(3600))
            .with_max_queue_size(2)
            .with_max_export_batch_size(2)
            .build();
        let processor = BatchSpanProcessor::new(exporter.clone(), config);

        for name in ["1", "2", "3", "4", "5"] {
            processor.on_end(span_data(name));
        }
        processor.shutdown().unwrap();

        let exported = exporter.get_finished_spans().unwrap();
        assert_eq!(exported.last().map(|s| s.name.to_string()), Some("5".to_string()));
        assert_eq!(exported.len() + processor.dropped_count(), 5);
    }

    fn span_data(name: &'static str) -> SpanData {
        SpanData {
            span_context: telepipe::trace::SpanContext::NONE,
            parent_span_id: None,
            span_kind: Default::default(),
            name: name.into(),
            start_time: std::time::SystemTime::now(),
            end_time: std::time::SystemTime::now(),
            attributes: Vec::new(),
            events: Vec::new(),
            status: Default::default(),
            child_span_ids: Vec::new(),
            instrumentation_scope: Default::default(),
        }
    }
}
