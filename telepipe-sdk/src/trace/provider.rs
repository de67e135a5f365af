//! # Trace Provider SDK
//!
//! The [`SdkTracerProvider`] creates [`Tracer`]s and owns the span
//! processors they share. Cloning a provider creates a new reference to the
//! same provider. Dropping the last reference shuts it down, which flushes
//! every processor; [`shutdown`](SdkTracerProvider::shutdown) does the same
//! explicitly. Spans that end after shutdown are discarded.
use crate::error::{ExportError, ExportResult};
use crate::trace::{
    BatchSpanProcessor, IdGenerator, RandomIdGenerator, SimpleSpanProcessor, SpanExporter,
    SpanProcessor, Tracer,
};
use crate::Resource;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telepipe::{otel_debug, otel_info, InstrumentationScope};

#[derive(Debug)]
struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    id_generator: Box<dyn IdGenerator>,
    resource: Resource,
    is_shutdown: AtomicBool,
}

impl TracerProviderInner {
    fn shutdown(&self) -> Vec<ExportResult> {
        self.processors
            .iter()
            .map(|processor| {
                let result = processor.shutdown();
                if let Err(err) = &result {
                    otel_debug!(
                        name: "TracerProvider.ShutdownError",
                        error = format!("{err}")
                    );
                }
                result
            })
            .collect()
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::Relaxed) {
            let _ = self.shutdown();
        }
    }
}

/// Creator of [`Tracer`]s and owner of the span processors.
#[derive(Clone, Debug)]
pub struct SdkTracerProvider {
    inner: Arc<TracerProviderInner>,
}

impl Default for SdkTracerProvider {
    fn default() -> Self {
        SdkTracerProvider::builder().build()
    }
}

impl SdkTracerProvider {
    /// Create a new [`SdkTracerProvider`] builder.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// Returns a tracer for the named instrumentation scope.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        self.tracer_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a tracer for the given instrumentation scope.
    pub fn tracer_with_scope(&self, scope: InstrumentationScope) -> Tracer {
        if scope.name().is_empty() {
            otel_info!(name: "TracerNameEmpty", message = "tracer name is empty");
        }
        Tracer::new(scope, self.clone())
    }

    /// The resource attached to exported spans.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub(crate) fn span_processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn id_generator(&self) -> &dyn IdGenerator {
        self.inner.id_generator.as_ref()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Exports every span buffered by the processors, blocking until done.
    pub fn force_flush(&self) -> ExportResult {
        if self.is_shutdown() {
            return Err(ExportError::AlreadyShutdown);
        }
        collect_errors(
            self.span_processors()
                .iter()
                .map(|processor| processor.force_flush())
                .collect(),
        )
    }

    /// Flushes and shuts down every processor. A second call returns
    /// [`ExportError::AlreadyShutdown`].
    pub fn shutdown(&self) -> ExportResult {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExportError::AlreadyShutdown);
        }
        collect_errors(self.inner.shutdown())
    }
}

fn collect_errors(results: Vec<ExportResult>) -> ExportResult {
    let errors: Vec<String> = results
        .into_iter()
        .filter_map(Result::err)
        .map(|err| err.to_string())
        .collect();
    match errors.as_slice() {
        [] => Ok(()),
        _ => Err(ExportError::Failed(errors.join("; "))),
    }
}

/// Builder for [`SdkTracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    resource: Option<Resource>,
}

impl TracerProviderBuilder {
    /// Adds a [`SimpleSpanProcessor`] exporting each span as it ends.
    ///
    /// Processors are invoked in the order they are added.
    pub fn with_simple_exporter<E: SpanExporter>(self, exporter: E) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(exporter))
    }

    /// Adds a [`BatchSpanProcessor`] configured from the `OTEL_BSP_*`
    /// environment variables.
    pub fn with_batch_exporter<E: SpanExporter>(self, exporter: E) -> Self {
        self.with_span_processor(BatchSpanProcessor::builder(exporter).build())
    }

    /// Adds a custom span processor.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Sets the id generator, [`RandomIdGenerator`] by default.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Sets the resource handed to every exporter, [`Resource::default`] when
    /// unset.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Create a new provider from this configuration.
    pub fn build(self) -> SdkTracerProvider {
        let resource = self.resource.unwrap_or_default();
        let mut processors = self.processors;
        for processor in &mut processors {
            processor.set_resource(&resource);
        }

        SdkTracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors,
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Box::new(RandomIdGenerator::default())),
                resource,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
