use crate::error::{ExportError, ExportResult};
use crate::logs::{BatchLogProcessor, LogExporter, LogProcessor, SdkLogger, SimpleLogProcessor};
use crate::Resource;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telepipe::{otel_debug, otel_info, InstrumentationScope};

#[derive(Debug)]
struct LoggerProviderInner {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Resource,
    is_shutdown: AtomicBool,
}

impl LoggerProviderInner {
    fn shutdown(&self) -> Vec<ExportResult> {
        self.processors
            .iter()
            .map(|processor| {
                let result = processor.shutdown();
                if let Err(err) = &result {
                    otel_debug!(
                        name: "LoggerProvider.ShutdownError",
                        error = format!("{err}")
                    );
                }
                result
            })
            .collect()
    }
}

impl Drop for LoggerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::Relaxed) {
            let _ = self.shutdown();
        }
    }
}

/// Creator of [`SdkLogger`]s and owner of the log processors.
///
/// Cloning a provider creates a new reference to the same provider; dropping
/// the last one shuts it down.
///
/// ```
/// # #[cfg(feature = "testing")]
/// # {
/// use telepipe_sdk::logs::{InMemoryLogExporter, SdkLoggerProvider, Severity};
///
/// let exporter = InMemoryLogExporter::default();
/// let provider = SdkLoggerProvider::builder()
///     .with_simple_exporter(exporter.clone())
///     .build();
///
/// let logger = provider.logger("checkout");
/// let mut record = logger.create_log_record();
/// record.set_severity_number(Severity::Warn);
/// record.set_severity_text("WARN");
/// record.set_body("payment retried");
/// logger.emit(record);
///
/// assert_eq!(exporter.get_emitted_logs().unwrap().len(), 1);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SdkLoggerProvider {
    inner: Arc<LoggerProviderInner>,
}

impl Default for SdkLoggerProvider {
    fn default() -> Self {
        SdkLoggerProvider::builder().build()
    }
}

impl SdkLoggerProvider {
    /// Create a new [`SdkLoggerProvider`] builder.
    pub fn builder() -> LoggerProviderBuilder {
        LoggerProviderBuilder::default()
    }

    /// Returns a logger for the named instrumentation scope.
    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> SdkLogger {
        self.logger_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a logger for the given instrumentation scope.
    pub fn logger_with_scope(&self, scope: InstrumentationScope) -> SdkLogger {
        if scope.name().is_empty() {
            otel_info!(name: "LoggerNameEmpty", message = "logger name is empty");
        }
        SdkLogger::new(scope, self.clone())
    }

    /// The resource attached to exported records.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub(crate) fn log_processors(&self) -> &[Box<dyn LogProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Exports every record buffered by the processors, blocking until done.
    pub fn force_flush(&self) -> ExportResult {
        if self.is_shutdown() {
            return Err(ExportError::AlreadyShutdown);
        }
        collect_errors(
            self.log_processors()
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

/// Builder for [`SdkLoggerProvider`].
#[derive(Debug, Default)]
pub struct LoggerProviderBuilder {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Option<Resource>,
}

impl LoggerProviderBuilder {
    /// Adds a [`SimpleLogProcessor`] exporting each record as it is emitted.
    ///
    /// Processors are invoked in the order they are added.
    pub fn with_simple_exporter<E: LogExporter>(self, exporter: E) -> Self {
        self.with_log_processor(SimpleLogProcessor::new(exporter))
    }

    /// Adds a [`BatchLogProcessor`] configured from the `OTEL_BLRP_*`
    /// environment variables.
    pub fn with_batch_exporter<E: LogExporter>(self, exporter: E) -> Self {
        self.with_log_processor(BatchLogProcessor::builder(exporter).build())
    }

    /// Adds a custom log processor.
    pub fn with_log_processor<P: LogProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Sets the resource handed to every exporter, [`Resource::default`] when
    /// unset.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Create a new provider from this configuration.
    pub fn build(self) -> SdkLoggerProvider {
        let resource = self.resource.unwrap_or_default();
        let mut processors = self.processors;
        for processor in &mut processors {
            processor.set_resource(&resource);
        }

        SdkLoggerProvider {
            inner: Arc::new(LoggerProviderInner {
                processors,
                resource,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{InMemoryLogExporter, LogData};
    use std::sync::atomic::AtomicUsize;
    use telepipe::{Key, Value};

    #[derive(Debug, Default)]
    struct CountingProcessor {
        emitted: Arc<AtomicUsize>,
        shut_down: Arc<AtomicUsize>,
    }

    impl LogProcessor for CountingProcessor {
        fn emit(&self, _data: LogData) {
            self.emitted.fetch_add(1, Ordering::SeqCst);
        }

        fn force_flush(&self) -> ExportResult {
            Ok(())
        }

        fn shutdown(&self) -> ExportResult {
            self.shut_down.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn every_processor_sees_every_record() {
        let first = InMemoryLogExporter::default();
        let second = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(first.clone())
            .with_simple_exporter(second.clone())
            .build();

        let logger = provider.logger("test");
        logger.emit(logger.create_log_record());

        assert_eq!(first.get_emitted_logs().unwrap().len(), 1);
        assert_eq!(second.get_emitted_logs().unwrap().len(), 1);
    }

    #[test]
    fn resource_reaches_exporter() {
        let exporter = InMemoryLogExporter::default();
        let _provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_resource(
                Resource::builder_empty()
                    .with_service_name("checkout")
                    .build(),
            )
            .build();
        assert_eq!(
            exporter.resource().get(&Key::new("service.name")),
            Some(Value::from("checkout"))
        );
    }

    #[test]
    fn drop_of_last_clone_shuts_down() {
        let processor = CountingProcessor::default();
        let shut_down = processor.shut_down.clone();
        let emitted = processor.emitted.clone();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(processor)
            .build();
        let clone = provider.clone();

        let logger = clone.logger("test");
        logger.emit(logger.create_log_record());
        drop(provider);
        drop(clone);
        assert_eq!(shut_down.load(Ordering::SeqCst), 0, "the logger still holds a reference");
        drop(logger);
        assert_eq!(shut_down.load(Ordering::SeqCst), 1);
        assert_eq!(emitted.load(Ordering::SeqCst), 1);
    }
}
