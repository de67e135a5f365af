//! # Log Processor Interface
//!
//! Log processors sit between the [`SdkLogger`](crate::logs::SdkLogger) and
//! a [`LogExporter`]:
//!
//! ```ascii
//!   +-----+---------------+   +-----------------------+   +-------------------+
//!   |     |               |   |                       |   |                   |
//!   | SDK | Logger.emit() +---> (Batch)LogProcessor   +--->    LogExporter    |
//!   |     |               |   | (Simple)LogProcessor  |   |                   |
//!   +-----+---------------+   +-----------------------+   +-------------------+
//! ```
use crate::batch::{BatchConfig, BatchConfigBuilder, BatchExport, BatchWorker};
use crate::error::{ExportError, ExportResult};
use crate::logs::{LogData, LogExporter, Severity};
use crate::Resource;
use futures_executor::block_on;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use telepipe::{otel_debug, otel_warn};

/// Hooks for emitted log records.
pub trait LogProcessor: Send + Sync + Debug {
    /// Called for every emitted record. Must not block for long; the caller
    /// is on the request path.
    fn emit(&self, data: LogData);

    /// Whether a record of this severity would be processed at all.
    fn event_enabled(&self, _severity: Severity, _target: &str) -> bool {
        true
    }

    /// Export all records that have not yet been exported.
    fn force_flush(&self) -> ExportResult;

    /// Flush and release resources. Called once by the provider.
    fn shutdown(&self) -> ExportResult;

    /// Set the resource for the exporter behind this processor.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// Exports every record synchronously as it is emitted.
#[derive(Debug)]
pub struct SimpleLogProcessor<E> {
    exporter: Mutex<E>,
    is_shutdown: AtomicBool,
}

impl<E: LogExporter> SimpleLogProcessor<E> {
    /// Create a new [SimpleLogProcessor] using the provided exporter.
    pub fn new(exporter: E) -> Self {
        SimpleLogProcessor {
            exporter: Mutex::new(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl<E: LogExporter> LogProcessor for SimpleLogProcessor<E> {
    fn emit(&self, data: LogData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            otel_debug!(name: "SimpleLogProcessor.Emit.AfterShutdown");
            return;
        }
        let result = self
            .exporter
            .lock()
            .map_err(ExportError::from)
            .and_then(|exporter| block_on(exporter.export(vec![data])));
        if let Err(err) = result {
            otel_warn!(
                name: "SimpleLogProcessor.ExportFailed",
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

/// Buffers emitted records and exports them from a dedicated thread.
///
/// The queue holds at most `max_queue_size` records; when it is full the
/// oldest record is dropped. See [`BatchConfig`] for the export cadence.
#[derive(Debug)]
pub struct BatchLogProcessor {
    worker: BatchWorker<LogData>,
}

impl BatchLogProcessor {
    /// Creates a processor and starts its worker thread.
    pub fn new<E: LogExporter>(exporter: E, config: BatchConfig) -> Self {
        BatchLogProcessor {
            worker: BatchWorker::spawn("BatchLogProcessor", LogBatchExport(exporter), config),
        }
    }

    /// A builder with [`BatchConfigBuilder::for_logs`] as configuration.
    pub fn builder<E: LogExporter>(exporter: E) -> BatchLogProcessorBuilder<E> {
        BatchLogProcessorBuilder {
            exporter,
            config: BatchConfigBuilder::for_logs().build(),
        }
    }

    /// Number of records dropped because the queue was full.
    pub fn dropped_count(&self) -> usize {
        self.worker.dropped_count()
    }
}

impl LogProcessor for BatchLogProcessor {
    fn emit(&self, data: LogData) {
        self.worker.push(data);
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

/// Builder for [`BatchLogProcessor`].
#[derive(Debug)]
pub struct BatchLogProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E: LogExporter> BatchLogProcessorBuilder<E> {
    /// Set the [`BatchConfig`].
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchLogProcessorBuilder { config, ..self }
    }

    /// Build a new instance of [`BatchLogProcessor`].
    pub fn build(self) -> BatchLogProcessor {
        BatchLogProcessor::new(self.exporter, self.config)
    }
}

struct LogBatchExport<E>(E);

impl<E: LogExporter> BatchExport<LogData> for LogBatchExport<E> {
    fn export(&mut self, batch: Vec<LogData>) -> ExportResult {
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
