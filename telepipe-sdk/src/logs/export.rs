//! Log exporters
use crate::error::ExportResult;
use crate::logs::SdkLogRecord;
use crate::Resource;
use std::fmt::Debug;
use std::future::Future;
use telepipe::InstrumentationScope;

/// A log record together with the scope of the logger that emitted it.
#[derive(Clone, Debug, PartialEq)]
pub struct LogData {
    /// The record
    pub record: SdkLogRecord,
    /// Instrumentation scope of the emitting logger
    pub instrumentation_scope: InstrumentationScope,
}

/// Receives log records from a log processor and delivers them to a sink.
pub trait LogExporter: Send + Sync + Debug + 'static {
    /// Exports a batch of log records.
    ///
    /// Never called concurrently for the same exporter instance. A returned
    /// error is logged by the processor and the batch is dropped.
    fn export(&self, batch: Vec<LogData>) -> impl Future<Output = ExportResult> + Send;

    /// Flushes anything the exporter buffers itself.
    fn force_flush(&mut self) -> ExportResult {
        Ok(())
    }

    /// Called once when the pipeline shuts down.
    fn shutdown(&mut self) -> ExportResult {
        Ok(())
    }

    /// Set the resource describing the process for this exporter.
    fn set_resource(&mut self, _resource: &Resource) {}
}
