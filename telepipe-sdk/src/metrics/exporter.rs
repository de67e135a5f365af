//! Interfaces for exporting metrics
use std::future::Future;

use crate::error::ExportResult;
use crate::metrics::data::ResourceMetrics;

/// Exporter handles the delivery of metric data to external receivers.
///
/// This is the final component in the metric push pipeline. It is driven by
/// the [`PeriodicReader`](crate::metrics::PeriodicReader) thread, one call at
/// a time.
pub trait PushMetricExporter: Send + Sync + 'static {
    /// Export serializes and transmits metric data to a receiver.
    ///
    /// All retry logic must be contained in this function. The SDK does not
    /// implement any retry logic. All errors returned by this function are
    /// considered unrecoverable and will be logged.
    fn export(&self, metrics: &ResourceMetrics) -> impl Future<Output = ExportResult> + Send;

    /// Flushes any metric data held by an exporter.
    fn force_flush(&self) -> ExportResult;

    /// Releases any held computational resources.
    ///
    /// After Shutdown is called, calls to Export will perform no operation and
    /// instead will return an error indicating the shutdown state.
    fn shutdown(&self) -> ExportResult;
}
