//! Interfaces for reading and producing metrics
use std::{fmt, sync::Weak};

use crate::error::ExportResult;
use crate::metrics::{data::ResourceMetrics, pipeline::Pipeline, MetricResult};

/// The interface used between the SDK and an exporter.
///
/// Control flow is bi-directional through the `MetricReader`, since the SDK
/// initiates `force_flush` and `shutdown` while the reader initiates
/// collection. The [`register_pipeline`](MetricReader::register_pipeline)
/// method here informs the reader of where to collect from.
///
/// Readers share the provider's aggregation state, so every reader sees the
/// same cumulative values.
pub trait MetricReader: fmt::Debug + Send + Sync + 'static {
    /// Registers a [`MetricReader`] with a [`Pipeline`].
    ///
    /// The pipeline argument allows the `MetricReader` to signal the sdk to
    /// collect and send aggregated metric measurements.
    fn register_pipeline(&self, pipeline: Weak<Pipeline>);

    /// Gathers and returns all metric data related to the [`MetricReader`] from
    /// the SDK and stores it in the provided [`ResourceMetrics`] reference.
    ///
    /// An error is returned if this is called after shutdown.
    fn collect(&self, rm: &mut ResourceMetrics) -> MetricResult<()>;

    /// Flushes metric data held by this reader.
    ///
    /// There is no guaranteed that all telemetry be flushed or all resources
    /// have been released on error.
    fn force_flush(&self) -> ExportResult;

    /// Flushes all metric measurements held in an export pipeline and releases
    /// any held computational resources.
    ///
    /// After `shutdown` is called, calls to `collect` will perform no
    /// operation and instead will return an error indicating the shutdown
    /// state.
    fn shutdown(&self) -> ExportResult;
}
