use std::sync::{Arc, Mutex};

use crate::error::ExportResult;
use crate::metrics::{data::ResourceMetrics, MetricResult, PushMetricExporter};

/// Keeps every exported [`ResourceMetrics`] in memory, for tests.
///
/// Clones share the same storage. Each periodic export appends one entry,
/// holding the cumulative state at the time of the export.
///
/// ```
/// use telepipe_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
///
/// let exporter = InMemoryMetricExporter::default();
/// let provider = SdkMeterProvider::builder()
///     .with_reader(PeriodicReader::builder(exporter.clone()).build())
///     .build();
///
/// provider.meter("test").u64_counter("hits").build().unwrap().add(2, &[]);
/// provider.force_flush().unwrap();
///
/// let exported = exporter.get_finished_metrics().unwrap();
/// assert!(exported[0].metric("hits").is_some());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<Vec<ResourceMetrics>>>,
}

impl InMemoryMetricExporter {
    /// Everything exported so far, in export order.
    pub fn get_finished_metrics(&self) -> MetricResult<Vec<ResourceMetrics>> {
        Ok(self.metrics.lock()?.clone())
    }

    /// Forget all exported metrics.
    pub fn reset(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.clear();
        }
    }
}

impl PushMetricExporter for InMemoryMetricExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> ExportResult {
        self.metrics.lock()?.push(metrics.clone());
        Ok(())
    }

    fn force_flush(&self) -> ExportResult {
        Ok(())
    }

    fn shutdown(&self) -> ExportResult {
        Ok(())
    }
}
