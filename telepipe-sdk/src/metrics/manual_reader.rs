use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
};

use telepipe::otel_warn;

use crate::error::{ExportError, ExportResult};
use crate::metrics::{
    data::ResourceMetrics, pipeline::Pipeline, MetricError, MetricReader, MetricResult,
};

/// A simple [MetricReader] that allows an application to read metrics on demand.
///
/// Clones share the same registration, so one clone can be handed to the
/// provider while another serves scrapes.
///
/// # Example
///
/// ```
/// use telepipe_sdk::metrics::{data::ResourceMetrics, ManualReader, MetricReader, SdkMeterProvider};
///
/// let reader = ManualReader::default();
/// let provider = SdkMeterProvider::builder().with_reader(reader.clone()).build();
///
/// provider.meter("checkout").u64_counter("orders").build().unwrap().add(1, &[]);
///
/// let mut rm = ResourceMetrics::default();
/// reader.collect(&mut rm).unwrap();
/// assert_eq!(rm.scope_metrics.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ManualReader {
    inner: Arc<Mutex<ManualReaderInner>>,
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ManualReader")
    }
}

#[derive(Debug, Default)]
struct ManualReaderInner {
    sdk_producer: Option<Weak<Pipeline>>,
    is_shutdown: bool,
}

impl MetricReader for ManualReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        let _ = self.inner.lock().map(|mut inner| {
            // Only register once. If producer is already set, do nothing.
            if inner.sdk_producer.is_none() {
                inner.sdk_producer = Some(pipeline);
            } else {
                otel_warn!(
                    name: "ManualReader.DuplicateRegistration",
                    message = "duplicate reader registration, did not register manual reader"
                );
            }
        });
    }

    /// Gathers all metrics from the SDK, calling any samplers necessary.
    fn collect(&self, rm: &mut ResourceMetrics) -> MetricResult<()> {
        let inner = self.inner.lock()?;
        if inner.is_shutdown {
            return Err(MetricError::Other("reader is shut down".into()));
        }
        match inner.sdk_producer.as_ref().and_then(|w| w.upgrade()) {
            Some(producer) => producer.produce(rm),
            None => Err(MetricError::Other(
                "reader is not registered with a live meter provider".into(),
            )),
        }
    }

    /// ManualReader does not do any caching, so there is nothing to flush.
    fn force_flush(&self) -> ExportResult {
        if self.inner.lock()?.is_shutdown {
            return Err(ExportError::AlreadyShutdown);
        }
        Ok(())
    }

    /// Closes any connections and frees any resources used by the reader.
    fn shutdown(&self) -> ExportResult {
        let mut inner = self.inner.lock()?;
        if inner.is_shutdown {
            return Err(ExportError::AlreadyShutdown);
        }

        // Any future call to collect will now return an error.
        inner.sdk_producer = None;
        inner.is_shutdown = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SdkMeterProvider;

    #[test]
    fn collect_before_registration_fails() {
        let reader = ManualReader::default();
        assert!(reader.collect(&mut ResourceMetrics::default()).is_err());
    }

    #[test]
    fn collect_after_provider_dropped_fails() {
        let reader = ManualReader::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        provider.meter("test").u64_counter("c").build().unwrap().add(1, &[]);
        assert!(reader.collect(&mut ResourceMetrics::default()).is_ok());

        drop(provider);
        assert!(reader.collect(&mut ResourceMetrics::default()).is_err());
    }

    #[test]
    fn shutdown_once() {
        let reader = ManualReader::default();
        assert_eq!(reader.force_flush(), Ok(()));
        assert_eq!(reader.shutdown(), Ok(()));
        assert_eq!(reader.shutdown(), Err(ExportError::AlreadyShutdown));
        assert_eq!(reader.force_flush(), Err(ExportError::AlreadyShutdown));
        assert!(matches!(
            reader.collect(&mut ResourceMetrics::default()),
            Err(MetricError::Other(_))
        ));
    }
}
