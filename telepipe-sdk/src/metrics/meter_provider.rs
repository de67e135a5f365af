use std::{
    borrow::Cow,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use telepipe::{otel_debug, otel_info, InstrumentationScope};

use crate::error::{ExportError, ExportResult};
use crate::metrics::{pipeline::Pipeline, Meter, MetricReader, View};
use crate::Resource;

/// Handles the creation and coordination of [Meter]s.
///
/// All `Meter`s created by a `MeterProvider` will be associated with the same
/// [Resource], have the same [View]s applied to them, and have their produced
/// metric telemetry passed to the configured [MetricReader]s.
///
/// Cloning a provider creates a new reference to the same provider. Dropping
/// the last reference shuts it down, which makes every reader export once
/// more.
#[derive(Clone, Debug)]
pub struct SdkMeterProvider {
    inner: Arc<SdkMeterProviderInner>,
}

struct SdkMeterProviderInner {
    pipeline: Arc<Pipeline>,
    readers: Vec<Box<dyn MetricReader>>,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for SdkMeterProviderInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkMeterProvider")
            .field("resource", &self.pipeline.resource)
            .field("readers", &self.readers)
            .field("is_shutdown", &self.is_shutdown)
            .finish()
    }
}

impl SdkMeterProviderInner {
    fn force_flush(&self) -> ExportResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(ExportError::AlreadyShutdown);
        }
        collect_errors(self.readers.iter().map(|reader| reader.force_flush()))
    }

    fn shutdown(&self) -> ExportResult {
        if self
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExportError::AlreadyShutdown);
        }
        collect_errors(self.readers.iter().map(|reader| reader.shutdown()))
    }
}

impl Drop for SdkMeterProviderInner {
    fn drop(&mut self) {
        // If user has already shutdown the provider manually by calling
        // shutdown(), then we don't need to call shutdown again.
        if self.is_shutdown.load(Ordering::Relaxed) {
            otel_debug!(
                name: "MeterProvider.Drop.AlreadyShutdown",
                message = "meter provider was already shut down, nothing to do on drop"
            );
        } else if let Err(err) = self.shutdown() {
            otel_debug!(
                name: "MeterProvider.Drop.ShutdownFailed",
                error = err.to_string()
            );
        }
    }
}

fn collect_errors(results: impl Iterator<Item = ExportResult>) -> ExportResult {
    let errors: Vec<String> = results
        .filter_map(Result::err)
        .map(|err| err.to_string())
        .collect();
    match errors.as_slice() {
        [] => Ok(()),
        _ => Err(ExportError::Failed(errors.join("; "))),
    }
}

impl Default for SdkMeterProvider {
    fn default() -> Self {
        SdkMeterProvider::builder().build()
    }
}

impl SdkMeterProvider {
    /// Return default [MeterProviderBuilder]
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Returns a meter for the named instrumentation scope.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a meter for the given instrumentation scope.
    ///
    /// Two meters with equal scopes share their instruments.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        if scope.name().is_empty() {
            otel_info!(name: "MeterNameEmpty", message = "meter name is empty");
        }
        Meter::new(scope, self.inner.pipeline.clone())
    }

    /// The resource attached to every collection.
    pub fn resource(&self) -> &Resource {
        &self.inner.pipeline.resource
    }

    /// Flushes all pending telemetry.
    ///
    /// There is no guaranteed that all telemetry be flushed or all resources
    /// have been released on error.
    pub fn force_flush(&self) -> ExportResult {
        self.inner.force_flush()
    }

    /// Shuts down the meter provider, flushing all pending telemetry and
    /// releasing any held computational resources.
    ///
    /// This call is idempotent. The first call will perform all flush and
    /// releasing operations. Subsequent calls will return
    /// [`ExportError::AlreadyShutdown`]. Instruments created before remain
    /// usable but nothing is exported anymore.
    pub fn shutdown(&self) -> ExportResult {
        otel_info!(
            name: "MeterProvider.Shutdown",
            message = "user initiated shutdown of meter provider"
        );
        self.inner.shutdown()
    }
}

/// Configuration options for a [SdkMeterProvider].
#[derive(Default)]
pub struct MeterProviderBuilder {
    resource: Option<Resource>,
    readers: Vec<Box<dyn MetricReader>>,
    views: Vec<View>,
}

impl MeterProviderBuilder {
    /// Associates a [Resource] with a [SdkMeterProvider].
    ///
    /// This [Resource] represents the entity producing telemetry and is
    /// associated with all [Meter]s the [SdkMeterProvider] will create.
    ///
    /// By default, if this option is not used, the default [Resource] will be
    /// used.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Associates a [MetricReader] with a [SdkMeterProvider].
    ///
    /// By default, if this option is not used, the [SdkMeterProvider] will
    /// perform no operations; no data will be exported without a
    /// [MetricReader].
    pub fn with_reader<T: MetricReader>(mut self, reader: T) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Associates a [View] with a [SdkMeterProvider].
    ///
    /// [View]s are appended to existing ones in a [SdkMeterProvider] if this
    /// option is used multiple times. Views are consulted in the order they
    /// were added, exact-name views before wildcard and kind-only views.
    ///
    /// By default, if this option is not used, the [SdkMeterProvider] will
    /// use the default view.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Construct a new [SdkMeterProvider] with this configuration.
    pub fn build(self) -> SdkMeterProvider {
        otel_debug!(
            name: "MeterProvider.Building",
            readers = self.readers.len(),
            views = self.views.len()
        );
        let pipeline = Arc::new(Pipeline::new(
            self.resource.unwrap_or_default(),
            self.views,
        ));
        for reader in &self.readers {
            reader.register_pipeline(Arc::downgrade(&pipeline));
        }

        SdkMeterProvider {
            inner: Arc::new(SdkMeterProviderInner {
                pipeline,
                readers: self.readers,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("resource", &self.resource)
            .field("readers", &self.readers)
            .field("views", &self.views.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{data::ResourceMetrics, ManualReader};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Weak;
    use telepipe::{Key, KeyValue, Value};

    #[derive(Debug, Clone, Default)]
    struct CountingReader {
        flushed: Arc<AtomicUsize>,
        shut_down: Arc<AtomicUsize>,
    }

    impl MetricReader for CountingReader {
        fn register_pipeline(&self, _pipeline: Weak<Pipeline>) {}

        fn collect(&self, _rm: &mut ResourceMetrics) -> crate::metrics::MetricResult<()> {
            Ok(())
        }

        fn force_flush(&self) -> ExportResult {
            self.flushed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&self) -> ExportResult {
            self.shut_down.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn resource_is_reported_by_collect() {
        let reader = ManualReader::default();
        let provider = SdkMeterProvider::builder()
            .with_resource(
                Resource::builder_empty()
                    .with_service_name("checkout")
                    .build(),
            )
            .with_reader(reader.clone())
            .build();
        assert_eq!(provider.resource().len(), 1);

        let mut rm = ResourceMetrics::default();
        reader.collect(&mut rm).unwrap();
        assert_eq!(
            rm.resource.get(&Key::new("service.name")),
            Some(Value::from("checkout"))
        );
    }

    #[test]
    fn every_reader_sees_the_same_state() {
        let first = ManualReader::default();
        let second = ManualReader::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(first.clone())
            .with_reader(second.clone())
            .build();
        let counter = provider.meter("test").u64_counter("hits").build().unwrap();
        counter.add(2, &[KeyValue::new("a", "b")]);

        for reader in [first, second] {
            let mut rm = ResourceMetrics::default();
            reader.collect(&mut rm).unwrap();
            assert_eq!(rm.scope_metrics[0].metrics.len(), 1);
        }
    }

    #[test]
    fn meters_with_equal_scope_share_instruments() {
        let reader = ManualReader::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        provider.meter("a").u64_counter("hits").build().unwrap().add(1, &[]);
        provider.meter("a").u64_counter("hits").build().unwrap().add(1, &[]);
        provider.meter("b").u64_counter("hits").build().unwrap().add(1, &[]);

        let mut rm = ResourceMetrics::default();
        reader.collect(&mut rm).unwrap();
        assert_eq!(rm.scope_metrics.len(), 2);
        assert_eq!(rm.scope_metrics[0].scope.name(), "a");
        assert_eq!(rm.scope_metrics[0].metrics.len(), 1);
    }

    #[test]
    fn shutdown_once() {
        let reader = CountingReader::default();
        let shut_down = reader.shut_down.clone();
        let flushed = reader.flushed.clone();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();

        provider.force_flush().unwrap();
        assert_eq!(flushed.load(Ordering::SeqCst), 1);

        assert!(provider.shutdown().is_ok());
        assert_eq!(provider.shutdown(), Err(ExportError::AlreadyShutdown));
        assert_eq!(provider.force_flush(), Err(ExportError::AlreadyShutdown));
        drop(provider);
        assert_eq!(shut_down.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_of_last_clone_shuts_down() {
        let reader = CountingReader::default();
        let shut_down = reader.shut_down.clone();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        let clone = provider.clone();

        drop(provider);
        assert_eq!(shut_down.load(Ordering::SeqCst), 0);
        drop(clone);
        assert_eq!(shut_down.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn instruments_outlive_shutdown() {
        let provider = SdkMeterProvider::builder()
            .with_reader(ManualReader::default())
            .build();
        let counter = provider.meter("test").u64_counter("hits").build().unwrap();
        provider.shutdown().unwrap();
        counter.add(1, &[]);
    }
}
