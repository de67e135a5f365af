use std::{
    env, fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use telepipe::{otel_debug, otel_error, otel_info, otel_warn};

use crate::error::{ExportError, ExportResult};
use crate::metrics::{
    data::ResourceMetrics, exporter::PushMetricExporter, pipeline::Pipeline, MetricError,
    MetricReader, MetricResult,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INTERVAL: Duration = Duration::from_millis(5_000);

pub(crate) const METRIC_EXPORT_INTERVAL_NAME: &str = "OTEL_METRIC_EXPORT_INTERVAL";
pub(crate) const METRIC_EXPORT_TIMEOUT_NAME: &str = "OTEL_METRIC_EXPORT_TIMEOUT";

/// Configuration options for [PeriodicReader].
///
/// By default the reader collects and exports every 5 seconds, or every
/// `OTEL_METRIC_EXPORT_INTERVAL` milliseconds when that variable is set.
/// `OTEL_METRIC_EXPORT_TIMEOUT` bounds how long `force_flush` and `shutdown`
/// wait for the export thread (default 30 seconds).
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    timeout: Duration,
    exporter: E,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter,
{
    fn new(exporter: E) -> Self {
        PeriodicReaderBuilder {
            interval: duration_from_env(METRIC_EXPORT_INTERVAL_NAME).unwrap_or(DEFAULT_INTERVAL),
            timeout: duration_from_env(METRIC_EXPORT_TIMEOUT_NAME).unwrap_or(DEFAULT_TIMEOUT),
            exporter,
        }
    }

    /// Configures the intervening time between exports for a [PeriodicReader].
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_INTERVAL`
    /// environment variable. A zero interval is ignored.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Configures how long flush and shutdown wait for an export to finish.
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_TIMEOUT`
    /// environment variable. A zero timeout is ignored.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Create a [PeriodicReader] with the given config.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self.exporter, self.interval, self.timeout)
    }
}

fn duration_from_env(var: &'static str) -> Option<Duration> {
    let raw = env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(millis) if millis > 0 => Some(Duration::from_millis(millis)),
        _ => {
            otel_warn!(
                name: "PeriodicReader.InvalidEnvValue",
                variable = var,
                value = raw.as_str(),
                message = "expected a positive number of milliseconds, using the default"
            );
            None
        }
    }
}

/// A [MetricReader] that collects and exports metric data on a dedicated
/// thread at a set interval.
///
/// The export time is not counted towards the interval between attempts. A
/// failed export is logged and its data dropped; the next cycle exports the
/// cumulative state again.
///
/// # Example
///
/// ```
/// use telepipe_sdk::metrics::{PeriodicReader, SdkMeterProvider};
/// # fn example<E: telepipe_sdk::metrics::PushMetricExporter>(exporter: E) {
/// let reader = PeriodicReader::builder(exporter).build();
/// let provider = SdkMeterProvider::builder().with_reader(reader).build();
/// # drop(provider);
/// # }
/// ```
#[derive(Clone)]
pub struct PeriodicReader {
    inner: Arc<PeriodicReaderInner>,
}

impl fmt::Debug for PeriodicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader")
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

type ProducerSlot = Arc<Mutex<Option<Weak<Pipeline>>>>;

struct PeriodicReaderInner {
    message_sender: Mutex<Sender<Message>>,
    producer: ProducerSlot,
    is_shutdown: AtomicBool,
    timeout: Duration,
}

#[derive(Debug)]
enum Message {
    Flush(Sender<ExportResult>),
    Shutdown(Sender<ExportResult>),
}

impl PeriodicReader {
    /// Configuration options for a periodic reader
    pub fn builder<E>(exporter: E) -> PeriodicReaderBuilder<E>
    where
        E: PushMetricExporter,
    {
        PeriodicReaderBuilder::new(exporter)
    }

    fn new<E>(exporter: E, interval: Duration, timeout: Duration) -> Self
    where
        E: PushMetricExporter,
    {
        let (message_sender, message_receiver) = mpsc::channel();
        let producer = ProducerSlot::default();
        let worker = Worker {
            exporter,
            producer: producer.clone(),
        };

        let spawned = thread::Builder::new()
            .name("telepipe.metrics.PeriodicReader".to_string())
            .spawn(move || worker.run(message_receiver, interval));
        if let Err(err) = spawned {
            otel_error!(
                name: "PeriodicReader.ThreadStartFailed",
                error = format!("{err}")
            );
        }

        PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                message_sender: Mutex::new(message_sender),
                producer,
                is_shutdown: AtomicBool::new(false),
                timeout,
            }),
        }
    }

    fn send(&self, message: impl FnOnce(Sender<ExportResult>) -> Message) -> ExportResult {
        let (response_tx, response_rx) = mpsc::channel();
        self.inner
            .message_sender
            .lock()?
            .send(message(response_tx))
            .map_err(|_| ExportError::Failed("export thread is not running".into()))?;

        match response_rx.recv_timeout(self.inner.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ExportError::Timeout(self.inner.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ExportError::Failed("export thread stopped".into()))
            }
        }
    }
}

impl MetricReader for PeriodicReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        let _ = self.inner.producer.lock().map(|mut producer| {
            if producer.is_none() {
                *producer = Some(pipeline);
            } else {
                otel_warn!(
                    name: "PeriodicReader.DuplicateRegistration",
                    message = "duplicate reader registration, did not register periodic reader"
                );
            }
        });
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> MetricResult<()> {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::Other("reader is shut down".into()));
        }
        collect(&self.inner.producer, rm)
    }

    fn force_flush(&self) -> ExportResult {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(ExportError::AlreadyShutdown);
        }
        self.send(Message::Flush)
    }

    fn shutdown(&self) -> ExportResult {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ExportError::AlreadyShutdown);
        }
        self.send(Message::Shutdown)
    }
}

fn collect(producer: &ProducerSlot, rm: &mut ResourceMetrics) -> MetricResult<()> {
    let pipeline = producer
        .lock()?
        .as_ref()
        .ok_or_else(|| MetricError::Other("pipeline is not registered".into()))?
        .upgrade()
        .ok_or_else(|| MetricError::Other("pipeline is dropped".into()))?;
    pipeline.produce(rm)
}

/// The export side of the reader. Owned by the export thread.
struct Worker<E> {
    exporter: E,
    producer: ProducerSlot,
}

impl<E: PushMetricExporter> Worker<E> {
    fn run(self, receiver: Receiver<Message>, interval: Duration) {
        otel_info!(
            name: "PeriodicReader.ThreadStarted",
            interval_ms = interval.as_millis() as u64
        );
        let mut remaining_interval = interval;
        let mut interval_start = Instant::now();
        loop {
            match receiver.recv_timeout(remaining_interval) {
                Ok(Message::Flush(response)) => {
                    otel_debug!(name: "PeriodicReader.ExportingDueToFlush");
                    let result = self
                        .collect_and_export()
                        .and_then(|_| self.exporter.force_flush());
                    let _ = response.send(result);

                    // A flush does not reset the schedule.
                    let elapsed = interval_start.elapsed();
                    if elapsed < interval {
                        remaining_interval = interval - elapsed;
                    } else {
                        interval_start = Instant::now();
                        remaining_interval = Duration::ZERO;
                    }
                }
                Ok(Message::Shutdown(response)) => {
                    otel_debug!(name: "PeriodicReader.ExportingDueToShutdown");
                    let result = self.collect_and_export();
                    let result = result.and(self.exporter.shutdown());
                    let _ = response.send(result);
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let export_start = Instant::now();
                    let _ = self.collect_and_export();

                    let took = export_start.elapsed();
                    interval_start = Instant::now();
                    remaining_interval = interval.saturating_sub(took);
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    // Every reader handle was dropped without shutdown.
                    let _ = self.exporter.shutdown();
                    break;
                }
            }
        }
        otel_info!(name: "PeriodicReader.ThreadStopped");
    }

    fn collect_and_export(&self) -> ExportResult {
        let mut rm = ResourceMetrics::default();
        if let Err(err) = collect(&self.producer, &mut rm) {
            otel_warn!(
                name: "PeriodicReader.CollectFailed",
                error = err.to_string()
            );
            return Err(ExportError::Failed(err.to_string()));
        }

        if rm.scope_metrics.is_empty() {
            otel_debug!(name: "PeriodicReader.NoMetricsCollected");
            return Ok(());
        }

        let result = futures_executor::block_on(self.exporter.export(&rm));
        if let Err(err) = &result {
            otel_warn!(
                name: "PeriodicReader.ExportFailed",
                error = err.to_string(),
                message = "metrics of this cycle are dropped"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{InMemoryMetricExporter, SdkMeterProvider};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Default)]
    struct FailsOnFirstExport {
        count: Arc<AtomicUsize>,
    }

    impl PushMetricExporter for FailsOnFirstExport {
        async fn export(&self, _metrics: &ResourceMetrics) -> ExportResult {
            if self.count.fetch_add(1, Ordering::Relaxed) == 0 {
                Err(ExportError::Failed("collector unavailable".into()))
            } else {
                Ok(())
            }
        }

        fn force_flush(&self) -> ExportResult {
            Ok(())
        }

        fn shutdown(&self) -> ExportResult {
            Ok(())
        }
    }

    fn slow_reader(exporter: impl PushMetricExporter) -> PeriodicReader {
        PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(3600))
            .build()
    }

    #[test]
    fn interval_from_env() {
        temp_env::with_vars(
            [
                (METRIC_EXPORT_INTERVAL_NAME, Some("250")),
                (METRIC_EXPORT_TIMEOUT_NAME, Some("not-a-number")),
            ],
            || {
                let builder = PeriodicReader::builder(InMemoryMetricExporter::default());
                assert_eq!(builder.interval, Duration::from_millis(250));
                assert_eq!(builder.timeout, DEFAULT_TIMEOUT);
            },
        );
        temp_env::with_var_unset(METRIC_EXPORT_INTERVAL_NAME, || {
            let builder = PeriodicReader::builder(InMemoryMetricExporter::default());
            assert_eq!(builder.interval, DEFAULT_INTERVAL);
        });
    }

    #[test]
    fn zero_overrides_are_ignored() {
        let builder = PeriodicReader::builder(InMemoryMetricExporter::default())
            .with_interval(Duration::ZERO)
            .with_timeout(Duration::from_secs(2));
        assert_eq!(builder.timeout, Duration::from_secs(2));
        assert!(!builder.interval.is_zero());
    }

    #[test]
    fn collection_triggered_by_interval() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(Duration::from_millis(10))
            .build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        provider
            .meter("test")
            .u64_counter("requests")
            .build()
            .unwrap()
            .add(1, &[]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.get_finished_metrics().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!exporter.get_finished_metrics().unwrap().is_empty());
    }

    #[test]
    fn collection_triggered_by_flush_and_shutdown() {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(slow_reader(exporter.clone()))
            .build();
        let counter = provider.meter("test").u64_counter("requests").build().unwrap();

        counter.add(1, &[]);
        provider.force_flush().unwrap();
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);

        counter.add(1, &[]);
        provider.shutdown().unwrap();
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 2);
    }

    #[test]
    fn nothing_recorded_exports_nothing() {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(slow_reader(exporter.clone()))
            .build();
        provider.force_flush().unwrap();
        assert!(exporter.get_finished_metrics().unwrap().is_empty());
    }

    #[test]
    fn exporter_failure_is_reported_and_not_retried() {
        let exporter = FailsOnFirstExport::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(slow_reader(exporter.clone()))
            .build();
        provider.meter("test").u64_counter("c").build().unwrap().add(1, &[]);

        assert!(matches!(provider.force_flush(), Err(ExportError::Failed(_))));
        assert!(provider.force_flush().is_ok());
        assert_eq!(exporter.count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn without_pipeline() {
        let reader = slow_reader(InMemoryMetricExporter::default());
        let mut rm = ResourceMetrics::default();
        assert!(reader.collect(&mut rm).is_err());
        assert!(reader.force_flush().is_err());

        let _provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        assert!(reader.collect(&mut rm).is_ok());
        assert!(reader.force_flush().is_ok());
    }

    #[test]
    fn shutdown_repeat() {
        let reader = slow_reader(InMemoryMetricExporter::default());
        let _provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        assert!(reader.shutdown().is_ok());
        assert_eq!(reader.shutdown(), Err(ExportError::AlreadyShutdown));
        assert_eq!(reader.force_flush(), Err(ExportError::AlreadyShutdown));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn flush_from_tokio_current_thread() {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(slow_reader(exporter.clone()))
            .build();
        provider.meter("test").u64_counter("c").build().unwrap().add(1, &[]);
        provider.force_flush().unwrap();
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
    }
}
