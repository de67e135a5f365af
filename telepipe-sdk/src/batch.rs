//! Background batching shared by `BatchSpanProcessor` and
//! `BatchLogProcessor`.
//!
//! Finished records go into a bounded queue. When the queue is full the
//! oldest record is discarded to make room for the newest one. A dedicated
//! thread drains the queue every `scheduled_delay`, or as soon as
//! `max_export_batch_size` records are waiting, and hands them to the
//! exporter in chunks of at most `max_export_batch_size`.
use crate::error::{ExportError, ExportResult};
use crate::Resource;
use std::collections::VecDeque;
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use telepipe::{otel_debug, otel_warn};

pub(crate) const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
pub(crate) const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
pub(crate) const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";
pub(crate) const OTEL_BLRP_SCHEDULE_DELAY: &str = "OTEL_BLRP_SCHEDULE_DELAY";
pub(crate) const OTEL_BLRP_MAX_QUEUE_SIZE: &str = "OTEL_BLRP_MAX_QUEUE_SIZE";
pub(crate) const OTEL_BLRP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE";

const DEFAULT_SCHEDULE_DELAY: Duration = Duration::from_millis(5_000);
const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;
const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// Control messages are few and small; records travel through the queue.
const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// Batch processor configuration.
///
/// Use [`BatchConfigBuilder`] to build one.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) shutdown_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

impl BatchConfig {
    /// The maximum number of records buffered before the oldest is dropped.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// The delay between two scheduled exports.
    pub fn scheduled_delay(&self) -> Duration {
        self.scheduled_delay
    }

    /// The maximum number of records handed to the exporter at once.
    pub fn max_export_batch_size(&self) -> usize {
        self.max_export_batch_size
    }

    /// How long `force_flush` and `shutdown` wait for the worker thread.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

/// A builder for [`BatchConfig`].
///
/// `Default` starts from the built-in defaults (queue 2048, delay 5000 ms,
/// batch 512, shutdown timeout 5 s). [`for_spans`](Self::for_spans) and
/// [`for_logs`](Self::for_logs) additionally read the `OTEL_BSP_*` and
/// `OTEL_BLRP_*` environment variables.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    shutdown_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            scheduled_delay: DEFAULT_SCHEDULE_DELAY,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl BatchConfigBuilder {
    /// Defaults overridden by `OTEL_BSP_SCHEDULE_DELAY`,
    /// `OTEL_BSP_MAX_QUEUE_SIZE` and `OTEL_BSP_MAX_EXPORT_BATCH_SIZE`.
    pub fn for_spans() -> Self {
        BatchConfigBuilder::default().init_from_env_vars(
            OTEL_BSP_SCHEDULE_DELAY,
            OTEL_BSP_MAX_QUEUE_SIZE,
            OTEL_BSP_MAX_EXPORT_BATCH_SIZE,
        )
    }

    /// Defaults overridden by `OTEL_BLRP_SCHEDULE_DELAY`,
    /// `OTEL_BLRP_MAX_QUEUE_SIZE` and `OTEL_BLRP_MAX_EXPORT_BATCH_SIZE`.
    pub fn for_logs() -> Self {
        BatchConfigBuilder::default().init_from_env_vars(
            OTEL_BLRP_SCHEDULE_DELAY,
            OTEL_BLRP_MAX_QUEUE_SIZE,
            OTEL_BLRP_MAX_EXPORT_BATCH_SIZE,
        )
    }

    /// Set the maximum queue size. Zero is ignored.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        if max_queue_size > 0 {
            self.max_queue_size = max_queue_size;
        }
        self
    }

    /// Set the delay between two scheduled exports.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the maximum export batch size. Zero is ignored.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        if max_export_batch_size > 0 {
            self.max_export_batch_size = max_export_batch_size;
        }
        self
    }

    /// Set how long `force_flush` and `shutdown` wait for the worker.
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Builds the config. The batch size is capped at the queue size.
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: self.max_export_batch_size.min(self.max_queue_size),
            shutdown_timeout: self.shutdown_timeout,
        }
    }

    fn init_from_env_vars(
        mut self,
        schedule_delay_var: &'static str,
        max_queue_size_var: &'static str,
        max_export_batch_size_var: &'static str,
    ) -> Self {
        if let Some(delay) = parse_env::<u64>(schedule_delay_var) {
            self.scheduled_delay = Duration::from_millis(delay);
        }
        if let Some(size) = parse_env::<usize>(max_queue_size_var).filter(|size| *size > 0) {
            self.max_queue_size = size;
        }
        if let Some(size) = parse_env::<usize>(max_export_batch_size_var).filter(|size| *size > 0)
        {
            self.max_export_batch_size = size;
        }
        self
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str) -> Option<T> {
    let raw = env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            otel_warn!(
                name: "BatchConfig.InvalidEnvValue",
                variable = var,
                value = raw.as_str(),
                message = "value is not a non-negative integer, using the default"
            );
            None
        }
    }
}

/// What the worker thread does with a batch. Implemented by the span and log
/// processors around their exporter.
pub(crate) trait BatchExport<T>: Send + 'static {
    fn export(&mut self, batch: Vec<T>) -> ExportResult;

    fn force_flush(&mut self) -> ExportResult {
        Ok(())
    }

    fn shutdown(&mut self) -> ExportResult;

    fn set_resource(&mut self, _resource: &Resource) {}
}

enum Control {
    ExportBatch,
    SetResource(Resource),
    ForceFlush(SyncSender<ExportResult>),
    Shutdown(SyncSender<ExportResult>),
}

/// Bounded queue that discards its oldest entry when full.
struct BoundedQueue<T> {
    records: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicUsize,
    overflowing: AtomicBool,
}

impl<T> BoundedQueue<T> {
    fn new(capacity: usize) -> Self {
        BoundedQueue {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_MAX_QUEUE_SIZE))),
            capacity,
            dropped: AtomicUsize::new(0),
            overflowing: AtomicBool::new(false),
        }
    }

    /// Returns the queue length after the push.
    fn push(&self, record: T, processor: &'static str) -> usize {
        let Ok(mut records) = self.records.lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return 0;
        };
        if records.len() >= self.capacity {
            records.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if !self.overflowing.swap(true, Ordering::Relaxed) {
                otel_warn!(
                    name: "BatchProcessor.RecordsDropped",
                    processor = processor,
                    max_queue_size = self.capacity,
                    message = "queue is full, dropping the oldest records until the worker catches up"
                );
            }
        }
        records.push_back(record);
        records.len()
    }

    fn take(&self, max: usize) -> Vec<T> {
        let Ok(mut records) = self.records.lock() else {
            return Vec::new();
        };
        let n = max.min(records.len());
        let batch: Vec<T> = records.drain(..n).collect();
        if records.len() < self.capacity {
            self.overflowing.store(false, Ordering::Relaxed);
        }
        batch
    }

    fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    fn clear(&self) -> usize {
        self.records
            .lock()
            .map(|mut records| {
                let n = records.len();
                records.clear();
                n
            })
            .unwrap_or(0)
    }
}

/// Queue plus worker thread. The exporter lives on the worker thread.
pub(crate) struct BatchWorker<T> {
    name: &'static str,
    queue: Arc<BoundedQueue<T>>,
    control: SyncSender<Control>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    config: BatchConfig,
}

impl<T> fmt::Debug for BatchWorker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWorker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("is_shutdown", &self.is_shutdown)
            .finish()
    }
}

impl<T: Send + 'static> BatchWorker<T> {
    pub(crate) fn spawn<E>(name: &'static str, exporter: E, config: BatchConfig) -> Self
    where
        E: BatchExport<T>,
    {
        let queue = Arc::new(BoundedQueue::new(config.max_queue_size));
        let (control, receiver) = sync_channel(CONTROL_CHANNEL_CAPACITY);

        let worker_queue = queue.clone();
        let worker_config = config.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(name, exporter, worker_queue, receiver, worker_config));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                otel_warn!(
                    name: "BatchProcessor.ThreadSpawnFailed",
                    processor = name,
                    error = format!("{err}")
                );
                None
            }
        };

        BatchWorker {
            name,
            queue,
            control,
            is_shutdown: AtomicBool::new(handle.is_none()),
            handle: Mutex::new(handle),
            config,
        }
    }

    pub(crate) fn push(&self, record: T) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            otel_debug!(name: "BatchProcessor.RecordAfterShutdown", processor = self.name);
            return;
        }
        let len = self.queue.push(record, self.name);
        if len >= self.config.max_export_batch_size {
            // A full channel already holds a pending wake-up.
            if let Err(TrySendError::Disconnected(_)) = self.control.try_send(Control::ExportBatch)
            {
                otel_debug!(name: "BatchProcessor.WorkerGone", processor = self.name);
            }
        }
    }

    pub(crate) fn set_resource(&self, resource: &Resource) {
        let _ = self.control.send(Control::SetResource(resource.clone()));
    }

    pub(crate) fn force_flush(&self) -> ExportResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(ExportError::AlreadyShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.control
            .send(Control::ForceFlush(sender))
            .map_err(|_| ExportError::Failed("batch worker is not running".into()))?;
        receiver
            .recv_timeout(self.config.shutdown_timeout)
            .map_err(|_| ExportError::Timeout(self.config.shutdown_timeout))?
    }

    pub(crate) fn shutdown(&self) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ExportError::AlreadyShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.control
            .send(Control::Shutdown(sender))
            .map_err(|_| ExportError::Failed("batch worker is not running".into()))?;

        let result = match receiver.recv_timeout(self.config.shutdown_timeout) {
            Ok(result) => {
                if let Some(handle) = self.handle.lock()?.take() {
                    let _ = handle.join();
                }
                result
            }
            Err(_) => {
                let discarded = self.queue.clear();
                otel_warn!(
                    name: "BatchProcessor.ShutdownTimedOut",
                    processor = self.name,
                    discarded = discarded
                );
                Err(ExportError::Timeout(self.config.shutdown_timeout))
            }
        };

        let dropped = self.queue.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            otel_warn!(
                name: "BatchProcessor.DroppedRecordsTotal",
                processor = self.name,
                dropped = dropped
            );
        }
        result
    }

    pub(crate) fn dropped_count(&self) -> usize {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }
}

fn run<T, E: BatchExport<T>>(
    name: &'static str,
    mut exporter: E,
    queue: Arc<BoundedQueue<T>>,
    receiver: Receiver<Control>,
    config: BatchConfig,
) {
    let mut last_export = Instant::now();
    loop {
        let timeout = config.scheduled_delay.saturating_sub(last_export.elapsed());
        match receiver.recv_timeout(timeout) {
            Ok(Control::ExportBatch) => {
                while queue.len() >= config.max_export_batch_size {
                    let _ = export_once(name, &mut exporter, &queue, config.max_export_batch_size);
                }
            }
            Ok(Control::SetResource(resource)) => exporter.set_resource(&resource),
            Ok(Control::ForceFlush(reply)) => {
                let result = export_all(name, &mut exporter, &queue, config.max_export_batch_size)
                    .and_then(|_| exporter.force_flush());
                last_export = Instant::now();
                let _ = reply.send(result);
            }
            Ok(Control::Shutdown(reply)) => {
                let result = export_all(name, &mut exporter, &queue, config.max_export_batch_size);
                let result = result.and(exporter.shutdown());
                let _ = reply.send(result);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = export_all(name, &mut exporter, &queue, config.max_export_batch_size);
                last_export = Instant::now();
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The processor was dropped without shutdown.
                let _ = export_all(name, &mut exporter, &queue, config.max_export_batch_size);
                let _ = exporter.shutdown();
                break;
            }
        }
    }
}

fn export_all<T, E: BatchExport<T>>(
    name: &'static str,
    exporter: &mut E,
    queue: &BoundedQueue<T>,
    max_batch: usize,
) -> ExportResult {
    let mut result = Ok(());
    loop {
        match export_once(name, exporter, queue, max_batch) {
            None => return result,
            Some(Err(err)) if result.is_ok() => result = Err(err),
            Some(_) => {}
        }
    }
}

/// Exports one chunk. `None` when the queue was empty.
fn export_once<T, E: BatchExport<T>>(
    name: &'static str,
    exporter: &mut E,
    queue: &BoundedQueue<T>,
    max_batch: usize,
) -> Option<ExportResult> {
    let batch = queue.take(max_batch);
    if batch.is_empty() {
        return None;
    }
    let count = batch.len();
    let result = exporter.export(batch);
    if let Err(err) = &result {
        otel_warn!(
            name: "BatchProcessor.ExportFailed",
            processor = name,
            dropped = count,
            error = format!("{err}")
        );
    }
    Some(result)
}
