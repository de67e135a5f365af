//! The telepipe SDK: everything between instrumentation call sites and
//! exporters.
//!
//! * [`resource`]: identity of the process attached to all telemetry.
//! * [`trace`]: tracer provider, spans, span processors.
//! * [`metrics`]: meter provider, instruments, views, aggregation, readers.
//! * [`logs`]: logger provider, log records, log processors.
//! * [`propagation`]: W3C trace context and baggage propagators.
//!
//! Nothing in this crate is global. Providers are built explicitly, passed to
//! the code that records telemetry, and shut down explicitly; dropping the
//! last handle of a provider also shuts it down.
//!
//! ```
//! # #[cfg(all(feature = "metrics", feature = "testing"))]
//! # {
//! use telepipe::KeyValue;
//! use telepipe_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
//!
//! let exporter = InMemoryMetricExporter::default();
//! let provider = SdkMeterProvider::builder()
//!     .with_reader(PeriodicReader::builder(exporter.clone()).build())
//!     .build();
//!
//! let meter = provider.meter("checkout");
//! let counter = meter.u64_counter("orders").build().unwrap();
//! counter.add(1, &[KeyValue::new("region", "eu")]);
//!
//! provider.force_flush().unwrap();
//! assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
//! # }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[cfg(any(feature = "trace", feature = "logs"))]
mod batch;
#[cfg(any(feature = "trace", feature = "logs"))]
pub use batch::{BatchConfig, BatchConfigBuilder};

pub mod error;
pub use error::{ExportError, ExportResult};

#[cfg(feature = "logs")]
pub mod logs;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "trace")]
pub mod propagation;

pub mod resource;
pub use resource::Resource;

#[cfg(feature = "trace")]
pub mod trace;
