//! The metrics SDK.
//!
//! ## Configuration
//!
//! The configuration is stored with each [SdkMeterProvider]: a [Resource],
//! the [View]s that rewrite instrument streams, and the [ManualReader] or
//! [PeriodicReader] instances that collect them.
//!
//! Aggregation is always cumulative and shared by every reader of a
//! provider. A stream keeps at most 2000 attribute sets; measurements for
//! further sets are folded into a single set carrying
//! `otel.metric.overflow=true`.
//!
//! ### Example
//!
//! ```
//! use telepipe::KeyValue;
//! use telepipe_sdk::metrics::{Aggregation, SdkMeterProvider, View};
//! use telepipe_sdk::Resource;
//!
//! let latency_buckets = View::builder()
//!     .with_instrument_name("http.server.request.duration")
//!     .with_aggregation(Aggregation::ExplicitBucketHistogram {
//!         boundaries: vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
//!         record_min_max: true,
//!     })
//!     .build()
//!     .unwrap();
//!
//! let provider = SdkMeterProvider::builder()
//!     .with_resource(Resource::builder().with_service_name("checkout").build())
//!     .with_view(latency_buckets)
//!     .build();
//!
//! let meter = provider.meter("http");
//! let duration = meter
//!     .f64_histogram("http.server.request.duration")
//!     .with_unit("s")
//!     .build()
//!     .unwrap();
//! duration.record(0.042, &[KeyValue::new("http.route", "/orders")]);
//!
//! provider.shutdown().unwrap();
//! ```
//!
//! [Resource]: crate::Resource

mod aggregation;
mod attribute_set;
pub mod data;
mod error;
mod exporter;
#[cfg(any(test, feature = "testing"))]
mod in_memory_exporter;
mod instrument;
mod internal;
mod manual_reader;
mod meter;
mod meter_provider;
mod periodic_reader;
mod pipeline;
mod reader;
mod sampler;
mod view;

pub use aggregation::{Aggregation, DEFAULT_HISTOGRAM_BOUNDARIES};
pub use data::Temporality;
pub use error::{MetricError, MetricResult};
pub use exporter::PushMetricExporter;
#[cfg(any(test, feature = "testing"))]
pub use in_memory_exporter::InMemoryMetricExporter;
pub use instrument::{
    Counter, Histogram, Instrument, InstrumentKind, Number, ObservableGauge,
    ObservableUpDownCounter, UpDownCounter,
};
pub use manual_reader::ManualReader;
pub use meter::{HistogramBuilder, InstrumentBuilder, Meter, ObservableBuilder};
pub use meter_provider::{MeterProviderBuilder, SdkMeterProvider};
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};
pub use pipeline::Pipeline;
pub use reader::MetricReader;
pub use sampler::{CpuUtilizationSampler, MemoryUsageSampler, Sampler};
pub use view::{apply_views, Stream, View, ViewBuilder};
