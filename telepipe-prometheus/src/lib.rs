//! A pull exporter serving [Prometheus] text exposition format 0.0.4.
//!
//! [PrometheusExporter] is a [MetricReader]: register it with a meter provider
//! and every call to [PrometheusExporter::export] collects the current
//! cumulative state and renders it. [ScrapeServer] serves that rendering on
//! an HTTP endpoint for a Prometheus server to poll.
//!
//! [Prometheus]: https://prometheus.io
//!
//! ```
//! use telepipe::KeyValue;
//! use telepipe_sdk::metrics::SdkMeterProvider;
//!
//! let exporter = telepipe_prometheus::exporter().without_scope_info().build();
//! let provider = SdkMeterProvider::builder()
//!     .with_reader(exporter.clone())
//!     .build();
//!
//! let counter = provider
//!     .meter("http")
//!     .u64_counter("traffic_volume")
//!     .with_description("total volume of requests to an endpoint")
//!     .build()
//!     .unwrap();
//! counter.add(100, &[KeyValue::new("http.route", "/orders")]);
//!
//! let text = exporter.export().unwrap();
//! assert!(text.contains("# TYPE traffic_volume_total counter\n"));
//! assert!(text.contains("traffic_volume_total{http_route=\"/orders\"} 100\n"));
//! ```
//!
//! Serving the endpoint needs a Tokio runtime:
//!
//! ```no_run
//! use telepipe_prometheus::{ScrapeServer, ServerConfig};
//! use telepipe_sdk::metrics::SdkMeterProvider;
//!
//! # async fn run() -> Result<(), telepipe_prometheus::Error> {
//! let exporter = telepipe_prometheus::exporter().build();
//! let provider = SdkMeterProvider::builder().with_reader(exporter.clone()).build();
//!
//! // OTEL_EXPORTER_PROMETHEUS_HOST / OTEL_EXPORTER_PROMETHEUS_PORT, 0.0.0.0:8000 by default
//! let server = ScrapeServer::bind(exporter, ServerConfig::from_env()).await?;
//! println!("scrape http://{}/metrics", server.local_addr());
//! # drop(provider);
//! # Ok(())
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

use std::sync::{Arc, Weak};

use telepipe_sdk::metrics::{
    data::ResourceMetrics, ManualReader, MetricError, MetricReader, MetricResult, Pipeline,
};
use telepipe_sdk::ExportResult;
use thiserror::Error;

mod config;
mod exposition;
mod server;
mod utils;

pub use config::ExporterBuilder;
pub use exposition::CONTENT_TYPE;
pub use server::{
    ScrapeServer, ServerConfig, DEFAULT_METRICS_PATH, OTEL_EXPORTER_PROMETHEUS_HOST,
    OTEL_EXPORTER_PROMETHEUS_HOST_DEFAULT, OTEL_EXPORTER_PROMETHEUS_PORT,
    OTEL_EXPORTER_PROMETHEUS_PORT_DEFAULT,
};

/// Creates a builder to configure a [PrometheusExporter]
pub fn exporter() -> ExporterBuilder {
    ExporterBuilder::default()
}

/// Errors of the prometheus exporter and its scrape endpoint.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Collecting from the meter provider failed, for instance after it was
    /// shut down.
    #[error("failed to collect metrics: {0}")]
    Collect(#[from] MetricError),

    /// The scrape endpoint could not listen on the configured address.
    #[error("scrape endpoint: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid server configuration.
    #[error("invalid scrape endpoint configuration: {0}")]
    InvalidConfig(String),
}

/// Prometheus metrics exporter.
///
/// Clones share the same registration: hand one clone to the meter provider
/// and keep another one to export or serve.
#[derive(Clone, Debug)]
pub struct PrometheusExporter {
    reader: ManualReader,
    config: Arc<exposition::EncoderConfig>,
}

impl PrometheusExporter {
    /// Creates a builder to configure a [PrometheusExporter]
    pub fn builder() -> ExporterBuilder {
        ExporterBuilder::default()
    }

    /// Collects the current metrics and renders them in text exposition
    /// format.
    pub fn export(&self) -> Result<String, Error> {
        let mut metrics = ResourceMetrics::default();
        self.reader.collect(&mut metrics)?;
        Ok(exposition::encode(&metrics, &self.config))
    }
}

impl MetricReader for PrometheusExporter {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.reader.register_pipeline(pipeline)
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> MetricResult<()> {
        self.reader.collect(rm)
    }

    fn force_flush(&self) -> ExportResult {
        self.reader.force_flush()
    }

    fn shutdown(&self) -> ExportResult {
        self.reader.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telepipe::KeyValue;
    use telepipe_sdk::metrics::SdkMeterProvider;
    use telepipe_sdk::Resource;

    #[test]
    fn export_renders_provider_state() {
        let exporter = exporter().without_scope_info().build();
        let provider = SdkMeterProvider::builder()
            .with_reader(exporter.clone())
            .with_resource(Resource::builder_empty().with_service_name("checkout").build())
            .build();
        let counter = provider
            .meter("http")
            .u64_counter("traffic_volume")
            .with_unit("request")
            .build()
            .unwrap();
        for _ in 0..3 {
            counter.add(1, &[KeyValue::new("route", "/")]);
        }

        let text = exporter.export().unwrap();
        assert_eq!(
            text,
            "# TYPE traffic_volume_total counter\n\
             traffic_volume_total{route=\"/\"} 3\n\
             # HELP target_info Target metadata\n\
             # TYPE target_info gauge\n\
             target_info{service_name=\"checkout\"} 1\n"
        );
    }

    #[test]
    fn export_after_shutdown_fails() {
        let exporter = exporter().build();
        let provider = SdkMeterProvider::builder()
            .with_reader(exporter.clone())
            .build();
        provider.shutdown().unwrap();

        assert!(matches!(exporter.export(), Err(Error::Collect(_))));
    }
}
