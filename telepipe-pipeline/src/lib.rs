//! # telepipe-pipeline
//!
//! Assembles the telepipe trace, metric and log pipelines of an HTTP service
//! from environment variables.
//!
//! [`PipelineConfig::from_env`] reads the service identity, the exporters of
//! each signal and their settings; [`TelemetryPipeline::init`] builds the
//! providers, starts the Prometheus scrape endpoint and hands out tracers,
//! meters, the HTTP middleware layer and the `tracing` bridge.
//!
//! | variable | default |
//! |---|---|
//! | `OTEL_SERVICE_NAME` | `unknown_service` |
//! | `OTEL_SERVICE_VERSION` | `0.1.0` |
//! | `OTEL_METRIC_EXPORT_INTERVAL` (ms) | `5000` |
//! | `OTEL_TRACES_EXPORTER` | `console` |
//! | `OTEL_METRICS_EXPORTER` | `console,prometheus` |
//! | `OTEL_LOGS_EXPORTER` | `console` |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `http://localhost:4317` |
//! | `OTEL_EXPORTER_OTLP_INSECURE` | `true` |
//! | `OTEL_EXPORTER_OTLP_TIMEOUT` (ms) | `10000` |
//! | `OTEL_EXPORTER_PROMETHEUS_HOST` | `0.0.0.0` |
//! | `OTEL_EXPORTER_PROMETHEUS_PORT` | `8000` |
//! | `OTEL_BSP_*`, `OTEL_BLRP_*` | `5000` ms / `2048` / `512` |
//!
//! Exporter lists are comma separated names out of `console`, `otlp` and
//! `prometheus` (metrics only); `none` disables a signal.
//!
//! ```no_run
//! use telepipe_pipeline::{standard_views, PipelineConfig, TelemetryPipeline};
//! use tracing_subscriber::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = TelemetryPipeline::init(PipelineConfig::from_env()?, standard_views()?).await?;
//!     tracing_subscriber::registry()
//!         .with(pipeline.tracing_bridge())
//!         .init();
//!
//!     let layer = pipeline.http_layer(Default::default())?;
//!     // build the service with `layer` and serve it...
//!     # drop(layer);
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use telepipe_sdk::metrics::MetricError;
use telepipe_sdk::ExportError;
use thiserror::Error;

mod config;
mod pipeline;
mod views;

pub use config::{
    ExporterKind, PipelineConfig, Signal, OTEL_LOGS_EXPORTER, OTEL_METRICS_EXPORTER,
    OTEL_METRIC_EXPORT_INTERVAL, OTEL_METRIC_EXPORT_INTERVAL_DEFAULT, OTEL_SERVICE_NAME,
    OTEL_SERVICE_NAME_DEFAULT, OTEL_SERVICE_VERSION, OTEL_SERVICE_VERSION_DEFAULT,
    OTEL_TRACES_EXPORTER,
};
pub use pipeline::TelemetryPipeline;
pub use views::{standard_views, STANDARD_HISTOGRAM_BOUNDARIES, TRAFFIC_VOLUME_EXPORT_NAME};

/// Invalid pipeline configuration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// An exporter list names an exporter that does not exist.
    #[error("{variable}: unknown exporter {name:?}")]
    UnknownExporter {
        /// The variable holding the list.
        variable: &'static str,
        /// The unknown name.
        name: String,
    },

    /// The exporter cannot carry the signal.
    #[error("the {exporter} exporter cannot export {signal}")]
    UnsupportedExporter {
        /// The signal.
        signal: Signal,
        /// The exporter configured for it.
        exporter: ExporterKind,
    },
}

/// Errors of building or shutting down a [`TelemetryPipeline`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An OTLP exporter could not be built.
    #[error("otlp exporter: {0}")]
    Otlp(#[from] telepipe_otlp::Error),

    /// The Prometheus scrape endpoint could not start.
    #[error("prometheus exporter: {0}")]
    Prometheus(#[from] telepipe_prometheus::Error),

    /// Instruments or views could not be created.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// Flushing or shutting down a provider failed.
    #[error(transparent)]
    Export(#[from] ExportError),
}
