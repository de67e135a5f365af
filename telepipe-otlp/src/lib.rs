//! Exporters sending spans, metrics and log records to an OpenTelemetry
//! collector with the OTLP protocol over gRPC.
//!
//! Builders resolve their settings from code first, then from the
//! environment ([`OTEL_EXPORTER_OTLP_ENDPOINT`], [`OTEL_EXPORTER_OTLP_INSECURE`],
//! [`OTEL_EXPORTER_OTLP_TIMEOUT`], [`OTEL_EXPORTER_OTLP_HEADERS`] and their
//! per-signal variants), then from defaults: `http://localhost:4317`,
//! plaintext, 10 seconds.
//!
//! The gRPC channel connects lazily and is driven by the Tokio runtime the
//! exporter was built in, so build exporters inside a multi-threaded runtime
//! and keep it alive until the pipeline is shut down.
//!
//! ```no_run
//! use telepipe_otlp::WithExportConfig;
//! use telepipe_sdk::trace::SdkTracerProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exporter = telepipe_otlp::SpanExporter::builder()
//!         .with_endpoint("http://collector:4317")
//!         .build()?;
//!     let provider = SdkTracerProvider::builder()
//!         .with_batch_exporter(exporter)
//!         .build();
//!
//!     provider.tracer("checkout").in_span("charge", |_cx| {});
//!
//!     provider.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! * `trace`, `metrics`, `logs`: the signals to export, all enabled by default.
//! * `tls`: connect with TLS when `insecure` is `false`. Without it, building
//!   a secure exporter fails with [`Error::InvalidConfig`].
//! * `internal-logs`: report export diagnostics through `tracing`.
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

mod exporter;
#[cfg(feature = "logs")]
mod logs;
#[cfg(feature = "metrics")]
mod metric;
#[cfg(feature = "trace")]
mod span;
mod transform;

pub use crate::exporter::{
    ExportConfig, HasExportConfig, HasTonicConfig, TonicExporterBuilder, WithExportConfig,
    WithTonicConfig, OTEL_EXPORTER_OTLP_ENDPOINT, OTEL_EXPORTER_OTLP_ENDPOINT_DEFAULT,
    OTEL_EXPORTER_OTLP_HEADERS, OTEL_EXPORTER_OTLP_INSECURE, OTEL_EXPORTER_OTLP_TIMEOUT,
    OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT,
};

#[cfg(feature = "logs")]
pub use crate::logs::{
    LogExporter, LogExporterBuilder, OTEL_EXPORTER_OTLP_LOGS_ENDPOINT,
    OTEL_EXPORTER_OTLP_LOGS_TIMEOUT,
};

#[cfg(feature = "metrics")]
pub use crate::metric::{
    MetricExporter, MetricExporterBuilder, OTEL_EXPORTER_OTLP_METRICS_ENDPOINT,
    OTEL_EXPORTER_OTLP_METRICS_TIMEOUT,
};

#[cfg(feature = "trace")]
pub use crate::span::{
    SpanExporter, SpanExporterBuilder, OTEL_EXPORTER_OTLP_TRACES_ENDPOINT,
    OTEL_EXPORTER_OTLP_TRACES_TIMEOUT,
};

/// Errors from building or using an OTLP exporter.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Wrap error from [`tonic::transport::Error`]
    #[error("transport error {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Wrap the [`http::uri::InvalidUri`] error
    #[error("invalid URI {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// The collector answered with a non-OK gRPC status.
    #[error("the grpc server returns error ({code}): {message}")]
    Status {
        /// grpc status code
        code: tonic::Code,
        /// error message
        message: String,
    },

    /// A setting cannot be honored.
    #[error("invalid configuration `{name}`: {reason}")]
    InvalidConfig {
        /// The setting at fault.
        name: &'static str,
        /// Why it cannot be honored.
        reason: String,
    },

    /// The exporter was built outside of a Tokio runtime.
    #[error("no Tokio runtime to drive the gRPC channel")]
    NoRuntime,
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Error {
        Error::Status {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<Error> for telepipe_sdk::ExportError {
    fn from(err: Error) -> Self {
        telepipe_sdk::ExportError::Failed(err.to_string())
    }
}
