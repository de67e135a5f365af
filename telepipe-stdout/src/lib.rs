//! Exporters that write telemetry in a human readable form to stdout, or to
//! any other [`std::io::Write`] sink handed to their builders.
//!
//! Meant for debugging and local development; the output format is not
//! stable and must not be parsed.
//!
//! ```no_run
//! use telepipe_sdk::trace::SdkTracerProvider;
//!
//! let provider = SdkTracerProvider::builder()
//!     .with_simple_exporter(telepipe_stdout::SpanExporter::default())
//!     .build();
//!
//! provider.tracer("readme").in_span("doing_work", |_cx| {
//!     // Traced app logic here...
//! });
//!
//! provider.shutdown().unwrap();
//! ```
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod common;

#[cfg(feature = "logs")]
mod logs;
#[cfg(feature = "logs")]
pub use logs::{LogExporter, LogExporterBuilder};

#[cfg(feature = "metrics")]
mod metrics;
#[cfg(feature = "metrics")]
pub use metrics::{MetricExporter, MetricExporterBuilder};

#[cfg(feature = "trace")]
mod trace;
#[cfg(feature = "trace")]
pub use trace::{SpanExporter, SpanExporterBuilder};
