//! # Logs SDK
//!
//! The log pipeline: a [`SdkLoggerProvider`] owns the log processors and
//! hands out [`SdkLogger`]s; loggers emit [`SdkLogRecord`]s, correlated with
//! the span active in the current context, which flow through every
//! registered [`LogProcessor`] to a [`LogExporter`].
//!
//! Application code normally does not emit records directly; a bridge such
//! as `telepipe-appender-tracing` turns events of an existing logging
//! framework into records.
mod export;
#[cfg(any(test, feature = "testing"))]
mod in_memory_exporter;
mod log_processor;
mod logger;
mod logger_provider;
mod record;

pub use export::{LogData, LogExporter};
#[cfg(any(test, feature = "testing"))]
pub use in_memory_exporter::InMemoryLogExporter;
pub use log_processor::{
    BatchLogProcessor, BatchLogProcessorBuilder, LogProcessor, SimpleLogProcessor,
};
pub use logger::SdkLogger;
pub use logger_provider::{LoggerProviderBuilder, SdkLoggerProvider};
pub use record::{SdkLogRecord, Severity, TraceContext};
