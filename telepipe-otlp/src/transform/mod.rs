//! Conversion of SDK telemetry into OTLP protobuf messages.
pub(crate) mod common;
#[cfg(feature = "logs")]
pub(crate) mod logs;
#[cfg(feature = "metrics")]
pub(crate) mod metrics;
#[cfg(feature = "trace")]
pub(crate) mod trace;
