use std::result;
use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` type for metric operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned by the metrics SDK.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MetricError {
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
    /// Invalid view or reader configuration.
    #[error("Config error {0}")]
    Config(String),
    /// Invalid instrument name or unit.
    #[error("Invalid instrument configuration: {0}")]
    InvalidInstrumentConfiguration(&'static str),
    /// An instrument with the same name but a different identity already
    /// exists in this meter.
    #[error("instrument {name:?} already registered as {existing}, cannot create it as {requested}")]
    DuplicateInstrumentConflict {
        /// Name of the conflicting instrument
        name: String,
        /// Identity of the registered instrument
        existing: String,
        /// Identity that was requested
        requested: String,
    },
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}
