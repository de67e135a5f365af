//! Errors shared by exporters, processors and readers.
use std::sync::PoisonError;
use std::time::Duration;

/// Why an export, flush or shutdown did not complete.
///
/// Export failures are recoverable: the pipeline logs them, drops the batch
/// and keeps running.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExportError {
    /// The component was already shut down.
    #[error("already shut down")]
    AlreadyShutdown,

    /// The operation did not complete within the allotted time.
    #[error("operation timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The sink rejected or could not receive the batch.
    #[error("export failed: {0}")]
    Failed(String),
}

impl<T> From<PoisonError<T>> for ExportError {
    fn from(err: PoisonError<T>) -> Self {
        ExportError::Failed(format!("lock poisoned: {err}"))
    }
}

/// Result of an export, flush or shutdown.
pub type ExportResult = Result<(), ExportError>;
