//! Row-store errors

use thiserror::Error;

/// Result type for row-store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Row-store errors
///
/// The freshening engine treats all of these as per-column producer-failure
/// equivalents on the read path; only a failed base read of the requested row
/// surfaces to the caller.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Row store unavailable: {0}")]
    Unavailable(String),

    #[error("Read failed for row '{row}': {reason}")]
    ReadFailed { row: String, reason: String },

    #[error("Write failed for row '{row}': {reason}")]
    WriteFailed { row: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}
