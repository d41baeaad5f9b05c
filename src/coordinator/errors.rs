//! Coordinator errors

use thiserror::Error;

use crate::registry::RegistryError;
use crate::store::StoreError;

/// Result type for freshening reads
pub type FreshResult<T> = Result<T, FreshError>;

/// Errors that fail a whole freshening read.
///
/// Per-column producer, load, and write-back failures never surface here;
/// they degrade to the stored value and a diagnostic. Only the registry
/// lookup and the base row read can fail the request itself.
#[derive(Debug, Error)]
pub enum FreshError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Row store error: {0}")]
    Store(#[from] StoreError),
}
