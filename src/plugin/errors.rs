//! Plugin errors

use thiserror::Error;

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Plugin resolution and lifecycle errors
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    #[error("No policy registered for reference: {0}")]
    UnknownPolicy(String),

    #[error("No producer registered for reference: {0}")]
    UnknownProducer(String),

    #[error("Bad policy state: {0}")]
    BadState(String),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error raised by a producer's `produce` call.
#[derive(Debug, Clone, Error)]
#[error("Producer failed: {0}")]
pub struct ProducerError(pub String);

impl ProducerError {
    /// Create a producer error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
