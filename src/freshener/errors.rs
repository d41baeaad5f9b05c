//! Freshener cache errors

use thiserror::Error;

use crate::plugin::PluginError;

/// Result type for freshener cache operations
pub type FreshenerResult<T> = Result<T, FreshenerError>;

/// Freshener construction and lifecycle errors
#[derive(Debug, Clone, Error)]
pub enum FreshenerError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Internal error: {0}")]
    Internal(String),
}
