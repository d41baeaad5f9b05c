//! Registry error types

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::column::ColumnSelector;
use crate::validation::ValidationFailure;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] FreshnessValidationError),

    #[error(transparent)]
    MultiValidation(#[from] MultiValidationError),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// All validation failures for one column, reported together.
#[derive(Debug, Clone)]
pub struct FreshnessValidationError {
    /// The selector the attachment targeted.
    pub selector: ColumnSelector,
    /// Every failure found, in check order.
    pub failures: Vec<ValidationFailure>,
}

impl FreshnessValidationError {
    /// Create the error.
    pub fn new(selector: ColumnSelector, failures: Vec<ValidationFailure>) -> Self {
        Self { selector, failures }
    }

    /// Whether a failure of the given kind is present.
    pub fn contains(&self, kind: crate::validation::ValidationFailureKind) -> bool {
        self.failures.iter().any(|f| f.kind == kind)
    }
}

impl fmt::Display for FreshnessValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "There were validation failures.")?;
        for failure in &self.failures {
            write!(f, "\n{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for FreshnessValidationError {}

/// Validation failures across a batch store, keyed by column. Columns absent
/// from the map were committed successfully.
#[derive(Debug, Clone)]
pub struct MultiValidationError {
    /// Per-column failures.
    pub failures: BTreeMap<ColumnSelector, Vec<ValidationFailure>>,
}

impl MultiValidationError {
    /// Create the error.
    pub fn new(failures: BTreeMap<ColumnSelector, Vec<ValidationFailure>>) -> Self {
        Self { failures }
    }
}

impl fmt::Display for MultiValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "There were validation failures for {} column(s).",
            self.failures.len()
        )?;
        for (selector, failures) in &self.failures {
            for failure in failures {
                write!(f, "\n{}: {}", selector, failure)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for MultiValidationError {}
