//! # Kiln Error Types
//!
//! Crate-wide error enum plus the validation error carried by definition and
//! metadata checks. Module-specific errors (`StoreError`, `MessagingError`)
//! live next to their modules and convert into [`KilnError`] at the seams.

use thiserror::Error;

use crate::messaging::MessagingError;
use crate::store::StoreError;

/// Convenient result alias used across the workspace
pub type KilnResult<T> = Result<T, KilnError>;

/// Top-level error type for kiln operations
#[derive(Debug, Error)]
pub enum KilnError {
    /// Authoritative store failure (bubbles up so the bus redelivers)
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Queue transport failure
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Invalid definition or metadata, surfaced to the caller and never
    /// auto-retried
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration could not be loaded or parsed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Execution-level failure (missing artifacts, unregistered stores)
    #[error("execution error: {0}")]
    Execution(String),
}

impl KilnError {
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution(reason.into())
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

/// A named validation failure with a human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {description}")]
pub struct ValidationError {
    pub name: String,
    pub description: String,
}

impl ValidationError {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("invalid-definition", "output name is duplicated");
        assert_eq!(
            err.to_string(),
            "invalid-definition: output name is duplicated"
        );
    }

    #[test]
    fn test_validation_error_converts_to_kiln_error() {
        let err: KilnError = ValidationError::new("invalid-metadata", "bad side-car").into();
        assert!(matches!(err, KilnError::Validation(_)));
        assert_eq!(err.to_string(), "invalid-metadata: bad side-car");
    }
}
