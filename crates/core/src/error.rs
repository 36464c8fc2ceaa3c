//! Error types shared by the core data model.
//!
//! `CoreError` covers failures in constructing or validating the data model
//! itself (identifiers, durations). The compiler and runtime crates define
//! their own leaf error enums for their phases, following the same
//! `thiserror` shape.

use thiserror::Error;

/// Core errors for the shared data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A rule name or sensor identifier does not match
    /// `^[A-Za-z_][A-Za-z0-9_]*$`.
    #[error("invalid identifier: '{0}' does not match ^[A-Za-z_][A-Za-z0-9_]*$")]
    InvalidIdentifier(String),

    /// A duration literal does not match `^\d+(ms|s|m|h|d)$`.
    #[error("invalid duration literal: '{0}'")]
    InvalidDuration(String),

    /// Field-specific validation failure.
    #[error("validation failed for field '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    /// Type mismatch between expected and actual value kinds.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Internal invariant violation; should not occur given valid input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::SerializationError(e.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::SerializationError(e.to_string())
    }
}

/// Result type alias for `CoreError`.
pub type CoreResult<T> = Result<T, CoreError>;
