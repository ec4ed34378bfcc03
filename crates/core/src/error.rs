//! Error types for the core crate
//!
//! [`ValidationError`] is the terminal, per-record outcome of schema
//! validation. It is counted, never propagated as a pipeline failure.
//! [`CoreError`] covers the rare failures of canonical serialization.

use thiserror::Error;

/// Why a raw payload was rejected by the schema validator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Payload bytes are not valid UTF-8 JSON
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Payload decoded, but the top level is not a JSON object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// A required field is absent (or null)
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present with the wrong primitive type
    #[error("field '{field}' must be {expected}")]
    WrongType {
        /// Field name
        field: &'static str,
        /// Expected type description
        expected: &'static str,
    },

    /// A score is numeric but outside [0, 1] or not finite
    #[error("field '{field}' = {value} is outside [0, 1]")]
    ScoreOutOfRange {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// The validator does not know the requested schema version
    #[error("unknown schema version '{0}'")]
    UnknownSchemaVersion(String),
}

impl ValidationError {
    /// Name of the offending field, when the error is about one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingField(field)
            | ValidationError::WrongType { field, .. }
            | ValidationError::ScoreOutOfRange { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Core errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Canonical serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record rejected by the validator
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
