//! Storage errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the content-addressable store
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem I/O failed
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// An object already exists under the key with different content
    #[error("content key collision at {0}")]
    KeyCollision(String),

    /// A stored object failed checksum or content-key verification
    #[error("stored object {key} is corrupted: {reason}")]
    Corrupted {
        /// Content key
        key: String,
        /// What failed
        reason: String,
    },

    /// A lookup key is not a 64-char lowercase hex digest
    #[error("invalid content key '{0}'")]
    InvalidKey(String),

    /// Serialization of the record or object failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<cairn_core::CoreError> for StorageError {
    fn from(e: cairn_core::CoreError) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
