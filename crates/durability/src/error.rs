//! Durability errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors from append-only logs and recovery
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// Log file I/O failed
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Log file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Append to a log opened for inspection only
    #[error("log {path} is open read-only")]
    ReadOnly {
        /// Log file path
        path: PathBuf,
    },

    /// Entry could not be serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Too many corrupt lines
    #[error("too many corrupt entries: {0} (max allowed: {1})")]
    TooManyCorruptEntries(u64, usize),
}

impl DurabilityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DurabilityError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for DurabilityError {
    fn from(e: serde_json::Error) -> Self {
        DurabilityError::Serialization(e.to_string())
    }
}

/// Why a single log line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Line is not `<8 hex> <json>`
    #[error("malformed frame")]
    Malformed,

    /// CRC-32 does not match the JSON body
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// CRC stored in the line
        expected: u32,
        /// CRC of the body
        actual: u32,
    },

    /// Body passed the checksum but is not a valid entry
    #[error("invalid entry: {0}")]
    InvalidEntry(String),
}

/// Result type for durability operations
pub type Result<T> = std::result::Result<T, DurabilityError>;
