//! Engine errors
//!
//! Malformed input and duplicates are outcomes, not errors. Everything here
//! is an infrastructure failure (config, keys, storage, logs) that the caller
//! must see.

use crate::report::StreamReport;
use cairn_core::CoreError;
use cairn_durability::DurabilityError;
use cairn_security::KeyError;
use cairn_storage::StorageError;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration is invalid or unreadable
    #[error("config error: {0}")]
    Config(String),

    /// Signing key could not be loaded
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Content store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Checkpoint log, WAL or dedup journal failure
    #[error("durability error: {0}")]
    Durability(#[from] DurabilityError),

    /// Canonical serialization failure
    #[error("serialization error: {0}")]
    Core(#[from] CoreError),

    /// Persisted state is inconsistent and the pipeline refuses to open
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A record failed mid-stream; carries the counts up to that point
    #[error("stream aborted after {} records: {source}", report.total())]
    StreamAborted {
        /// Counts and keys for records handled before the failure
        report: Box<StreamReport>,
        /// The failure
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Partial report of an aborted stream
    pub fn partial_report(&self) -> Option<&StreamReport> {
        match self {
            EngineError::StreamAborted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Underlying cause, unwrapping a stream abort
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::StreamAborted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
