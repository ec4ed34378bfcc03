//! Unified error type for Cairn.
//!
//! Wraps the per-crate errors so callers of the facade match on one enum.

use cairn_core::{CoreError, ValidationError};
use cairn_durability::DurabilityError;
use cairn_engine::{EngineError, StreamReport};
use cairn_security::KeyError;
use cairn_storage::StorageError;
use thiserror::Error;

/// All Cairn errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A payload failed schema validation
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Canonical serialization failed
    #[error("serialization error: {0}")]
    Core(#[from] CoreError),

    /// Signing key could not be loaded or created
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Content store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Checkpoint log, WAL or dedup journal failure
    #[error("durability error: {0}")]
    Durability(#[from] DurabilityError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Persisted history failed verification
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A stream stopped at a failing record
    #[error("stream aborted after {} records: {source}", report.total())]
    StreamAborted {
        /// Counts up to the failing record
        report: Box<StreamReport>,
        /// The failure
        #[source]
        source: Box<Error>,
    },
}

/// Result type for Cairn operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a schema validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Error::Validation(_))
    }

    /// Check if the content store failed.
    pub fn is_storage(&self) -> bool {
        matches!(self.root(), Error::Storage(_))
    }

    /// Check if persisted history is untrustworthy.
    ///
    /// Automated reliance on the chain should stop until a manual audit.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self.root(),
            Error::Integrity(_) | Error::Storage(StorageError::Corrupted { .. })
        )
    }

    /// Counts of an aborted stream.
    pub fn partial_report(&self) -> Option<&StreamReport> {
        match self {
            Error::StreamAborted { report, .. } => Some(report),
            _ => None,
        }
    }

    fn root(&self) -> &Error {
        match self {
            Error::StreamAborted { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Config(msg) => Error::Config(msg),
            EngineError::Key(e) => Error::Key(e),
            EngineError::Storage(e) => Error::Storage(e),
            EngineError::Durability(e) => Error::Durability(e),
            EngineError::Core(e) => Error::Core(e),
            EngineError::Integrity(msg) => Error::Integrity(msg),
            EngineError::StreamAborted { report, source } => Error::StreamAborted {
                report,
                source: Box::new(Error::from(*source)),
            },
        }
    }
}
