//! The content-addressable store interface

use crate::error::Result;
use crate::object::StoredObject;
use cairn_core::EnrichedRecord;

/// Outcome of a persist call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Content key of the record
    pub content_key: String,
    /// False when an identical object was already present
    pub newly_written: bool,
}

/// Write-once, content-addressed record storage
///
/// There is no update or delete. Implementations must be safe to read from
/// other threads while the pipeline writes.
pub trait ContentStore: Send + Sync {
    /// Persist a record under its content key
    ///
    /// Identical content is a no-op. Returns only after the object is durable;
    /// callers rely on that before checkpointing.
    fn persist(&self, record: &EnrichedRecord) -> Result<PersistOutcome>;

    /// Read an object back, verifying checksum and content key
    fn get(&self, content_key: &str) -> Result<Option<StoredObject>>;

    /// Whether an object exists under the key
    fn contains(&self, content_key: &str) -> Result<bool>;

    /// All stored content keys, sorted
    fn keys(&self) -> Result<Vec<String>>;
}
