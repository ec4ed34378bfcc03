//! Stored object envelope
//!
//! What lands on disk (or in memory) for each content key: the enriched record
//! plus storage-side metadata. The CRC-32 checksum is computed over the
//! record's canonical bytes and is independent of the SHA-256 content key, so
//! a reader can tell bit rot apart from a mislabelled object.

use crate::error::{Result, StorageError};
use cairn_core::{is_sha256_hex, sha256_hex, EnrichedRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored form of an enriched record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// The enriched record as persisted
    pub record: EnrichedRecord,
    /// Content key the object is stored under
    pub content_key: String,
    /// When the object was first written
    pub stored_at: DateTime<Utc>,
    /// Pipeline that wrote the object
    pub pipeline_id: String,
    /// CRC-32 of the record's canonical bytes, 8 lowercase hex chars
    pub checksum: String,
}

impl StoredObject {
    /// Wrap a record for storage, computing its key and checksum
    pub fn new(record: EnrichedRecord, pipeline_id: &str) -> Result<Self> {
        let bytes = record.canonical_bytes()?;
        Ok(StoredObject {
            content_key: sha256_hex(&bytes),
            checksum: crc32_hex(&bytes),
            record,
            stored_at: Utc::now(),
            pipeline_id: pipeline_id.to_string(),
        })
    }

    /// Re-check the checksum and content key against the record
    pub fn verify(&self) -> Result<()> {
        let bytes = self.record.canonical_bytes()?;
        if crc32_hex(&bytes) != self.checksum {
            return Err(StorageError::Corrupted {
                key: self.content_key.clone(),
                reason: "checksum mismatch".into(),
            });
        }
        if sha256_hex(&bytes) != self.content_key {
            return Err(StorageError::Corrupted {
                key: self.content_key.clone(),
                reason: "content key does not match record".into(),
            });
        }
        Ok(())
    }
}

/// CRC-32 of `bytes` as 8 lowercase hex chars
pub fn crc32_hex(bytes: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(bytes))
}

/// Reject keys that could escape the object directory
pub(crate) fn check_key(key: &str) -> Result<()> {
    if is_sha256_hex(key) {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
