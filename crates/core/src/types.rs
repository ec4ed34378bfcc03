//! Identifier types used throughout the pipeline
//!
//! This module defines the opaque identifiers minted by the pipeline:
//! - [`EventId`]: Canonical identity of an accepted record, minted once at ingestion
//! - [`TxnId`]: Two-phase publish transaction identifier carried by WAL entries
//! - [`CheckpointId`]: Identifier of a signed checkpoint in the chain
//!
//! All three wrap a UUID v4 and serialize as its hyphenated string form, which
//! keeps canonical JSON of records and checkpoints stable across reloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a new random identifier (UUID v4)
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            /// Create from raw bytes
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                $name(Uuid::from_bytes(bytes))
            }

            /// Get raw bytes representation
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Parse from the hyphenated string form
            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map($name)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of an accepted record
    ///
    /// Minted exactly once by the lineage enricher. Duplicates of the same
    /// logical event still receive their own `EventId` before being dropped.
    EventId
);

uuid_id!(
    /// Identifier of a two-phase publish transaction
    ///
    /// Shared by the `prepare` entry and its terminal `commit`/`rollback`
    /// entries in the write-ahead log.
    TxnId
);

uuid_id!(
    /// Identifier of a signed checkpoint
    CheckpointId
);
