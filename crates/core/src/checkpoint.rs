//! Signed, hash-linked checkpoints
//!
//! A [`Checkpoint`] closes out one pipeline step. Two digests are derived from
//! it:
//!
//! - [`Checkpoint::signing_bytes`]: canonical JSON with `signature` blanked to
//!   `""`; this is what the signer signs and the verifier re-checks
//! - [`Checkpoint::link_hash`]: SHA-256 of the canonical JSON of the checkpoint
//!   *as signed* (signature included); the next checkpoint stores it as
//!   `previous_checkpoint_hash`
//!
//! Because the link covers the signature, re-signing a tampered checkpoint with
//! a different key still breaks the link to its successor.

use crate::canonical::{canonical_bytes, sha256_hex};
use crate::error::Result;
use crate::types::CheckpointId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline step a checkpoint closes out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStep {
    /// Record accepted and folded into the cumulative hash
    Ingest,
    /// Record durably persisted to the content store
    Store,
    /// Downstream publish committed
    PublishSuccess,
    /// Downstream publish rolled back
    PublishRollback,
}

impl PipelineStep {
    /// Wire name of the step
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Ingest => "ingest",
            PipelineStep::Store => "store",
            PipelineStep::PublishSuccess => "publish-success",
            PipelineStep::PublishRollback => "publish-rollback",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link in the checkpoint chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint identifier
    pub checkpoint_id: CheckpointId,
    /// Step this checkpoint closes out
    pub pipeline_step: PipelineStep,
    /// Cumulative accepted-event count at this point
    pub event_count: u64,
    /// Cumulative hash at this point (empty before the first record)
    pub cumulative_hash: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Hex signature over [`Checkpoint::signing_bytes`]
    pub signature: String,
    /// Link hash of the preceding checkpoint, absent for the first
    pub previous_checkpoint_hash: Option<String>,
}

impl Checkpoint {
    /// Build an unsigned checkpoint
    pub fn unsigned(
        pipeline_step: PipelineStep,
        event_count: u64,
        cumulative_hash: impl Into<String>,
        previous_checkpoint_hash: Option<String>,
    ) -> Self {
        Checkpoint {
            checkpoint_id: CheckpointId::new(),
            pipeline_step,
            event_count,
            cumulative_hash: cumulative_hash.into(),
            timestamp: Utc::now(),
            signature: String::new(),
            previous_checkpoint_hash,
        }
    }

    /// Canonical bytes with the signature field blanked
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut blank = self.clone();
        blank.signature = String::new();
        canonical_bytes(&blank)
    }

    /// Hash the successor must carry as `previous_checkpoint_hash`
    pub fn link_hash(&self) -> Result<String> {
        Ok(sha256_hex(&canonical_bytes(self)?))
    }

    /// True for the first checkpoint of a chain
    pub fn is_genesis(&self) -> bool {
        self.previous_checkpoint_hash.is_none()
    }
}
