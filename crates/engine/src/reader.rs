//! Read-only access alongside the writer
//!
//! The checkpoint log and WAL are append-only, so a reader clones a prefix
//! under a short read lock and never observes a partially written entry.
//!
//! A record touches the dedup set, the checkpoint log and the WAL in separate
//! steps. The writer publishes a [`Watermark`] of all three at every record
//! boundary, and snapshots are cut at the watermark so that they never mix a
//! half-processed record into an otherwise complete history.

use crate::verifier::ForensicVerifier;
use cairn_core::{Checkpoint, CheckpointId};
use cairn_durability::{CorruptLine, LogReader, WalEntry};
use cairn_security::VerificationKey;
use parking_lot::RwLock;
use std::sync::Arc;

/// Log lengths and dedup size at the last record boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Watermark {
    pub(crate) checkpoints: usize,
    pub(crate) wal: usize,
    pub(crate) dedup: usize,
}

/// Immutable copy of a pipeline's history
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    /// Pipeline identifier
    pub pipeline_id: String,
    /// Checkpoint chain prefix
    pub checkpoints: Vec<Checkpoint>,
    /// WAL prefix
    pub wal: Vec<WalEntry>,
    /// Confirmed dedup keys, when the dedup set is available
    pub dedup_size: Option<usize>,
    /// Accepted events the dedup set is not expected to hold
    ///
    /// Non-zero for a memory-backed set reopened over an existing chain.
    pub dedup_baseline: u64,
    /// Checkpoint log lines that failed verification on load
    pub corrupt_checkpoint_lines: Vec<CorruptLine>,
    /// WAL lines that failed verification on load
    pub corrupt_wal_lines: Vec<CorruptLine>,
    /// Dedup journal lines that failed verification on load
    pub corrupt_dedup_lines: Vec<CorruptLine>,
}

impl PipelineSnapshot {
    /// Lifetime accepted-event count, from the chain head
    pub fn event_count(&self) -> u64 {
        self.checkpoints.last().map_or(0, |c| c.event_count)
    }

    /// Cumulative hash at the chain head
    pub fn cumulative_hash(&self) -> &str {
        self.checkpoints
            .last()
            .map_or("", |c| c.cumulative_hash.as_str())
    }

    /// Identifier of the chain head
    pub fn head(&self) -> Option<CheckpointId> {
        self.checkpoints.last().map(|c| c.checkpoint_id)
    }

    /// No loaded log had a damaged line
    pub fn logs_intact(&self) -> bool {
        self.corrupt_checkpoint_lines.is_empty()
            && self.corrupt_wal_lines.is_empty()
            && self.corrupt_dedup_lines.is_empty()
    }
}

/// Cloneable read handle over a running pipeline
#[derive(Clone)]
pub struct PipelineReader {
    pub(crate) pipeline_id: String,
    pub(crate) checkpoints: LogReader<Checkpoint>,
    pub(crate) wal: LogReader<WalEntry>,
    pub(crate) watermark: Arc<RwLock<Watermark>>,
    pub(crate) dedup_baseline: u64,
    pub(crate) key: VerificationKey,
}

impl PipelineReader {
    /// Copy the history up to the last completed record
    pub fn snapshot(&self) -> PipelineSnapshot {
        let mark = *self.watermark.read();
        PipelineSnapshot {
            pipeline_id: self.pipeline_id.clone(),
            checkpoints: self.checkpoints.prefix(mark.checkpoints),
            wal: self.wal.prefix(mark.wal),
            dedup_size: Some(mark.dedup),
            dedup_baseline: self.dedup_baseline,
            corrupt_checkpoint_lines: Vec::new(),
            corrupt_wal_lines: Vec::new(),
            corrupt_dedup_lines: Vec::new(),
        }
    }

    /// Verifier over a fresh snapshot
    pub fn verifier(&self) -> ForensicVerifier {
        ForensicVerifier::new(self.snapshot(), self.key.clone())
    }

    /// Number of checkpoints up to the last completed record
    pub fn checkpoint_count(&self) -> usize {
        self.watermark.read().checkpoints
    }

    /// Number of WAL entries up to the last completed record
    pub fn wal_len(&self) -> usize {
        self.watermark.read().wal
    }

    /// Key that verifies the chain
    pub fn verification_key(&self) -> &VerificationKey {
        &self.key
    }
}

impl std::fmt::Debug for PipelineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineReader")
            .field("pipeline_id", &self.pipeline_id)
            .field("watermark", &*self.watermark.read())
            .finish()
    }
}
