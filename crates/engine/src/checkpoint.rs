//! Hash-chain checkpoint manager
//!
//! Owns the cumulative hash, the accepted-event count and the checkpoint log.
//! Only the pipeline's single writer mutates it.
//!
//! Cumulative hash recurrence, starting from the empty string:
//!
//! ```text
//! h' = SHA256( h_hex || SHA256(canonical(record))_hex )
//! ```
//!
//! Both operands are lowercase hex strings concatenated as text.

use crate::error::Result;
use cairn_core::{is_sha256_hex, sha256_hex, Checkpoint, CheckpointId, EnrichedRecord, PipelineStep};
use cairn_durability::{AppendLog, LogReader};
use cairn_security::{CheckpointSigner, VerificationKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fold one record digest into a cumulative hash
pub fn fold_cumulative_hash(previous: &str, record_digest: &str) -> String {
    let mut input = String::with_capacity(previous.len() + record_digest.len());
    input.push_str(previous);
    input.push_str(record_digest);
    sha256_hex(input.as_bytes())
}

/// Checkpoint manager
pub struct CheckpointManager {
    log: AppendLog<Checkpoint>,
    signer: CheckpointSigner,
    cumulative_hash: String,
    event_count: u64,
}

impl CheckpointManager {
    /// Create a manager over a (possibly non-empty) checkpoint log
    ///
    /// The cumulative hash and event count resume from the last checkpoint.
    pub fn new(log: AppendLog<Checkpoint>, signer: CheckpointSigner) -> Self {
        let (cumulative_hash, event_count) = match log.last() {
            Some(last) => (last.cumulative_hash, last.event_count),
            None => (String::new(), 0),
        };
        if event_count > 0 {
            info!(
                checkpoints = log.len(),
                event_count,
                "Resumed checkpoint chain"
            );
        }
        CheckpointManager {
            log,
            signer,
            cumulative_hash,
            event_count,
        }
    }

    /// Fold a newly accepted record into the cumulative hash
    pub fn update_cumulative_hash(&mut self, record: &EnrichedRecord) -> Result<&str> {
        let digest = record.content_digest()?;
        Ok(self.fold_digest(&digest))
    }

    /// Fold a precomputed record digest
    pub fn fold_digest(&mut self, record_digest: &str) -> &str {
        self.cumulative_hash = fold_cumulative_hash(&self.cumulative_hash, record_digest);
        self.event_count += 1;
        &self.cumulative_hash
    }

    /// Fold a newly accepted record and append its `"ingest"` checkpoint
    ///
    /// If the append fails the cumulative hash and event count are restored,
    /// so the record can be retried without being counted twice.
    pub fn record_ingest(&mut self, record: &EnrichedRecord) -> Result<Checkpoint> {
        let restore = (self.cumulative_hash.clone(), self.event_count);
        self.update_cumulative_hash(record)?;
        self.create_checkpoint(PipelineStep::Ingest).map_err(|e| {
            (self.cumulative_hash, self.event_count) = restore;
            e
        })
    }

    /// Sign and append a checkpoint for `step`
    pub fn create_checkpoint(&mut self, step: PipelineStep) -> Result<Checkpoint> {
        let previous = match self.log.last() {
            Some(prev) => Some(prev.link_hash()?),
            None => None,
        };
        let mut checkpoint =
            Checkpoint::unsigned(step, self.event_count, self.cumulative_hash.clone(), previous);
        checkpoint.signature = self.signer.sign(&checkpoint.signing_bytes()?);

        self.log.append(checkpoint.clone())?;
        debug!(
            step = %step,
            checkpoint_id = %checkpoint.checkpoint_id,
            event_count = self.event_count,
            "Created checkpoint"
        );
        Ok(checkpoint)
    }

    /// Verify the chain as currently held
    pub fn verify_chain(&self) -> ChainVerification {
        verify_chain(&self.log.snapshot(), &self.signer.verification_key())
    }

    /// Current cumulative hash (empty before the first record)
    pub fn cumulative_hash(&self) -> &str {
        &self.cumulative_hash
    }

    /// Accepted-event count
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Number of checkpoints
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether no checkpoint exists yet
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Copy of the chain
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.log.snapshot()
    }

    /// Shared read handle over the chain
    pub fn reader(&self) -> LogReader<Checkpoint> {
        self.log.reader()
    }

    /// Key that verifies this chain
    pub fn verification_key(&self) -> VerificationKey {
        self.signer.verification_key()
    }

    /// Flush pending appends
    pub fn sync(&mut self) -> Result<()> {
        Ok(self.log.sync()?)
    }
}

// ============================================================================
// Chain verification
// ============================================================================

/// Verification outcome for one checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointCheck {
    /// Position in the chain
    pub index: usize,
    /// Checkpoint identifier
    pub checkpoint_id: CheckpointId,
    /// Step the checkpoint closed out
    pub step: PipelineStep,
    /// `previous_checkpoint_hash` matches the predecessor (absent only at index 0)
    pub link_valid: bool,
    /// Signature verifies over the blanked canonical form
    pub signature_valid: bool,
    /// Cumulative hash is 64 lowercase hex chars (or empty at count 0)
    pub hash_well_formed: bool,
}

impl CheckpointCheck {
    /// All three checks passed
    pub fn is_valid(&self) -> bool {
        self.link_valid && self.signature_valid && self.hash_well_formed
    }
}

/// Per-checkpoint verification of a chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// One entry per checkpoint, in chain order
    pub checks: Vec<CheckpointCheck>,
}

impl ChainVerification {
    /// Every link is intact
    pub fn links_valid(&self) -> bool {
        self.checks.iter().all(|c| c.link_valid)
    }

    /// Every signature verifies
    pub fn signatures_valid(&self) -> bool {
        self.checks.iter().all(|c| c.signature_valid)
    }

    /// Every cumulative hash is well formed
    pub fn hashes_well_formed(&self) -> bool {
        self.checks.iter().all(|c| c.hash_well_formed)
    }

    /// Every check on every checkpoint passed
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(CheckpointCheck::is_valid)
    }

    /// Checkpoints with at least one failed check
    pub fn failures(&self) -> Vec<&CheckpointCheck> {
        self.checks.iter().filter(|c| !c.is_valid()).collect()
    }
}

/// Verify links, signatures and hash shape of a checkpoint list
pub fn verify_chain(checkpoints: &[Checkpoint], key: &VerificationKey) -> ChainVerification {
    let mut checks = Vec::with_capacity(checkpoints.len());
    let mut previous_link: Option<String> = None;

    for (index, checkpoint) in checkpoints.iter().enumerate() {
        let link_valid = match (index, &checkpoint.previous_checkpoint_hash) {
            (0, None) => true,
            (0, Some(_)) | (_, None) => false,
            (_, Some(stored)) => previous_link.as_deref() == Some(stored.as_str()),
        };
        let signature_valid = checkpoint
            .signing_bytes()
            .map(|bytes| key.verify(&bytes, &checkpoint.signature))
            .unwrap_or(false);
        let hash_well_formed = is_sha256_hex(&checkpoint.cumulative_hash)
            || (checkpoint.event_count == 0 && checkpoint.cumulative_hash.is_empty());

        checks.push(CheckpointCheck {
            index,
            checkpoint_id: checkpoint.checkpoint_id,
            step: checkpoint.pipeline_step,
            link_valid,
            signature_valid,
            hash_well_formed,
        });
        previous_link = checkpoint.link_hash().ok();
    }

    ChainVerification { checks }
}
