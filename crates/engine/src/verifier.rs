//! Forensic verifier
//!
//! Works on an immutable [`PipelineSnapshot`], either taken from a running
//! pipeline or loaded from a data directory, so an auditor needs nothing but
//! the persisted logs and the verification key.
//!
//! Chain-integrity failures are reported per checkpoint. They are never
//! raised at ingestion time.

use crate::checkpoint::{fold_cumulative_hash, verify_chain, ChainVerification};
use crate::error::Result;
use crate::pipeline::{CHECKPOINT_LOG, DEDUP_LOG, WAL_LOG};
use crate::reader::PipelineSnapshot;
use cairn_core::{is_sha256_hex, Checkpoint, CheckpointId};
use cairn_durability::{AppendLog, CorruptLine, IndeterminateTxn, Recovery, RecoveryOptions, WalEntry};
use cairn_security::{SignatureScheme, VerificationKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Steps an independent party follows with a forensic export
pub const REPLAY_INSTRUCTIONS: [&str; 4] = [
    "1. Verify every checkpoint signature over its canonical JSON with the signature field set to \"\".",
    "2. Replay the WAL in order; for each prepare entry take SHA-256 of the canonical JSON of its payload.",
    "3. Recompute the cumulative hash: start from \"\", then h = SHA-256(h_hex || digest_hex) per prepare.",
    "4. Compare the recomputed hash after n records with every checkpoint whose event_count is n, and with the head.",
];

/// Result of [`ForensicVerifier::verify`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Per-checkpoint results
    pub chain: ChainVerification,
    /// Every link matches its predecessor
    pub chain_integrity: bool,
    /// Every signature verifies
    pub signatures_valid: bool,
    /// Every cumulative hash, and the head, is 64 lowercase hex chars
    pub cumulative_hash_well_formed: bool,
    /// The WAL holds at least one entry
    pub wal_non_empty: bool,
    /// Dedup size matches the accepted-event count; `None` when no dedup set
    /// was available to compare
    pub dedup_consistent: Option<bool>,
    /// No loaded log had a damaged line
    pub logs_intact: bool,
    /// Damaged checkpoint log lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrupt_checkpoint_lines: Vec<CorruptLine>,
    /// Damaged WAL lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrupt_wal_lines: Vec<CorruptLine>,
    /// Damaged dedup journal lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrupt_dedup_lines: Vec<CorruptLine>,
    /// All of the above hold
    pub end_to_end_traceability: bool,
}

impl VerificationReport {
    /// Checkpoints that failed at least one check
    pub fn failed_checkpoints(&self) -> Vec<CheckpointId> {
        self.chain.failures().iter().map(|c| c.checkpoint_id).collect()
    }
}

/// Self-contained history export for independent replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicExport {
    /// Pipeline identifier
    pub pipeline_id: String,
    /// When the export was produced
    pub exported_at: DateTime<Utc>,
    /// Signature scheme of the chain
    pub signature_scheme: SignatureScheme,
    /// Verification key fingerprint
    pub key_fingerprint: String,
    /// Ed25519 verifying key; absent for the shared-secret scheme
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Cumulative hash at the chain head
    pub cumulative_hash: String,
    /// Lifetime accepted-event count
    pub event_count: u64,
    /// Full checkpoint chain
    pub checkpoints: Vec<Checkpoint>,
    /// Full WAL
    pub wal: Vec<WalEntry>,
    /// Replay procedure
    pub replay_instructions: Vec<String>,
}

/// Result of [`ForensicVerifier::replay`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Prepare entries folded
    pub records_replayed: u64,
    /// Cumulative hash recomputed from the WAL
    pub recomputed_hash: String,
    /// Cumulative hash at the stored chain head
    pub stored_hash: String,
    /// Recomputed and stored head agree, and so do the counts
    pub head_matches: bool,
    /// Checkpoints compared against the replay
    pub checkpoints_compared: usize,
    /// Checkpoints whose hash disagrees with the replay, or that claim more
    /// events than the WAL holds
    pub mismatched_checkpoints: Vec<CheckpointId>,
    /// Prepared transactions with no terminal entry
    pub indeterminate: Vec<IndeterminateTxn>,
    /// Prepare entries repeating an already replayed event
    pub repeated_events: u64,
}

impl ReplayReport {
    /// The WAL fully accounts for the chain
    pub fn is_consistent(&self) -> bool {
        self.head_matches && self.mismatched_checkpoints.is_empty() && self.repeated_events == 0
    }
}

/// Verifies a pipeline snapshot
#[derive(Debug, Clone)]
pub struct ForensicVerifier {
    snapshot: PipelineSnapshot,
    key: VerificationKey,
}

impl ForensicVerifier {
    /// Verifier over an in-memory snapshot
    pub fn new(snapshot: PipelineSnapshot, key: VerificationKey) -> Self {
        ForensicVerifier { snapshot, key }
    }

    /// Load the logs of a data directory
    ///
    /// The files are never modified. Lines that fail their checksum are kept
    /// when their body still decodes, so the altered checkpoint itself fails
    /// verification, and every damaged line is listed in the report. The
    /// dedup check is only possible when a durable dedup journal exists.
    pub fn load(data_dir: &Path, pipeline_id: impl Into<String>, key: VerificationKey) -> Result<Self> {
        let checkpoint_log = AppendLog::<Checkpoint>::open_read_only(data_dir.join(CHECKPOINT_LOG))?;
        let wal_log = AppendLog::<WalEntry>::open_read_only(data_dir.join(WAL_LOG))?;

        let dedup_path = data_dir.join(DEDUP_LOG);
        let (dedup_size, corrupt_dedup_lines) = if dedup_path.exists() {
            let journal = AppendLog::<String>::open_read_only(&dedup_path)?;
            let keys = journal.snapshot().into_iter().collect::<HashSet<_>>();
            (Some(keys.len()), journal.corrupt_lines().to_vec())
        } else {
            (None, Vec::new())
        };

        let snapshot = PipelineSnapshot {
            pipeline_id: pipeline_id.into(),
            checkpoints: checkpoint_log.snapshot(),
            wal: wal_log.snapshot(),
            dedup_size,
            dedup_baseline: 0,
            corrupt_checkpoint_lines: checkpoint_log.corrupt_lines().to_vec(),
            corrupt_wal_lines: wal_log.corrupt_lines().to_vec(),
            corrupt_dedup_lines,
        };
        if !snapshot.logs_intact() {
            warn!(
                checkpoints = snapshot.corrupt_checkpoint_lines.len(),
                wal = snapshot.corrupt_wal_lines.len(),
                dedup = snapshot.corrupt_dedup_lines.len(),
                "Damaged log lines found while loading"
            );
        }

        info!(
            data_dir = %data_dir.display(),
            checkpoints = snapshot.checkpoints.len(),
            wal_entries = snapshot.wal.len(),
            "Loaded pipeline history"
        );
        Ok(ForensicVerifier::new(snapshot, key))
    }

    /// Snapshot under verification
    pub fn snapshot(&self) -> &PipelineSnapshot {
        &self.snapshot
    }

    /// Run every check
    pub fn verify(&self) -> VerificationReport {
        let chain = verify_chain(&self.snapshot.checkpoints, &self.key);
        let event_count = self.snapshot.event_count();
        let head = self.snapshot.cumulative_hash();

        let chain_integrity = chain.links_valid();
        let signatures_valid = chain.signatures_valid();
        let cumulative_hash_well_formed =
            chain.hashes_well_formed() && (is_sha256_hex(head) || (event_count == 0 && head.is_empty()));
        let wal_non_empty = !self.snapshot.wal.is_empty();
        let dedup_consistent = self.snapshot.dedup_size.map(|size| {
            size as u64 == event_count.saturating_sub(self.snapshot.dedup_baseline)
        });
        let logs_intact = self.snapshot.logs_intact();

        let end_to_end_traceability = chain_integrity
            && signatures_valid
            && cumulative_hash_well_formed
            && wal_non_empty
            && dedup_consistent.unwrap_or(true)
            && logs_intact;

        if !end_to_end_traceability {
            warn!(
                chain_integrity,
                signatures_valid,
                cumulative_hash_well_formed,
                wal_non_empty,
                ?dedup_consistent,
                logs_intact,
                failed = chain.failures().len(),
                "Verification failed"
            );
        }

        VerificationReport {
            chain,
            chain_integrity,
            signatures_valid,
            cumulative_hash_well_formed,
            wal_non_empty,
            dedup_consistent,
            logs_intact,
            corrupt_checkpoint_lines: self.snapshot.corrupt_checkpoint_lines.clone(),
            corrupt_wal_lines: self.snapshot.corrupt_wal_lines.clone(),
            corrupt_dedup_lines: self.snapshot.corrupt_dedup_lines.clone(),
            end_to_end_traceability,
        }
    }

    /// Export everything an independent party needs to replay the history
    pub fn forensic_replay(&self) -> ForensicExport {
        ForensicExport {
            pipeline_id: self.snapshot.pipeline_id.clone(),
            exported_at: Utc::now(),
            signature_scheme: self.key.scheme(),
            key_fingerprint: self.key.fingerprint(),
            public_key: self.key.public_key_hex(),
            cumulative_hash: self.snapshot.cumulative_hash().to_string(),
            event_count: self.snapshot.event_count(),
            checkpoints: self.snapshot.checkpoints.clone(),
            wal: self.snapshot.wal.clone(),
            replay_instructions: REPLAY_INSTRUCTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Recompute the cumulative hash from the WAL and compare it to the chain
    pub fn replay(&self) -> Result<ReplayReport> {
        let mut hashes = vec![String::new()];
        let mut seen = HashSet::new();
        let mut repeated_events = 0u64;

        for entry in &self.snapshot.wal {
            let Some(record) = entry.payload() else {
                continue;
            };
            if !seen.insert(record.event_id()) {
                repeated_events += 1;
                continue;
            }
            let digest = record.content_digest()?;
            let next = fold_cumulative_hash(&hashes[hashes.len() - 1], &digest);
            hashes.push(next);
        }

        let mut mismatched_checkpoints = Vec::new();
        for checkpoint in &self.snapshot.checkpoints {
            let matches = usize::try_from(checkpoint.event_count)
                .ok()
                .and_then(|n| hashes.get(n))
                .is_some_and(|h| *h == checkpoint.cumulative_hash);
            if !matches {
                mismatched_checkpoints.push(checkpoint.checkpoint_id);
            }
        }

        let records_replayed = (hashes.len() - 1) as u64;
        let recomputed_hash = hashes[hashes.len() - 1].clone();
        let stored_hash = self.snapshot.cumulative_hash().to_string();
        let head_matches =
            recomputed_hash == stored_hash && records_replayed == self.snapshot.event_count();
        let indeterminate = Recovery::classify(&self.snapshot.wal, &RecoveryOptions::default()).indeterminate;

        let report = ReplayReport {
            records_replayed,
            recomputed_hash,
            stored_hash,
            head_matches,
            checkpoints_compared: self.snapshot.checkpoints.len(),
            mismatched_checkpoints,
            indeterminate,
            repeated_events,
        };
        if report.is_consistent() {
            info!(records = report.records_replayed, "Replay matches checkpoint chain");
        } else {
            warn!(
                mismatched = report.mismatched_checkpoints.len(),
                head_matches = report.head_matches,
                "Replay disagrees with checkpoint chain"
            );
        }
        Ok(report)
    }
}
