//! Stream and audit reports

use cairn_security::SignatureScheme;
use serde::{Deserialize, Serialize};

/// Counts and keys for one `process_stream` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    /// Accepted, stored and checkpointed
    pub processed: u64,
    /// Rejected by the validator
    pub failed: u64,
    /// Skipped as already seen
    pub duplicates: u64,
    /// Committed downstream
    pub published: u64,
    /// Content keys written (or found identical), in input order
    pub content_keys: Vec<String>,
    /// Content keys whose publish rolled back
    pub unpublished: Vec<String>,
    /// Stream stopped at a record boundary on request
    pub cancelled: bool,
}

impl StreamReport {
    /// Records handled: `processed + failed + duplicates`
    pub fn total(&self) -> u64 {
        self.processed + self.failed + self.duplicates
    }

    /// Merge another report into this one
    pub fn absorb(&mut self, other: StreamReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.duplicates += other.duplicates;
        self.published += other.published;
        self.content_keys.extend(other.content_keys);
        self.unpublished.extend(other.unpublished);
        self.cancelled |= other.cancelled;
    }
}

/// Cryptographic verification data embedded in an audit report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Head of the cumulative hash (empty before the first record)
    pub cumulative_hash: String,
    /// Signature scheme of the chain
    pub signature_scheme: SignatureScheme,
    /// Non-secret fingerprint of the verification key
    pub key_fingerprint: String,
    /// Ed25519 verifying key; never set for the shared-secret scheme
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Every checkpoint signature verifies
    pub signatures_valid: bool,
    /// Links, signatures and hash shapes all verify
    pub chain_valid: bool,
    /// Number of checkpoints
    pub checkpoint_count: usize,
    /// Number of WAL entries
    pub wal_entry_count: usize,
}

/// Audit report for a pipeline instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Pipeline identifier
    pub pipeline_id: String,
    /// Pipeline version
    pub pipeline_version: String,
    /// Processing node
    pub node_id: String,
    /// Accepted records since open
    pub processed: u64,
    /// Rejected records since open
    pub failed: u64,
    /// Duplicates since open
    pub duplicates: u64,
    /// Committed publishes since open
    pub published: u64,
    /// Accepted records over the chain's lifetime
    pub event_count: u64,
    /// Content keys written since open
    pub content_keys: Vec<String>,
    /// Content keys awaiting republish
    pub unpublished: Vec<String>,
    /// Verification data
    pub verification: VerificationSummary,
}
