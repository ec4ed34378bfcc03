//! Evaluation record types
//!
//! - [`RawEvaluationRecord`]: the producer-supplied, validated record
//! - [`LineageMetadata`]: immutable provenance stamped once at ingestion
//! - [`EnrichedRecord`]: raw record plus lineage, the unit that is stored,
//!   hashed into the chain and published downstream
//!
//! The serialized shape is flat: the raw fields sit at the top level next to a
//! `metadata` object, matching what upstream scorers emit.

use crate::canonical::{canonical_bytes, sha256_hex};
use crate::error::Result;
use crate::types::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A schema-valid evaluation record as received from the upstream scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvaluationRecord {
    /// Producer's evaluation identifier
    pub evaluation_id: String,
    /// Content hash of the text that was scored
    pub text_hash: String,
    /// Overall score in [0, 1]
    pub overall_score: f64,
    /// Logical-validity score in [0, 1]
    pub logical_validity_score: f64,
    /// Confidence-calibration score in [0, 1]
    pub confidence_calibration: f64,
    /// Bias indicator labels, in producer order
    pub bias_indicators: Vec<String>,
    /// Whether the evaluated text acknowledged uncertainty
    pub uncertainty_acknowledgment: bool,
    /// Producer's processing timestamp, kept verbatim
    pub processing_timestamp: String,
    /// Free-text context label
    pub context: String,
}

impl RawEvaluationRecord {
    /// Idempotency key: SHA-256 of `evaluation_id:text_hash`
    ///
    /// Two records with the same key are the same logical event. The
    /// separator keeps `("ab", "c")` and `("a", "bc")` apart.
    pub fn idempotency_key(&self) -> String {
        sha256_hex(format!("{}:{}", self.evaluation_id, self.text_hash).as_bytes())
    }
}

/// Provenance attached to an accepted record
///
/// Created once by the enricher and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageMetadata {
    /// Canonical event identity
    pub event_id: EventId,
    /// When the pipeline accepted the record
    pub ingest_timestamp: DateTime<Utc>,
    /// SHA-256 of the raw, undecoded payload bytes
    pub payload_sha256: String,
    /// Upstream provenance URI supplied by the caller
    pub upstream_provenance_uri: String,
    /// Pipeline version string
    pub pipeline_version: String,
    /// Schema version the record was validated against
    pub schema_version: String,
    /// Processing node that performed ingestion
    pub processing_node_id: String,
}

/// Raw record plus lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// The validated producer record
    #[serde(flatten)]
    pub record: RawEvaluationRecord,
    /// Immutable lineage
    pub metadata: LineageMetadata,
}

impl EnrichedRecord {
    /// Event identity of this record
    pub fn event_id(&self) -> EventId {
        self.metadata.event_id
    }

    /// Idempotency key of the underlying raw record
    pub fn idempotency_key(&self) -> String {
        self.record.idempotency_key()
    }

    /// Canonical JSON bytes of the full enriched record
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_bytes(self)
    }

    /// SHA-256 over the canonical serialization
    ///
    /// This is both the content-addressable key and the per-record digest
    /// folded into the cumulative hash.
    pub fn content_digest(&self) -> Result<String> {
        Ok(sha256_hex(&self.canonical_bytes()?))
    }
}
