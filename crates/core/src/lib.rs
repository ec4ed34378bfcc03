//! Core types for Cairn
//!
//! This crate holds everything that is pure computation over records:
//! - Identifiers: EventId, TxnId, CheckpointId
//! - Canonical JSON serialization and SHA-256 helpers
//! - Record types: RawEvaluationRecord, LineageMetadata, EnrichedRecord
//! - SchemaValidator: untrusted bytes to typed record
//! - LineageEnricher: provenance stamping, sole minting point of EventId
//! - Checkpoint: chain link type with signing and link digests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod checkpoint;
pub mod error;
pub mod lineage;
pub mod record;
pub mod schema;
pub mod types;

pub use canonical::{canonical_bytes, canonical_json_bytes, canonical_sha256, is_sha256_hex, sha256_hex};
pub use checkpoint::{Checkpoint, PipelineStep};
pub use error::{CoreError, Result, ValidationError};
pub use lineage::LineageEnricher;
pub use record::{EnrichedRecord, LineageMetadata, RawEvaluationRecord};
pub use schema::{SchemaValidator, SCHEMA_VERSION, SUPPORTED_SCHEMA_VERSIONS};
pub use types::{CheckpointId, EventId, TxnId};
