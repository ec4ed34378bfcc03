//! # Cairn
//!
//! Cryptographically auditable ingestion pipeline for evaluation records.
//!
//! Every accepted record is validated, stamped with lineage, deduplicated,
//! written once to a content-addressed store, folded into a cumulative hash
//! and published downstream through a write-ahead-logged two-phase commit.
//! Each step closes with a signed checkpoint linked to its predecessor, so an
//! auditor holding only the logs and the verification key can replay and
//! certify the pipeline's history.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cairn::prelude::*;
//!
//! let config = PipelineConfig::new(
//!     "rep-audit-1",
//!     SigningConfig { scheme: SignatureScheme::Ed25519, key_path: "signing.key".into() },
//! )
//! .with_data_dir("./cairn-data");
//!
//! let mut pipeline = Pipeline::open(config)?;
//! let report = pipeline.process_stream(records)?;
//! assert!(pipeline.verifier().verify().end_to_end_traceability);
//! ```
//!
//! ## Crates
//!
//! - [`cairn_core`]: record types, schema validation, lineage, checkpoints
//! - [`cairn_security`]: Ed25519 and shared-secret checkpoint signing
//! - [`cairn_storage`]: immutable content-addressed store
//! - [`cairn_durability`]: append-only logs, WAL, recovery scan
//! - [`cairn_engine`]: dedup, checkpoint chain, publish, orchestrator, verifier

#![warn(missing_docs)]

mod error;

pub mod prelude;

pub use error::{Error, Result};

pub use cairn_core;
pub use cairn_durability;
pub use cairn_engine;
pub use cairn_security;
pub use cairn_storage;

pub use cairn_engine::{
    AuditReport, CancelFlag, Downstream, ForensicVerifier, Pipeline, PipelineBuilder, PipelineConfig,
    PipelineReader, RecordOutcome, StreamReport,
};
