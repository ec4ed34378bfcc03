//! Pipeline engine for Cairn
//!
//! This crate ties the lower layers into a running pipeline instance:
//! - PipelineConfig: TOML deployment parameters
//! - DedupCache: atomic idempotency-key set, memory or journaled
//! - CheckpointManager: cumulative hash and signed, linked checkpoints
//! - PublishCoordinator: WAL-backed two-phase publish over a Downstream
//! - Pipeline: the single-writer orchestrator
//! - ForensicVerifier: chain verification, export and WAL replay

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod reader;
pub mod report;
pub mod testing;
pub mod verifier;

pub use cancel::CancelFlag;
pub use checkpoint::{fold_cumulative_hash, verify_chain, ChainVerification, CheckpointCheck, CheckpointManager};
pub use config::{DedupBacking, PipelineConfig, SigningConfig, DEFAULT_DOWNSTREAM_URI, DEFAULT_PIPELINE_VERSION};
pub use dedup::{DedupCache, DedupDecision};
pub use error::{EngineError, Result};
pub use pipeline::{
    Pipeline, PipelineBuilder, RecordOutcome, CHECKPOINT_LOG, DEDUP_LOG, INDETERMINATE_REASON, OBJECTS_DIR,
    WAL_LOG,
};
pub use publish::{AcknowledgingDownstream, Downstream, DownstreamError, PublishCoordinator, PublishOutcome};
pub use reader::{PipelineReader, PipelineSnapshot};
pub use report::{AuditReport, StreamReport, VerificationSummary};
pub use testing::ScriptedDownstream;
pub use verifier::{ForensicExport, ForensicVerifier, ReplayReport, VerificationReport, REPLAY_INSTRUCTIONS};
