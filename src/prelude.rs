//! Convenient imports for Cairn.
//!
//! ```ignore
//! use cairn::prelude::*;
//!
//! let mut pipeline = Pipeline::open(PipelineConfig::load(path)?)?;
//! let report = pipeline.process_stream(records)?;
//! ```

// Pipeline entry points
pub use cairn_engine::{CancelFlag, Pipeline, PipelineBuilder, PipelineConfig, PipelineReader, SigningConfig};

// Publishing
pub use cairn_engine::{AcknowledgingDownstream, Downstream, DownstreamError, PublishOutcome};

// Reports and verification
pub use cairn_engine::{AuditReport, ForensicVerifier, RecordOutcome, StreamReport, VerificationReport};

// Error handling
pub use crate::error::{Error, Result};

// Records
pub use cairn_core::{EnrichedRecord, RawEvaluationRecord};

// Keys
pub use cairn_security::{CheckpointSigner, SignatureScheme, VerificationKey};

// Re-export serde_json for convenience
pub use serde_json::json;
