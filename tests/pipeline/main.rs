//! Pipeline Integration Tests
//!
//! End-to-end behavior of the facade: counters, dedup, content addressing,
//! the checkpoint chain, two-phase publish, restart/recovery and forensic
//! verification.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test pipeline
//!
//! # Chain tests only
//! cargo test --test pipeline chain::
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cairn::cairn_core::EnrichedRecord;
use cairn::cairn_storage::{ContentStore, MemoryContentStore, PersistOutcome, StorageError, StoredObject};
use cairn::prelude::*;
use tempfile::TempDir;

// Test modules
mod chain;
mod counters;
mod dedup;
mod publish;
mod recovery;
mod storage;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Upstream URI used by every test record
pub const UPSTREAM: &str = "rep://upstream/integration";

/// A valid evaluation payload
pub fn payload(evaluation_id: &str) -> Vec<u8> {
    payload_with(evaluation_id, &format!("text-{evaluation_id}"))
}

/// A valid payload with an explicit text hash
pub fn payload_with(evaluation_id: &str, text_hash: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "evaluation_id": evaluation_id,
        "text_hash": text_hash,
        "overall_score": 0.85,
        "logical_validity_score": 0.83,
        "confidence_calibration": 0.76,
        "bias_indicators": ["confirmation_bias"],
        "uncertainty_acknowledgment": true,
        "processing_timestamp": "2026-01-01T12:00:00Z",
        "context": "integration"
    }))
    .unwrap()
}

/// A payload with one field removed
pub fn payload_without(evaluation_id: &str, field: &str) -> Vec<u8> {
    let mut value: serde_json::Value = serde_json::from_slice(&payload(evaluation_id)).unwrap();
    value.as_object_mut().unwrap().remove(field);
    serde_json::to_vec(&value).unwrap()
}

/// Pair every payload with the test upstream URI
pub fn stream(payloads: &[Vec<u8>]) -> Vec<(Vec<u8>, &'static str)> {
    payloads.iter().map(|p| (p.clone(), UPSTREAM)).collect()
}

/// In-memory pipeline config whose key lives in `dir`
pub fn ephemeral_config(dir: &TempDir, scheme: SignatureScheme) -> PipelineConfig {
    PipelineConfig::new(
        "integration",
        SigningConfig {
            scheme,
            key_path: dir.path().join("signing.key"),
        },
    )
}

/// File-backed pipeline config under `dir/data`
pub fn durable_config(dir: &TempDir) -> PipelineConfig {
    ephemeral_config(dir, SignatureScheme::Ed25519).with_data_dir(dir.path().join("data"))
}

/// Data directory used by [`durable_config`]
pub fn data_dir(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("data")
}

/// Open an ephemeral Ed25519 pipeline
pub fn open_ephemeral(dir: &TempDir) -> Pipeline {
    Pipeline::open(ephemeral_config(dir, SignatureScheme::Ed25519)).unwrap()
}

/// Verification key for the key file of a config
pub fn key_for(config: &PipelineConfig) -> VerificationKey {
    cairn::cairn_security::load_signer(config.signing.scheme, &config.signing.key_path)
        .unwrap()
        .verification_key()
}

/// Whether `path` exists and has any content
pub fn non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Content store whose writes can be switched off
pub struct FailingStore {
    inner: Arc<MemoryContentStore>,
    failing: Arc<AtomicBool>,
}

impl FailingStore {
    /// Store plus the switch and a handle to the backing store
    pub fn new() -> (Self, Arc<AtomicBool>, Arc<MemoryContentStore>) {
        let inner = Arc::new(MemoryContentStore::new("integration"));
        let failing = Arc::new(AtomicBool::new(false));
        (
            FailingStore {
                inner: Arc::clone(&inner),
                failing: Arc::clone(&failing),
            },
            failing,
            inner,
        )
    }
}

impl ContentStore for FailingStore {
    fn persist(&self, record: &EnrichedRecord) -> cairn::cairn_storage::Result<PersistOutcome> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: "objects".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.persist(record)
    }

    fn get(&self, content_key: &str) -> cairn::cairn_storage::Result<Option<StoredObject>> {
        self.inner.get(content_key)
    }

    fn contains(&self, content_key: &str) -> cairn::cairn_storage::Result<bool> {
        self.inner.contains(content_key)
    }

    fn keys(&self) -> cairn::cairn_storage::Result<Vec<String>> {
        self.inner.keys()
    }
}
