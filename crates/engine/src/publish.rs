//! Two-phase publish coordinator
//!
//! # Sequence
//!
//! ```text
//! WAL prepare ─► downstream.prepare ─► WAL commit ─► downstream.commit ─► "publish-success"
//!                      │ err                               │ err
//!                      └──────────► WAL rollback ◄─────────┘
//!                                  downstream.rollback (best effort)
//!                                  "publish-rollback"
//! ```
//!
//! A rollback written after a commit entry supersedes it: the downstream
//! commit call failed. There is no retry; republishing is an external job.
//! Only WAL or checkpoint-log I/O failures are returned as errors.
//!
//! Callers needing a timeout wrap their [`Downstream`] and report the timeout
//! as an error from `prepare` or `commit`.

use crate::checkpoint::CheckpointManager;
use crate::error::Result;
use cairn_core::{EnrichedRecord, PipelineStep, TxnId};
use cairn_durability::{AppendLog, LogReader, WalEntry};
use thiserror::Error;
use tracing::{debug, warn};

/// Error reported by a downstream system
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DownstreamError(pub String);

impl DownstreamError {
    /// Build from any message
    pub fn new(message: impl Into<String>) -> Self {
        DownstreamError(message.into())
    }
}

/// The system records are published to
///
/// One bounded attempt per call; implementations must not retry internally.
pub trait Downstream: Send {
    /// Stage the record; nothing is visible downstream yet
    fn prepare(&mut self, record: &EnrichedRecord, target_uri: &str) -> std::result::Result<(), DownstreamError>;

    /// Make a prepared record visible
    fn commit(&mut self, record: &EnrichedRecord, target_uri: &str) -> std::result::Result<(), DownstreamError>;

    /// Discard a prepared record
    fn rollback(&mut self, record: &EnrichedRecord, target_uri: &str) -> std::result::Result<(), DownstreamError>;
}

/// Downstream that acknowledges everything
///
/// For deployments whose downstream is fed from the content store.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcknowledgingDownstream;

impl Downstream for AcknowledgingDownstream {
    fn prepare(&mut self, _: &EnrichedRecord, _: &str) -> std::result::Result<(), DownstreamError> {
        Ok(())
    }

    fn commit(&mut self, _: &EnrichedRecord, _: &str) -> std::result::Result<(), DownstreamError> {
        Ok(())
    }

    fn rollback(&mut self, _: &EnrichedRecord, _: &str) -> std::result::Result<(), DownstreamError> {
        Ok(())
    }
}

/// How a publish attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Downstream committed
    Committed {
        /// Transaction identifier
        txn_id: TxnId,
    },
    /// Rolled back; the record stays in the store, flagged unpublished
    RolledBack {
        /// Transaction identifier
        txn_id: TxnId,
        /// Failure that caused the rollback
        reason: String,
    },
}

impl PublishOutcome {
    /// Whether the record reached the downstream
    pub fn is_committed(&self) -> bool {
        matches!(self, PublishOutcome::Committed { .. })
    }

    /// Transaction identifier
    pub fn txn_id(&self) -> TxnId {
        match self {
            PublishOutcome::Committed { txn_id } | PublishOutcome::RolledBack { txn_id, .. } => *txn_id,
        }
    }
}

/// Writes the WAL around downstream publish attempts
pub struct PublishCoordinator {
    wal: AppendLog<WalEntry>,
    target_uri: String,
}

impl PublishCoordinator {
    /// Create a coordinator over a (possibly non-empty) WAL
    pub fn new(wal: AppendLog<WalEntry>, target_uri: impl Into<String>) -> Self {
        PublishCoordinator {
            wal,
            target_uri: target_uri.into(),
        }
    }

    /// Publish one stored record
    pub fn publish(
        &mut self,
        record: &EnrichedRecord,
        content_key: &str,
        downstream: &mut dyn Downstream,
        checkpoints: &mut CheckpointManager,
    ) -> Result<PublishOutcome> {
        let txn_id = TxnId::new();
        let event_id = record.event_id();
        let target = self.target_uri.clone();

        self.wal.append(WalEntry::prepare(txn_id, &target, record.clone()))?;

        if let Err(e) = downstream.prepare(record, &target) {
            return self.roll_back(txn_id, record, &format!("prepare failed: {e}"), downstream, checkpoints);
        }

        if let Err(e) = self.wal.append(WalEntry::commit(txn_id, event_id, &target, content_key)) {
            // The prepare stays open in the WAL; recovery reports it
            release_downstream(downstream, record, &target, txn_id);
            return Err(e.into());
        }

        if let Err(e) = downstream.commit(record, &target) {
            return self.roll_back(txn_id, record, &format!("commit failed: {e}"), downstream, checkpoints);
        }

        checkpoints.create_checkpoint(PipelineStep::PublishSuccess)?;
        debug!(txn_id = %txn_id, event_id = %event_id, "Published record");
        Ok(PublishOutcome::Committed { txn_id })
    }

    fn roll_back(
        &mut self,
        txn_id: TxnId,
        record: &EnrichedRecord,
        reason: &str,
        downstream: &mut dyn Downstream,
        checkpoints: &mut CheckpointManager,
    ) -> Result<PublishOutcome> {
        let target = self.target_uri.clone();
        warn!(txn_id = %txn_id, event_id = %record.event_id(), reason, "Rolling back publish");

        release_downstream(downstream, record, &target, txn_id);
        self.wal
            .append(WalEntry::rollback(txn_id, record.event_id(), &target, reason))?;
        checkpoints.create_checkpoint(PipelineStep::PublishRollback)?;

        Ok(PublishOutcome::RolledBack {
            txn_id,
            reason: reason.to_string(),
        })
    }

    /// Append a rollback for a transaction found indeterminate after restart
    pub fn resolve_indeterminate(
        &mut self,
        txn_id: TxnId,
        event_id: cairn_core::EventId,
        target_uri: &str,
        reason: &str,
        checkpoints: &mut CheckpointManager,
    ) -> Result<()> {
        self.wal
            .append(WalEntry::rollback(txn_id, event_id, target_uri, reason))?;
        checkpoints.create_checkpoint(PipelineStep::PublishRollback)?;
        Ok(())
    }

    /// Downstream target
    pub fn target_uri(&self) -> &str {
        &self.target_uri
    }

    /// Copy of the WAL
    pub fn entries(&self) -> Vec<WalEntry> {
        self.wal.snapshot()
    }

    /// Number of WAL entries
    pub fn len(&self) -> usize {
        self.wal.len()
    }

    /// Whether the WAL is empty
    pub fn is_empty(&self) -> bool {
        self.wal.is_empty()
    }

    /// Shared read handle over the WAL
    pub fn reader(&self) -> LogReader<WalEntry> {
        self.wal.reader()
    }

    /// Flush pending appends
    pub fn sync(&mut self) -> Result<()> {
        Ok(self.wal.sync()?)
    }
}

/// Ask the downstream to drop a prepared record; a refusal is logged, not raised
fn release_downstream(downstream: &mut dyn Downstream, record: &EnrichedRecord, target: &str, txn_id: TxnId) {
    if let Err(e) = downstream.rollback(record, target) {
        warn!(txn_id = %txn_id, error = %e, "Downstream rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_record, ScriptedDownstream};
    use cairn_durability::WalPhase;
    use cairn_security::{CheckpointSigner, SignatureScheme};

    fn setup() -> (PublishCoordinator, CheckpointManager) {
        (
            PublishCoordinator::new(AppendLog::in_memory(), "system://downstream"),
            CheckpointManager::new(
                AppendLog::in_memory(),
                CheckpointSigner::generate(SignatureScheme::Ed25519),
            ),
        )
    }

    fn phases(coordinator: &PublishCoordinator) -> Vec<WalPhase> {
        coordinator.entries().iter().map(WalEntry::phase).collect()
    }

    #[test]
    fn test_successful_publish() {
        let (mut coordinator, mut checkpoints) = setup();
        let mut downstream = ScriptedDownstream::default();
        let record = sample_record("eval_001");

        let outcome = coordinator
            .publish(&record, "key", &mut downstream, &mut checkpoints)
            .unwrap();

        assert!(outcome.is_committed());
        assert_eq!(phases(&coordinator), vec![WalPhase::Prepare, WalPhase::Commit]);
        assert_eq!(checkpoints.checkpoints()[0].pipeline_step, PipelineStep::PublishSuccess);
        assert_eq!(downstream.committed, vec![record.event_id()]);
    }

    #[test]
    fn test_prepare_failure_rolls_back() {
        let (mut coordinator, mut checkpoints) = setup();
        let mut downstream = ScriptedDownstream::failing_prepare();
        let record = sample_record("eval_001");

        let outcome = coordinator
            .publish(&record, "key", &mut downstream, &mut checkpoints)
            .unwrap();

        assert!(matches!(outcome, PublishOutcome::RolledBack { ref reason, .. } if reason.contains("prepare")));
        assert_eq!(phases(&coordinator), vec![WalPhase::Prepare, WalPhase::Rollback]);
        assert_eq!(checkpoints.checkpoints()[0].pipeline_step, PipelineStep::PublishRollback);
        assert_eq!(downstream.rolled_back, vec![record.event_id()]);
        assert!(downstream.committed.is_empty());
    }

    #[test]
    fn test_commit_failure_rolls_back_after_commit_entry() {
        let (mut coordinator, mut checkpoints) = setup();
        let mut downstream = ScriptedDownstream::failing_commit();
        let record = sample_record("eval_001");

        let outcome = coordinator
            .publish(&record, "key", &mut downstream, &mut checkpoints)
            .unwrap();

        assert!(!outcome.is_committed());
        assert_eq!(
            phases(&coordinator),
            vec![WalPhase::Prepare, WalPhase::Commit, WalPhase::Rollback]
        );
        let txns: Vec<TxnId> = coordinator.entries().iter().map(WalEntry::txn_id).collect();
        assert!(txns.iter().all(|t| *t == outcome.txn_id()));
    }

    #[test]
    fn test_refused_downstream_rollback_still_records_rollback() {
        let (mut coordinator, mut checkpoints) = setup();
        let mut downstream = ScriptedDownstream {
            fail_prepare: true,
            fail_rollback: true,
            ..Default::default()
        };
        let outcome = coordinator
            .publish(&sample_record("e"), "key", &mut downstream, &mut checkpoints)
            .unwrap();

        assert!(matches!(outcome, PublishOutcome::RolledBack { .. }));
        assert_eq!(phases(&coordinator), vec![WalPhase::Prepare, WalPhase::Rollback]);
        assert!(downstream.rolled_back.is_empty());
        assert_eq!(checkpoints.checkpoints()[0].pipeline_step, PipelineStep::PublishRollback);
    }

    #[test]
    fn test_no_automatic_retry() {
        let (mut coordinator, mut checkpoints) = setup();
        let mut downstream = ScriptedDownstream::failing_prepare();
        coordinator
            .publish(&sample_record("e"), "key", &mut downstream, &mut checkpoints)
            .unwrap();
        assert_eq!(downstream.prepare_calls, 1);
    }

    #[test]
    fn test_acknowledging_downstream() {
        let (mut coordinator, mut checkpoints) = setup();
        let outcome = coordinator
            .publish(&sample_record("e"), "key", &mut AcknowledgingDownstream, &mut checkpoints)
            .unwrap();
        assert!(outcome.is_committed());
    }
}
