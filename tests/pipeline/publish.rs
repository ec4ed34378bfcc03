//! Two-phase publish through the orchestrator

use crate::*;
use cairn::cairn_core::PipelineStep;
use cairn::cairn_durability::{WalEntry, WalPhase};
use cairn::cairn_engine::ScriptedDownstream;

#[test]
fn test_failed_publish_rolls_back_and_keeps_record() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::builder(ephemeral_config(&dir, SignatureScheme::Ed25519))
        .downstream(ScriptedDownstream::failing_prepare())
        .open()
        .unwrap();

    let report = pipeline.process_stream(stream(&[payload("a")])).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.published, 0);
    assert_eq!(report.unpublished, report.content_keys);

    let snapshot = pipeline.reader().snapshot();
    let phases: Vec<WalPhase> = snapshot.wal.iter().map(WalEntry::phase).collect();
    assert_eq!(phases, vec![WalPhase::Prepare, WalPhase::Rollback]);
    assert_eq!(
        snapshot.checkpoints.last().map(|c| c.pipeline_step),
        Some(PipelineStep::PublishRollback)
    );

    let stored = pipeline.store().get(&report.content_keys[0]).unwrap().unwrap();
    assert_eq!(stored.record.record.evaluation_id, "a");
}

#[test]
fn test_commit_failure_is_rolled_back_after_commit_entry() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::builder(ephemeral_config(&dir, SignatureScheme::Ed25519))
        .downstream(ScriptedDownstream::failing_commit())
        .open()
        .unwrap();

    pipeline.process_stream(stream(&[payload("a")])).unwrap();

    let scan = pipeline.recovery_scan();
    assert_eq!(scan.rolled_back, 1);
    assert_eq!(scan.committed, 0);
    assert_eq!(scan.superseded_commits, 1);
    assert!(!scan.has_issues());
}

#[test]
fn test_one_failure_does_not_stop_the_stream() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::builder(ephemeral_config(&dir, SignatureScheme::Ed25519))
        .downstream(ScriptedDownstream::failing_prepare_on([1]))
        .open()
        .unwrap();

    let report = pipeline
        .process_stream(stream(&[payload("a"), payload("b"), payload("c")]))
        .unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.published, 2);
    assert_eq!(report.unpublished, vec![report.content_keys[1].clone()]);

    // Rollback checkpoints still chain and verify
    let verification = pipeline.verifier().verify();
    assert!(verification.end_to_end_traceability);
}

#[test]
fn test_commit_reference_is_content_key() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    let report = pipeline.process_stream(stream(&[payload("a")])).unwrap();

    let wal = pipeline.reader().snapshot().wal;
    match &wal[1] {
        WalEntry::Commit { reference, .. } => assert_eq!(reference, &report.content_keys[0]),
        other => panic!("expected commit, got {other:?}"),
    }
    match &wal[0] {
        WalEntry::Prepare { payload, target_uri, .. } => {
            assert_eq!(payload.record.evaluation_id, "a");
            assert_eq!(target_uri, "system://downstream");
        }
        other => panic!("expected prepare, got {other:?}"),
    }
}
