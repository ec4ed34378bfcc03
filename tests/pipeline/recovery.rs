//! Restart, recovery scan, operator resolution and forensic replay

use crate::*;
use cairn::cairn_core::PipelineStep;
use cairn::cairn_durability::{Recovery, RecoveryOptions, WalEntry};
use cairn::cairn_engine::{CHECKPOINT_LOG, INDETERMINATE_REASON, WAL_LOG};

fn drop_last_line(path: &Path) {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.pop();
    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    std::fs::write(path, rewritten).unwrap();
}

/// Change one hex digit of the cumulative hash on the 0-based `index`th line
fn flip_cumulative_hash(path: &Path, index: usize) {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    let field = "\"cumulative_hash\":\"";
    let line = &mut lines[index];
    let at = line.find(field).unwrap() + field.len();
    let digit = if &line[at..at + 1] == "0" { "1" } else { "0" };
    line.replace_range(at..at + 1, digit);
    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    std::fs::write(path, rewritten).unwrap();
}

/// Durable pipeline with two accepted records, closed again
fn two_record_history(dir: &TempDir) -> PipelineConfig {
    let config = durable_config(dir);
    let mut pipeline = Pipeline::open(config.clone()).unwrap();
    pipeline.process_stream(stream(&[payload("a"), payload("b")])).unwrap();
    config
}

#[test]
fn test_restart_continues_chain_and_replays() {
    let dir = TempDir::new().unwrap();
    let config = durable_config(&dir);
    let (head_id, head_hash) = {
        let mut pipeline = Pipeline::open(config.clone()).unwrap();
        pipeline.process_stream(stream(&[payload("a"), payload("b")])).unwrap();
        let snapshot = pipeline.reader().snapshot();
        (snapshot.head().unwrap(), snapshot.cumulative_hash().to_string())
    };
    assert!(non_empty(&data_dir(&dir).join(CHECKPOINT_LOG)));

    let mut pipeline = Pipeline::open(config.clone()).unwrap();
    assert_eq!(pipeline.cumulative_hash(), head_hash);
    pipeline.process_stream(stream(&[payload("c")])).unwrap();
    let chain = pipeline.reader().snapshot().checkpoints;
    let resumed = chain.iter().position(|c| c.checkpoint_id == head_id).unwrap();
    assert_eq!(
        chain[resumed + 1].previous_checkpoint_hash,
        Some(chain[resumed].link_hash().unwrap())
    );
    drop(pipeline);

    let verifier = ForensicVerifier::load(&data_dir(&dir), "integration", key_for(&config)).unwrap();
    let verification = verifier.verify();
    assert!(verification.chain_integrity);
    assert!(verification.signatures_valid);
    // Memory dedup is not on disk, so the dedup check is skipped offline
    assert_eq!(verification.dedup_consistent, None);

    let replay = verifier.replay().unwrap();
    assert!(replay.is_consistent());
    assert_eq!(replay.records_replayed, 3);
}

#[test]
fn test_indeterminate_transaction_reported_then_resolved() {
    let dir = TempDir::new().unwrap();
    let config = durable_config(&dir);
    {
        let mut pipeline = Pipeline::open(config.clone()).unwrap();
        pipeline.process_stream(stream(&[payload("a"), payload("b")])).unwrap();
    }
    // Crash between prepare and commit of the second record
    let wal_path = data_dir(&dir).join(WAL_LOG);
    drop_last_line(&wal_path);

    let (_, scan) = Recovery::scan(&wal_path, RecoveryOptions::default()).unwrap();
    assert_eq!(scan.indeterminate.len(), 1);
    assert_eq!(scan.committed, 1);

    let mut pipeline = Pipeline::open(config.clone()).unwrap();
    let open = pipeline.recovery_scan().indeterminate;
    assert_eq!(open.len(), 1);

    let resolved = pipeline.resolve_indeterminate().unwrap();
    assert_eq!(resolved, vec![open[0].txn_id]);

    let snapshot = pipeline.reader().snapshot();
    match snapshot.wal.last() {
        Some(WalEntry::Rollback { txn_id, reason, .. }) => {
            assert_eq!(*txn_id, open[0].txn_id);
            assert_eq!(reason, INDETERMINATE_REASON);
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert_eq!(
        snapshot.checkpoints.last().map(|c| c.pipeline_step),
        Some(PipelineStep::PublishRollback)
    );
    assert!(pipeline.recovery_scan().indeterminate.is_empty());
    assert!(pipeline.resolve_indeterminate().unwrap().is_empty());

    let replay = pipeline.verifier().replay().unwrap();
    assert!(replay.is_consistent());
    assert!(replay.indeterminate.is_empty());
}

#[test]
fn test_corrupt_wal_line_is_skipped_and_counted() {
    let dir = TempDir::new().unwrap();
    let config = durable_config(&dir);
    {
        let mut pipeline = Pipeline::open(config.clone()).unwrap();
        pipeline.process_stream(stream(&[payload("a")])).unwrap();
    }
    let wal_path = data_dir(&dir).join(WAL_LOG);
    let mut text = std::fs::read_to_string(&wal_path).unwrap();
    text.push_str("deadbeef {\"phase\":\"commit\"}\n");
    std::fs::write(&wal_path, text).unwrap();

    let (entries, scan) = Recovery::scan(&wal_path, RecoveryOptions::default()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(scan.corrupt_entries_skipped, 1);
    assert!(scan.has_issues());

    // A damaged line that is not the final, unterminated one is never skipped on open
    let err = Pipeline::open(config.clone()).map_err(cairn::Error::from).unwrap_err();
    assert!(err.is_integrity(), "unexpected error: {err}");

    let verification = ForensicVerifier::load(&data_dir(&dir), "integration", key_for(&config))
        .unwrap()
        .verify();
    assert_eq!(verification.corrupt_wal_lines.len(), 1);
    assert_eq!(verification.corrupt_wal_lines[0].line, 3);
    assert_eq!(verification.corrupt_wal_lines[0].entry_index, None);
    assert!(!verification.logs_intact);
    assert!(!verification.end_to_end_traceability);
}

#[test]
fn test_flipped_final_checkpoint_is_localized_and_refused() {
    let dir = TempDir::new().unwrap();
    let config = two_record_history(&dir);
    let path = data_dir(&dir).join(CHECKPOINT_LOG);
    flip_cumulative_hash(&path, 5);

    let err = Pipeline::open(config.clone()).map_err(cairn::Error::from).unwrap_err();
    assert!(err.is_integrity(), "unexpected error: {err}");

    let verifier = ForensicVerifier::load(&data_dir(&dir), "integration", key_for(&config)).unwrap();
    let checkpoints = verifier.snapshot().checkpoints.clone();
    assert_eq!(checkpoints.len(), 6);

    let verification = verifier.verify();
    assert!(!verification.chain.checks[5].signature_valid);
    assert!(verification.chain.checks[..5].iter().all(|c| c.is_valid()));
    assert_eq!(verification.failed_checkpoints(), vec![checkpoints[5].checkpoint_id]);
    assert_eq!(verification.corrupt_checkpoint_lines.len(), 1);
    assert_eq!(verification.corrupt_checkpoint_lines[0].line, 6);
    assert_eq!(verification.corrupt_checkpoint_lines[0].entry_index, Some(5));
    assert!(!verification.logs_intact);
    assert!(!verification.end_to_end_traceability);

    // Loading for verification leaves the evidence as it was
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 6);
}

#[test]
fn test_flipped_middle_checkpoint_is_localized() {
    let dir = TempDir::new().unwrap();
    let config = two_record_history(&dir);
    flip_cumulative_hash(&data_dir(&dir).join(CHECKPOINT_LOG), 2);

    let err = Pipeline::open(config.clone()).map_err(cairn::Error::from).unwrap_err();
    assert!(err.is_integrity(), "unexpected error: {err}");

    let verifier = ForensicVerifier::load(&data_dir(&dir), "integration", key_for(&config)).unwrap();
    let checkpoints = verifier.snapshot().checkpoints.clone();
    let verification = verifier.verify();
    assert!(!verification.chain.checks[2].signature_valid);
    // The successor links to the original bytes, not the altered ones
    assert!(!verification.chain.checks[3].link_valid);
    assert_eq!(
        verification.failed_checkpoints(),
        vec![checkpoints[2].checkpoint_id, checkpoints[3].checkpoint_id]
    );
    assert_eq!(verification.corrupt_checkpoint_lines[0].entry_index, Some(2));
    assert!(!verification.end_to_end_traceability);
}

#[test]
fn test_torn_checkpoint_tail_is_cut_on_open() {
    let dir = TempDir::new().unwrap();
    let config = two_record_history(&dir);
    let path = data_dir(&dir).join(CHECKPOINT_LOG);
    let text = std::fs::read_to_string(&path).unwrap();
    let last = text.lines().last().unwrap();
    // Crash halfway through appending a copy of the last line
    let mut torn = text.clone();
    torn.push_str(&last[..last.len() / 2]);
    std::fs::write(&path, torn).unwrap();

    let mut pipeline = Pipeline::open(config.clone()).unwrap();
    assert_eq!(pipeline.event_count(), 2);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);

    pipeline.process_stream(stream(&[payload("c")])).unwrap();
    drop(pipeline);

    let verification = ForensicVerifier::load(&data_dir(&dir), "integration", key_for(&config))
        .unwrap()
        .verify();
    assert!(verification.logs_intact);
    assert!(verification.chain_integrity);
    assert!(verification.signatures_valid);
    assert_eq!(verification.chain.checks.len(), 9);
}

#[test]
fn test_tampered_checkpoint_log_refuses_to_open() {
    let dir = TempDir::new().unwrap();
    let config = durable_config(&dir);
    {
        let mut pipeline = Pipeline::open(config.clone()).unwrap();
        pipeline.process_stream(stream(&[payload("a")])).unwrap();
    }
    let path = data_dir(&dir).join(CHECKPOINT_LOG);
    let text = std::fs::read_to_string(&path).unwrap();
    let tampered = text.replacen("\"ingest\"", "\"store\"", 1);
    assert_ne!(text, tampered);
    std::fs::write(&path, tampered).unwrap();

    let err = Pipeline::open(config).map_err(cairn::Error::from).unwrap_err();
    assert!(err.is_integrity(), "unexpected error: {err}");
}

#[test]
fn test_replacing_the_key_refuses_to_open() {
    let dir = TempDir::new().unwrap();
    let config = durable_config(&dir);
    {
        let mut pipeline = Pipeline::open(config.clone()).unwrap();
        pipeline.process_stream(stream(&[payload("a")])).unwrap();
    }
    std::fs::remove_file(&config.signing.key_path).unwrap();

    let err = Pipeline::open(config).map_err(cairn::Error::from).unwrap_err();
    assert!(err.is_integrity());
}
