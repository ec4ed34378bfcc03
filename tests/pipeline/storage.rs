//! Content addressing and storage failures

use std::thread;

use crate::*;
use cairn::cairn_core::{canonical_sha256, LineageEnricher, PipelineStep, SchemaValidator};
use cairn::cairn_engine::OBJECTS_DIR;
use cairn::cairn_storage::FsContentStore;

fn enriched(evaluation_id: &str) -> EnrichedRecord {
    let bytes = payload(evaluation_id);
    let raw = SchemaValidator::default().decode(&bytes).unwrap();
    LineageEnricher::new("1.0.0", "1.0", "node-a").enrich(raw, &bytes, UPSTREAM)
}

#[test]
fn test_content_key_is_stable_across_stores() {
    let dir = TempDir::new().unwrap();
    let record = enriched("a");
    let expected = canonical_sha256(&record).unwrap();

    let fs = FsContentStore::open(dir.path().join("one"), "p1").unwrap();
    let other_fs = FsContentStore::open(dir.path().join("two"), "p2").unwrap();
    let memory = MemoryContentStore::new("p3");

    assert_eq!(fs.persist(&record).unwrap().content_key, expected);
    assert_eq!(other_fs.persist(&record).unwrap().content_key, expected);
    assert_eq!(memory.persist(&record).unwrap().content_key, expected);
    assert_eq!(canonical_sha256(&record).unwrap(), expected);

    // Identical content is a no-op
    let again = fs.persist(&record).unwrap();
    assert!(!again.newly_written);
    assert_eq!(fs.keys().unwrap(), vec![expected.clone()]);

    let path = fs.object_path(&expected).unwrap();
    let relative = path.strip_prefix(dir.path().join("one")).unwrap();
    let parts: Vec<String> = relative.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    assert_eq!(parts, vec![expected[..2].to_string(), expected[2..4].to_string(), format!("{expected}.json")]);
}

#[test]
fn test_stored_object_read_back_from_pipeline_dir() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::open(durable_config(&dir)).unwrap();
    let report = pipeline.process_stream(stream(&[payload("a")])).unwrap();
    let key = &report.content_keys[0];

    let stored = pipeline.store().get(key).unwrap().unwrap();
    assert_eq!(stored.pipeline_id, "integration");
    assert_eq!(&stored.content_key, key);
    stored.verify().unwrap();

    let reopened = FsContentStore::open(data_dir(&dir).join(OBJECTS_DIR), "integration").unwrap();
    assert!(reopened.contains(key).unwrap());
}

#[test]
fn test_corrupted_object_is_detected() {
    let dir = TempDir::new().unwrap();
    let store = FsContentStore::open(dir.path().join("objects"), "p").unwrap();
    let key = store.persist(&enriched("a")).unwrap().content_key;

    let path = store.object_path(&key).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replacen("0.85", "0.95", 1)).unwrap();

    let err = cairn::Error::from(store.get(&key).unwrap_err());
    assert!(err.is_integrity());
}

#[test]
fn test_storage_failure_aborts_before_checkpoint_and_releases_key() {
    let dir = TempDir::new().unwrap();
    let (store, failing, backing) = FailingStore::new();
    let mut pipeline = Pipeline::builder(ephemeral_config(&dir, SignatureScheme::Ed25519))
        .store(store)
        .open()
        .unwrap();

    pipeline.process_stream(stream(&[payload("a")])).unwrap();

    failing.store(true, Ordering::SeqCst);
    let err = pipeline
        .process_stream(stream(&[payload("a"), payload("b")]))
        .unwrap_err();

    let partial = err.partial_report().unwrap();
    assert_eq!(partial.duplicates, 1);
    assert_eq!(partial.processed, 0);
    assert!(matches!(err.root(), cairn::cairn_engine::EngineError::Storage(_)));

    // No checkpoint references the record that failed to persist
    let steps: Vec<PipelineStep> = pipeline
        .reader()
        .snapshot()
        .checkpoints
        .iter()
        .map(|c| c.pipeline_step)
        .collect();
    assert_eq!(steps.len(), 3);
    assert_eq!(pipeline.event_count(), 1);
    assert_eq!(backing.len(), 1);

    // The reservation was released, so a retry is not a duplicate
    failing.store(false, Ordering::SeqCst);
    let retry = pipeline.process_stream(stream(&[payload("b")])).unwrap();
    assert_eq!(retry.processed, 1);
    assert_eq!(retry.duplicates, 0);
}

#[test]
fn test_reader_snapshots_while_writing() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    let reader = pipeline.reader();

    let watcher = thread::spawn(move || {
        let mut observed = 0;
        for _ in 0..50 {
            let snapshot = reader.snapshot();
            let verification = reader.verifier().verify();
            assert!(verification.chain_integrity);
            assert!(verification.signatures_valid);
            observed = observed.max(snapshot.checkpoints.len());
            thread::yield_now();
        }
        observed
    });

    let payloads: Vec<Vec<u8>> = (0..20).map(|i| payload(&format!("r{i}"))).collect();
    pipeline.process_stream(stream(&payloads)).unwrap();
    let observed = watcher.join().unwrap();

    assert!(observed <= 60);
    assert_eq!(pipeline.reader().checkpoint_count(), 60);
}
