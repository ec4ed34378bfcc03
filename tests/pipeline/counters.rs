//! Counter conservation and the worked examples

use crate::*;
use proptest::prelude::*;

#[test]
fn test_three_unique_plus_duplicate_of_second() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);

    let input = stream(&[payload("r1"), payload("r2"), payload("r3"), payload("r2")]);
    let report = pipeline.process_stream(input).unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.failed, 0);
    assert!(report.published <= 3);
    assert_eq!(pipeline.dedup_len(), 3);
    assert_eq!(report.content_keys.len(), 3);
}

#[test]
fn test_missing_overall_score_fails_without_trace() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);

    let report = pipeline
        .process_stream(stream(&[payload_without("r1", "overall_score")]))
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 0);
    assert!(report.content_keys.is_empty());
    let audit = pipeline.audit_report();
    assert_eq!(audit.verification.checkpoint_count, 0);
    assert_eq!(audit.verification.wal_entry_count, 0);
    assert_eq!(audit.verification.cumulative_hash, "");
}

#[test]
fn test_malformed_inputs_are_counted_not_raised() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);

    let bad_type = {
        let mut v: serde_json::Value = serde_json::from_slice(&payload("r3")).unwrap();
        v["bias_indicators"] = json!([1, 2]);
        serde_json::to_vec(&v).unwrap()
    };
    let inputs = vec![
        b"not json".to_vec(),
        b"[1,2,3]".to_vec(),
        bad_type,
        payload("ok"),
    ];
    let report = pipeline.process_stream(stream(&inputs)).unwrap();
    assert_eq!(report.failed, 3);
    assert_eq!(report.processed, 1);
}

#[test]
fn test_audit_report_accumulates_across_streams() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);

    pipeline.process_stream(stream(&[payload("a"), payload("b")])).unwrap();
    pipeline
        .process_stream(stream(&[payload("a"), payload_without("c", "context")]))
        .unwrap();

    let audit = pipeline.audit_report();
    assert_eq!(audit.pipeline_id, "integration");
    assert_eq!(audit.processed, 2);
    assert_eq!(audit.duplicates, 1);
    assert_eq!(audit.failed, 1);
    assert_eq!(audit.published, 2);
    assert_eq!(audit.event_count, 2);
    assert!(audit.verification.signatures_valid);
    assert!(audit.verification.public_key.is_some());
    assert_eq!(audit.verification.key_fingerprint.len(), 16);
}

#[derive(Debug, Clone)]
enum Input {
    Valid(u8),
    MissingField(u8),
    Garbage,
}

fn input_strategy() -> impl Strategy<Value = Input> {
    prop_oneof![
        (0u8..8).prop_map(Input::Valid),
        (0u8..8).prop_map(Input::MissingField),
        Just(Input::Garbage),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_counters_conserve_inputs(inputs in prop::collection::vec(input_strategy(), 0..24)) {
        let dir = TempDir::new().unwrap();
        let mut pipeline = open_ephemeral(&dir);

        let payloads: Vec<Vec<u8>> = inputs
            .iter()
            .map(|i| match i {
                Input::Valid(n) => payload(&format!("r{n}")),
                Input::MissingField(n) => payload_without(&format!("r{n}"), "text_hash"),
                Input::Garbage => b"{".to_vec(),
            })
            .collect();
        let report = pipeline.process_stream(stream(&payloads)).unwrap();

        prop_assert_eq!(report.total(), inputs.len() as u64);
        prop_assert_eq!(report.processed as usize, pipeline.dedup_len());
        prop_assert_eq!(report.content_keys.len() as u64, report.processed);

        let unique: std::collections::HashSet<u8> = inputs
            .iter()
            .filter_map(|i| match i { Input::Valid(n) => Some(*n), _ => None })
            .collect();
        prop_assert_eq!(report.processed, unique.len() as u64);
    }
}
