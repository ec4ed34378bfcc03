//! Checkpoint chain properties

use crate::*;
use cairn::cairn_core::{canonical_sha256, Checkpoint, PipelineStep};
use cairn::cairn_engine::{verify_chain, PipelineSnapshot};

fn chain_of(pipeline: &Pipeline) -> Vec<Checkpoint> {
    pipeline.reader().snapshot().checkpoints
}

#[test]
fn test_links_are_hash_of_signed_predecessor() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    pipeline
        .process_stream(stream(&[payload("a"), payload("b"), payload("c")]))
        .unwrap();

    let chain = chain_of(&pipeline);
    assert_eq!(chain.len(), 9);
    assert!(chain[0].previous_checkpoint_hash.is_none());
    for pair in chain.windows(2) {
        let expected = canonical_sha256(&pair[0]).unwrap();
        assert_eq!(pair[1].previous_checkpoint_hash.as_deref(), Some(expected.as_str()));
    }
}

#[test]
fn test_step_sequence_per_record() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    pipeline.process_stream(stream(&[payload("a")])).unwrap();

    let steps: Vec<PipelineStep> = chain_of(&pipeline).iter().map(|c| c.pipeline_step).collect();
    assert_eq!(
        steps,
        vec![PipelineStep::Ingest, PipelineStep::Store, PipelineStep::PublishSuccess]
    );
}

#[test]
fn test_single_byte_flip_in_cumulative_hash_breaks_that_signature() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    pipeline
        .process_stream(stream(&[payload("a"), payload("b")]))
        .unwrap();
    let key = pipeline.reader().verification_key().clone();

    let original = chain_of(&pipeline);
    for target in 0..original.len() {
        let mut chain = original.clone();
        let mut bytes = chain[target].cumulative_hash.clone().into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        chain[target].cumulative_hash = String::from_utf8(bytes).unwrap();

        let result = verify_chain(&chain, &key);
        assert!(!result.checks[target].signature_valid, "checkpoint {target}");
        for (i, check) in result.checks.iter().enumerate() {
            if i != target && i != target + 1 {
                assert!(check.is_valid(), "checkpoint {i} should be unaffected");
            }
        }
    }
}

#[test]
fn test_verifier_localizes_tampering() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    pipeline
        .process_stream(stream(&[payload("a"), payload("b")]))
        .unwrap();

    let mut snapshot: PipelineSnapshot = pipeline.reader().snapshot();
    snapshot.checkpoints[3].event_count += 1;
    let report = ForensicVerifier::new(snapshot.clone(), pipeline.reader().verification_key().clone()).verify();

    assert!(!report.signatures_valid);
    assert!(!report.end_to_end_traceability);
    assert_eq!(report.failed_checkpoints()[0], snapshot.checkpoints[3].checkpoint_id);
    assert!(report.chain.checks[..3].iter().all(|c| c.is_valid()));
}

#[test]
fn test_removed_checkpoint_breaks_link() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    pipeline.process_stream(stream(&[payload("a")])).unwrap();

    let mut snapshot = pipeline.reader().snapshot();
    snapshot.checkpoints.remove(1);
    let report = ForensicVerifier::new(snapshot, pipeline.reader().verification_key().clone()).verify();
    assert!(!report.chain_integrity);
    assert!(report.signatures_valid);
    assert!(!report.chain.checks[1].link_valid);
}

#[test]
fn test_shared_secret_chain_verifies_only_with_secret() {
    let dir = TempDir::new().unwrap();
    let config = ephemeral_config(&dir, SignatureScheme::SharedSecret);
    std::fs::write(&config.signing.key_path, b"correct horse battery staple").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config.signing.key_path, std::fs::Permissions::from_mode(0o600)).unwrap();
    }

    let mut pipeline = Pipeline::open(config.clone()).unwrap();
    pipeline.process_stream(stream(&[payload("a")])).unwrap();

    let audit = pipeline.audit_report();
    assert_eq!(audit.verification.signature_scheme, SignatureScheme::SharedSecret);
    assert!(audit.verification.public_key.is_none());
    assert!(audit.verification.chain_valid);

    let chain = pipeline.reader().snapshot().checkpoints;
    assert!(verify_chain(&chain, &key_for(&config)).is_valid());

    let wrong = CheckpointSigner::generate(SignatureScheme::SharedSecret).verification_key();
    assert!(!verify_chain(&chain, &wrong).signatures_valid());
}

#[test]
fn test_ed25519_public_key_alone_verifies() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open_ephemeral(&dir);
    pipeline.process_stream(stream(&[payload("a")])).unwrap();

    let public = pipeline.audit_report().verification.public_key.unwrap();
    let key = VerificationKey::ed25519_from_hex(&public).unwrap();
    assert!(verify_chain(&pipeline.reader().snapshot().checkpoints, &key).is_valid());
}
