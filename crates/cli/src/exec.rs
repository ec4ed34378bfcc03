//! Command execution.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cairn_durability::{Recovery, RecoveryOptions};
use cairn_engine::{ForensicVerifier, Pipeline, PipelineConfig, WAL_LOG};
use cairn_security::{generate_key_file, load_signer, VerificationKey};
use serde::Serialize;
use tracing::info;

use crate::parse::{CliAction, OutputMode};

/// Run an action; returns the process exit code.
pub fn execute(action: CliAction, config_path: &Path, output: OutputMode) -> Result<i32> {
    match action {
        CliAction::Run { input, upstream } => run(config_path, &input, upstream, output),
        CliAction::Verify { public_key } => verify(config_path, public_key.as_deref(), output),
        CliAction::Replay { public_key, export } => {
            replay(config_path, public_key.as_deref(), export, output)
        }
        CliAction::Recover { resolve } => recover(config_path, resolve, output),
        CliAction::Keygen { scheme, out } => {
            let signer = generate_key_file(scheme, &out)
                .with_context(|| format!("Failed to create key file {}", out.display()))?;
            let key = signer.verification_key();
            let summary = KeygenSummary {
                path: out,
                scheme: scheme.as_str(),
                fingerprint: key.fingerprint(),
                public_key: key.public_key_hex(),
            };
            emit(&summary, output, |s| {
                let mut text = format!("Created {} key at {}\nfingerprint: {}", s.scheme, s.path.display(), s.fingerprint);
                if let Some(public) = &s.public_key {
                    text.push_str(&format!("\npublic key:  {public}"));
                }
                text
            })?;
            Ok(0)
        }
    }
}

#[derive(Serialize)]
struct KeygenSummary {
    path: PathBuf,
    scheme: &'static str,
    fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<String>,
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn run(config_path: &Path, input: &str, upstream: Option<String>, output: OutputMode) -> Result<i32> {
    let config = load_config(config_path)?;
    let mut pipeline = Pipeline::open(config).context("Failed to open pipeline")?;

    let mut bytes = Vec::new();
    if input == "-" {
        io::stdin().lock().read_to_end(&mut bytes).context("Failed to read stdin")?;
    } else {
        File::open(input)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .with_context(|| format!("Failed to read {input}"))?;
    }
    let upstream = upstream.unwrap_or_else(|| {
        if input == "-" {
            "stdin://".to_string()
        } else {
            format!("file://{input}")
        }
    });

    let records = split_records(&bytes);
    info!(records = records.len(), upstream = %upstream, "Read input");

    let stream = pipeline.process_stream(records.iter().map(|r| (*r, upstream.as_str())));
    let report = match stream {
        Ok(report) => report,
        Err(e) => {
            if let Some(partial) = e.partial_report() {
                emit(partial, output, |r| format!("Partial: {}", stream_line(r)))?;
            }
            return Err(e).context("Stream aborted");
        }
    };
    pipeline.sync()?;

    let audit = pipeline.audit_report();
    emit(&audit, output, |a| {
        format!(
            "{}\nunpublished: {}\nevent count: {}\ncumulative hash: {}\nkey: {} {}\nchain valid: {}",
            stream_line(&report),
            a.unpublished.len(),
            a.event_count,
            a.verification.cumulative_hash,
            a.verification.signature_scheme,
            a.verification.key_fingerprint,
            a.verification.chain_valid
        )
    })?;
    Ok(0)
}

/// Newline-delimited records, blank lines dropped
///
/// Records stay raw bytes so that a line that is not UTF-8 reaches the
/// validator and is counted as failed instead of ending the run.
fn split_records(bytes: &[u8]) -> Vec<&[u8]> {
    bytes
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .collect()
}

fn stream_line(r: &cairn_engine::StreamReport) -> String {
    format!(
        "processed: {}  failed: {}  duplicates: {}  published: {}",
        r.processed, r.failed, r.duplicates, r.published
    )
}

fn verification_key(config: &PipelineConfig, public_key: Option<&str>) -> Result<VerificationKey> {
    match public_key {
        Some(hex) => Ok(VerificationKey::ed25519_from_hex(hex)?),
        None => Ok(load_signer(config.signing.scheme, &config.signing.key_path)
            .context("Failed to load signing key")?
            .verification_key()),
    }
}

fn data_dir(config: &PipelineConfig) -> Result<&Path> {
    match &config.data_dir {
        Some(dir) => Ok(dir),
        None => bail!("Pipeline '{}' has no data_dir; nothing persisted to inspect", config.pipeline_id),
    }
}

fn verify(config_path: &Path, public_key: Option<&str>, output: OutputMode) -> Result<i32> {
    let config = load_config(config_path)?;
    let key = verification_key(&config, public_key)?;
    let verifier = ForensicVerifier::load(data_dir(&config)?, config.pipeline_id.clone(), key)?;
    let report = verifier.verify();

    emit(&report, output, |r| {
        let mut text = format!(
            "chain integrity:     {}\nsignatures valid:    {}\nhash well-formed:    {}\nwal non-empty:       {}\ndedup consistent:    {}\nlogs intact:         {}\ntraceability:        {}",
            r.chain_integrity,
            r.signatures_valid,
            r.cumulative_hash_well_formed,
            r.wal_non_empty,
            r.dedup_consistent.map_or("n/a".to_string(), |v| v.to_string()),
            r.logs_intact,
            r.end_to_end_traceability
        );
        let damaged = [
            ("checkpoints", &r.corrupt_checkpoint_lines),
            ("wal", &r.corrupt_wal_lines),
            ("dedup", &r.corrupt_dedup_lines),
        ];
        for (log, lines) in damaged {
            for line in lines.iter() {
                text.push_str(&format!("\n  {log} line {}: {}", line.line, line.reason));
            }
        }
        for check in r.chain.failures() {
            text.push_str(&format!(
                "\n  checkpoint #{} {} ({}): link={} signature={} hash={}",
                check.index,
                check.checkpoint_id,
                check.step,
                check.link_valid,
                check.signature_valid,
                check.hash_well_formed
            ));
        }
        text
    })?;
    Ok(if report.end_to_end_traceability { 0 } else { 2 })
}

fn replay(
    config_path: &Path,
    public_key: Option<&str>,
    export: Option<PathBuf>,
    output: OutputMode,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let key = verification_key(&config, public_key)?;
    let verifier = ForensicVerifier::load(data_dir(&config)?, config.pipeline_id.clone(), key)?;

    if let Some(path) = export {
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &verifier.forensic_replay())?;
        info!(path = %path.display(), "Wrote forensic export");
    }

    let report = verifier.replay()?;
    emit(&report, output, |r| {
        format!(
            "replayed records: {}\nrecomputed hash:  {}\nstored hash:      {}\nhead matches:     {}\nmismatched checkpoints: {}\nindeterminate txns:     {}",
            r.records_replayed,
            r.recomputed_hash,
            r.stored_hash,
            r.head_matches,
            r.mismatched_checkpoints.len(),
            r.indeterminate.len()
        )
    })?;
    Ok(if report.is_consistent() { 0 } else { 2 })
}

fn recover(config_path: &Path, resolve: bool, output: OutputMode) -> Result<i32> {
    let config = load_config(config_path)?;
    let wal_path = data_dir(&config)?.join(WAL_LOG);

    if !resolve {
        let (_, result) = Recovery::scan(&wal_path, RecoveryOptions::default())?;
        emit(&result, output, |r| {
            let mut text = r.summary();
            for txn in &r.indeterminate {
                text.push_str(&format!(
                    "\n  indeterminate txn {} event {} -> {} (prepared {})",
                    txn.txn_id, txn.event_id, txn.target_uri, txn.prepared_at
                ));
            }
            text
        })?;
        return Ok(if result.indeterminate.is_empty() { 0 } else { 3 });
    }

    let mut pipeline = Pipeline::open(config).context("Failed to open pipeline")?;
    let resolved = pipeline.resolve_indeterminate()?;
    pipeline.sync()?;
    emit(&resolved, output, |txns| format!("Rolled back {} indeterminate transaction(s)", txns.len()))?;
    Ok(0)
}

fn emit<T: Serialize>(value: &T, output: OutputMode, human: impl FnOnce(&T) -> String) -> Result<()> {
    match output {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputMode::Human => println!("{}", human(value)),
    }
    Ok(())
}
