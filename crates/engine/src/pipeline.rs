//! Pipeline orchestrator
//!
//! [`Pipeline`] owns all mutable state of one pipeline instance: the dedup
//! set, the checkpoint chain, the WAL and the content store. Records are
//! processed strictly in order by a single writer (`&mut self`). Readers get
//! immutable snapshots through [`PipelineReader`].
//!
//! Per record:
//!
//! ```text
//! validate ─► enrich ─► dedup reserve ─► persist ─► fold + "ingest" ─► "store"
//!     │                      │              │                │              │
//!   failed               duplicate          └── release key, abort stream ──┘
//!
//! ─► dedup confirm ─► two-phase publish
//! ```
//!
//! The record is persisted before any checkpoint references it, and its key
//! is confirmed only once both checkpoints exist, so a record that failed
//! part-way can be retried without being taken for a duplicate.
//!
//! # Example
//!
//! ```ignore
//! let config = PipelineConfig::load(Path::new("cairn.toml"))?;
//! let mut pipeline = Pipeline::open(config)?;
//! let report = pipeline.process_stream(records)?;
//! let audit = pipeline.audit_report();
//! ```

use crate::cancel::CancelFlag;
use crate::checkpoint::CheckpointManager;
use crate::config::{DedupBacking, PipelineConfig};
use crate::dedup::{DedupCache, DedupDecision};
use crate::error::{EngineError, Result};
use crate::publish::{AcknowledgingDownstream, Downstream, PublishCoordinator, PublishOutcome};
use crate::reader::{PipelineReader, Watermark};
use crate::report::{AuditReport, StreamReport, VerificationSummary};
use crate::verifier::ForensicVerifier;
use cairn_core::{EnrichedRecord, EventId, LineageEnricher, PipelineStep, SchemaValidator, TxnId, ValidationError};
use cairn_durability::{AppendLog, CorruptLine, Recovery, RecoveryOptions, RecoveryResult};
use cairn_security::{load_or_generate, CheckpointSigner};
use cairn_storage::{ContentStore, FsContentStore, MemoryContentStore};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Checkpoint log file name under `data_dir`
pub const CHECKPOINT_LOG: &str = "checkpoints.log";
/// WAL file name under `data_dir`
pub const WAL_LOG: &str = "wal.log";
/// Dedup journal file name under `data_dir`
pub const DEDUP_LOG: &str = "dedup.log";
/// Object store directory under `data_dir`
pub const OBJECTS_DIR: &str = "objects";
/// Rollback reason written by [`Pipeline::resolve_indeterminate`]
pub const INDETERMINATE_REASON: &str = "indeterminate-after-restart";

/// What happened to one input record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Rejected by the validator; nothing was recorded
    Failed(ValidationError),
    /// Already seen; nothing was recorded
    Duplicate {
        /// Idempotency key that matched
        idempotency_key: String,
    },
    /// Stored, checkpointed and handed to the publish coordinator
    Accepted {
        /// Event identifier minted for the record
        event_id: EventId,
        /// Content key in the store
        content_key: String,
        /// Publish result
        publish: PublishOutcome,
    },
}

impl RecordOutcome {
    fn tally(&self, report: &mut StreamReport) {
        match self {
            RecordOutcome::Failed(_) => report.failed += 1,
            RecordOutcome::Duplicate { .. } => report.duplicates += 1,
            RecordOutcome::Accepted {
                content_key,
                publish,
                ..
            } => {
                report.processed += 1;
                report.content_keys.push(content_key.clone());
                if publish.is_committed() {
                    report.published += 1;
                } else {
                    report.unpublished.push(content_key.clone());
                }
            }
        }
    }
}

/// Builder for [`Pipeline`]
///
/// Anything not supplied is derived from the config: the signer is loaded
/// from (or generated at) `signing.key_path`, the store lives under
/// `data_dir/objects` (or in memory), and every publish is acknowledged.
pub struct PipelineBuilder {
    config: PipelineConfig,
    signer: Option<CheckpointSigner>,
    store: Option<Box<dyn ContentStore>>,
    downstream: Option<Box<dyn Downstream>>,
    cancel: Option<CancelFlag>,
}

impl PipelineBuilder {
    /// Start from a config
    pub fn new(config: PipelineConfig) -> Self {
        PipelineBuilder {
            config,
            signer: None,
            store: None,
            downstream: None,
            cancel: None,
        }
    }

    /// Use this signer instead of the key file
    pub fn signer(mut self, signer: CheckpointSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Use this content store
    pub fn store(mut self, store: impl ContentStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Publish to this downstream
    pub fn downstream(mut self, downstream: impl Downstream + 'static) -> Self {
        self.downstream = Some(Box::new(downstream));
        self
    }

    /// Share an existing cancel flag
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Open the pipeline
    ///
    /// Over an existing `data_dir` this reloads the chain and WAL, verifies
    /// the chain with the configured key and reports indeterminate
    /// transactions. It never resolves them.
    ///
    /// Any damaged line in the checkpoint log or WAL is an integrity error.
    /// Only a torn final line, left by an interrupted append, is cut off.
    pub fn open(self) -> Result<Pipeline> {
        let config = self.config;
        config.validate()?;

        let validator = SchemaValidator::new(config.schema_version.clone())
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let enricher = LineageEnricher::new(
            config.pipeline_version.clone(),
            config.schema_version.clone(),
            config.node_id(),
        );

        let signer = match self.signer {
            Some(signer) => signer,
            None => load_or_generate(config.signing.scheme, &config.signing.key_path)?,
        };
        if signer.scheme() != config.signing.scheme {
            return Err(EngineError::Config(format!(
                "signer scheme {} does not match configured scheme {}",
                signer.scheme(),
                config.signing.scheme
            )));
        }

        let supplied_store = self.store;
        let (checkpoint_log, wal, dedup, store): (_, _, _, Box<dyn ContentStore>) =
            match &config.data_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        EngineError::Config(format!("cannot create {}: {e}", dir.display()))
                    })?;
                    let dedup = match config.dedup {
                        DedupBacking::Durable => {
                            DedupCache::durable(&dir.join(DEDUP_LOG), config.durability)?
                        }
                        DedupBacking::Memory => DedupCache::in_memory(),
                    };
                    let checkpoint_log = AppendLog::open(dir.join(CHECKPOINT_LOG), config.durability)?;
                    ensure_intact(CHECKPOINT_LOG, checkpoint_log.corrupt_lines())?;
                    let wal = AppendLog::open(dir.join(WAL_LOG), config.durability)?;
                    ensure_intact(WAL_LOG, wal.corrupt_lines())?;
                    (
                        checkpoint_log,
                        wal,
                        dedup,
                        match supplied_store {
                            Some(store) => store,
                            None => Box::new(FsContentStore::open(
                                dir.join(OBJECTS_DIR),
                                config.pipeline_id.clone(),
                            )?),
                        },
                    )
                }
                None => (
                    AppendLog::in_memory(),
                    AppendLog::in_memory(),
                    DedupCache::in_memory(),
                    supplied_store.unwrap_or_else(|| {
                        Box::new(MemoryContentStore::new(config.pipeline_id.clone()))
                    }),
                ),
            };

        let checkpoints = CheckpointManager::new(checkpoint_log, signer);
        let chain = checkpoints.verify_chain();
        if !chain.is_valid() {
            let first = chain.failures().first().map(|c| c.index).unwrap_or_default();
            return Err(EngineError::Integrity(format!(
                "checkpoint chain fails verification at index {first} ({} of {} checkpoints)",
                chain.failures().len(),
                chain.checks.len()
            )));
        }

        let dedup_baseline = if dedup.is_durable() {
            0
        } else {
            checkpoints.event_count()
        };
        if dedup_baseline > 0 {
            warn!(
                events = dedup_baseline,
                "Dedup set is memory-backed; previously accepted records are not deduplicated"
            );
        }

        let publisher = PublishCoordinator::new(wal, config.downstream_uri.clone());
        let recovery = Recovery::classify(&publisher.entries(), &RecoveryOptions::default());
        for txn in &recovery.indeterminate {
            warn!(
                txn_id = %txn.txn_id,
                event_id = %txn.event_id,
                "Indeterminate publish transaction awaiting operator resolution"
            );
        }

        info!(
            pipeline_id = %config.pipeline_id,
            node_id = %config.node_id(),
            scheme = %config.signing.scheme,
            fingerprint = %checkpoints.verification_key().fingerprint(),
            checkpoints = checkpoints.len(),
            event_count = checkpoints.event_count(),
            durability = ?config.durability,
            ephemeral = config.is_ephemeral(),
            "Opened pipeline"
        );

        let watermark = Watermark {
            checkpoints: checkpoints.len(),
            wal: publisher.len(),
            dedup: dedup.len(),
        };
        Ok(Pipeline {
            validator,
            enricher,
            dedup,
            dedup_baseline,
            watermark: Arc::new(RwLock::new(watermark)),
            checkpoints,
            publisher,
            store,
            downstream: self
                .downstream
                .unwrap_or_else(|| Box::new(AcknowledgingDownstream)),
            totals: StreamReport::default(),
            cancel: self.cancel.unwrap_or_default(),
            config,
        })
    }
}

/// One pipeline instance
pub struct Pipeline {
    config: PipelineConfig,
    validator: SchemaValidator,
    enricher: LineageEnricher,
    dedup: DedupCache,
    dedup_baseline: u64,
    watermark: Arc<RwLock<Watermark>>,
    checkpoints: CheckpointManager,
    publisher: PublishCoordinator,
    store: Box<dyn ContentStore>,
    downstream: Box<dyn Downstream>,
    totals: StreamReport,
    cancel: CancelFlag,
}

impl Pipeline {
    /// Open with defaults for everything the config does not name
    pub fn open(config: PipelineConfig) -> Result<Self> {
        PipelineBuilder::new(config).open()
    }

    /// Builder for custom signer, store or downstream
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Process records in order until the input ends or cancellation
    ///
    /// Validation failures and duplicates are counted. An infrastructure
    /// failure stops the stream at that record and is returned as
    /// [`EngineError::StreamAborted`] carrying the counts so far.
    pub fn process_stream<I, P, U>(&mut self, records: I) -> Result<StreamReport>
    where
        I: IntoIterator<Item = (P, U)>,
        P: AsRef<[u8]>,
        U: AsRef<str>,
    {
        let mut report = StreamReport::default();
        for (payload, upstream_uri) in records {
            if self.cancel.is_cancelled() {
                info!(handled = report.total(), "Stream cancelled at record boundary");
                report.cancelled = true;
                break;
            }
            match self.process_one(payload.as_ref(), upstream_uri.as_ref()) {
                Ok(outcome) => outcome.tally(&mut report),
                Err(e) => {
                    error!(handled = report.total(), error = %e, "Aborting stream");
                    return Err(EngineError::StreamAborted {
                        report: Box::new(report),
                        source: Box::new(e),
                    });
                }
            }
        }
        info!(
            processed = report.processed,
            failed = report.failed,
            duplicates = report.duplicates,
            published = report.published,
            "Stream complete"
        );
        Ok(report)
    }

    /// Process a single record
    pub fn process_one(&mut self, payload: &[u8], upstream_uri: &str) -> Result<RecordOutcome> {
        let outcome = self.ingest(payload, upstream_uri)?;
        outcome.tally(&mut self.totals);
        self.advance_watermark();
        Ok(outcome)
    }

    /// Publish the current log lengths to readers
    fn advance_watermark(&self) {
        *self.watermark.write() = Watermark {
            checkpoints: self.checkpoints.len(),
            wal: self.publisher.len(),
            dedup: self.dedup.len(),
        };
    }

    fn ingest(&mut self, payload: &[u8], upstream_uri: &str) -> Result<RecordOutcome> {
        let raw = match self.validator.decode(payload) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(upstream = upstream_uri, error = %e, "Rejected record");
                return Ok(RecordOutcome::Failed(e));
            }
        };

        let record = self.enricher.enrich(raw, payload, upstream_uri);
        let key = record.idempotency_key();
        if self.dedup.check_and_reserve(&key) == DedupDecision::Duplicate {
            debug!(evaluation_id = %record.record.evaluation_id, "Skipped duplicate");
            return Ok(RecordOutcome::Duplicate { idempotency_key: key });
        }

        let persisted = match self.store.persist(&record) {
            Ok(persisted) => persisted,
            Err(e) => {
                self.dedup.release(&key);
                return Err(e.into());
            }
        };
        if let Err(e) = self.checkpoint_and_confirm(&record, &key) {
            self.dedup.release(&key);
            return Err(e);
        }

        let publish = self.publisher.publish(
            &record,
            &persisted.content_key,
            self.downstream.as_mut(),
            &mut self.checkpoints,
        )?;
        debug!(
            event_id = %record.event_id(),
            content_key = %persisted.content_key,
            published = publish.is_committed(),
            "Accepted record"
        );

        Ok(RecordOutcome::Accepted {
            event_id: record.event_id(),
            content_key: persisted.content_key,
            publish,
        })
    }

    fn checkpoint_and_confirm(&mut self, record: &EnrichedRecord, key: &str) -> Result<()> {
        self.checkpoints.record_ingest(record)?;
        self.checkpoints.create_checkpoint(PipelineStep::Store)?;
        self.dedup.confirm(key)
    }

    /// Audit report over everything processed since open
    pub fn audit_report(&self) -> AuditReport {
        let key = self.checkpoints.verification_key();
        let chain = self.checkpoints.verify_chain();
        AuditReport {
            pipeline_id: self.config.pipeline_id.clone(),
            pipeline_version: self.config.pipeline_version.clone(),
            node_id: self.config.node_id().to_string(),
            processed: self.totals.processed,
            failed: self.totals.failed,
            duplicates: self.totals.duplicates,
            published: self.totals.published,
            event_count: self.checkpoints.event_count(),
            content_keys: self.totals.content_keys.clone(),
            unpublished: self.totals.unpublished.clone(),
            verification: VerificationSummary {
                cumulative_hash: self.checkpoints.cumulative_hash().to_string(),
                signature_scheme: key.scheme(),
                key_fingerprint: key.fingerprint(),
                public_key: key.public_key_hex(),
                signatures_valid: chain.signatures_valid(),
                chain_valid: chain.is_valid(),
                checkpoint_count: self.checkpoints.len(),
                wal_entry_count: self.publisher.len(),
            },
        }
    }

    /// Cloneable read handle for concurrent inspection
    pub fn reader(&self) -> PipelineReader {
        PipelineReader {
            pipeline_id: self.config.pipeline_id.clone(),
            checkpoints: self.checkpoints.reader(),
            wal: self.publisher.reader(),
            watermark: Arc::clone(&self.watermark),
            dedup_baseline: self.dedup_baseline,
            key: self.checkpoints.verification_key(),
        }
    }

    /// Verifier over a snapshot of the current state
    pub fn verifier(&self) -> ForensicVerifier {
        self.reader().verifier()
    }

    /// Classify the WAL's transactions
    pub fn recovery_scan(&self) -> RecoveryResult {
        Recovery::classify(&self.publisher.entries(), &RecoveryOptions::default())
    }

    /// Roll back every indeterminate transaction
    ///
    /// Operator action after confirming the downstream did not keep the
    /// records. Writes a rollback entry and a `"publish-rollback"` checkpoint
    /// per transaction.
    pub fn resolve_indeterminate(&mut self) -> Result<Vec<TxnId>> {
        let open = self.recovery_scan().indeterminate;
        let mut resolved = Vec::with_capacity(open.len());
        for txn in open {
            self.publisher.resolve_indeterminate(
                txn.txn_id,
                txn.event_id,
                &txn.target_uri,
                INDETERMINATE_REASON,
                &mut self.checkpoints,
            )?;
            self.advance_watermark();
            warn!(txn_id = %txn.txn_id, event_id = %txn.event_id, "Resolved indeterminate transaction as rolled back");
            resolved.push(txn.txn_id);
        }
        Ok(resolved)
    }

    /// Handle that stops `process_stream` at the next record boundary
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Counts since open
    pub fn totals(&self) -> &StreamReport {
        &self.totals
    }

    /// Number of confirmed dedup keys
    pub fn dedup_len(&self) -> usize {
        self.dedup.len()
    }

    /// Lifetime accepted-event count
    pub fn event_count(&self) -> u64 {
        self.checkpoints.event_count()
    }

    /// Current cumulative hash
    pub fn cumulative_hash(&self) -> &str {
        self.checkpoints.cumulative_hash()
    }

    /// Content store
    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    /// Configuration the pipeline was opened with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Flush every log
    pub fn sync(&mut self) -> Result<()> {
        self.checkpoints.sync()?;
        self.publisher.sync()
    }
}

fn ensure_intact(log: &str, corrupt: &[CorruptLine]) -> Result<()> {
    match corrupt.first() {
        None => Ok(()),
        Some(first) => Err(EngineError::Integrity(format!(
            "{log} has {} damaged line(s), first at line {}: {}",
            corrupt.len(),
            first.line,
            first.reason
        ))),
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("pipeline_id", &self.config.pipeline_id)
            .field("event_count", &self.checkpoints.event_count())
            .field("dedup", &self.dedup)
            .finish_non_exhaustive()
    }
}
