//! WAL recovery scan
//!
//! After a crash the WAL may hold transactions that were prepared but never
//! reached commit or rollback. This module finds them; it never resolves
//! them. Resolution is an operator decision (the downstream may or may not
//! have received the record).
//!
//! ## Scan Sequence
//!
//! 1. Read every framed line of the WAL, counting corrupt lines
//! 2. Group entries by txn_id in WAL order
//! 3. Classify each transaction by its last terminal entry: committed,
//!    rolled back or indeterminate (a rollback after a commit means the
//!    downstream commit call failed, so the rollback wins)
//! 4. Flag terminal entries with no matching prepare as orphaned
//!
//! ## Usage
//!
//! ```ignore
//! let (entries, result) = Recovery::scan(&wal_path, RecoveryOptions::default())?;
//! println!("{}", result.summary());
//! ```

use crate::error::{DurabilityError, Result};
use crate::log::read_entries;
use crate::wal::WalEntry;
use cairn_core::{EventId, TxnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// Recovery Options
// ============================================================================

/// Recovery options
#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    /// Maximum corrupt lines to tolerate before failing
    pub max_corrupt_entries: usize,
    /// Whether to log each indeterminate transaction
    pub verbose: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        RecoveryOptions {
            max_corrupt_entries: 10,
            verbose: false,
        }
    }
}

impl RecoveryOptions {
    /// Strict recovery options - fail on any corruption
    pub fn strict() -> Self {
        RecoveryOptions {
            max_corrupt_entries: 0,
            verbose: true,
        }
    }

    /// Permissive recovery options - tolerate more corruption
    pub fn permissive() -> Self {
        RecoveryOptions {
            max_corrupt_entries: 100,
            verbose: false,
        }
    }
}

// ============================================================================
// Recovery Result
// ============================================================================

/// A prepared transaction with no terminal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndeterminateTxn {
    /// Transaction identifier
    pub txn_id: TxnId,
    /// Event that was being published
    pub event_id: EventId,
    /// Downstream target
    pub target_uri: String,
    /// When the prepare was written
    pub prepared_at: DateTime<Utc>,
}

/// Recovery scan result
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    /// WAL entries read
    pub entries_scanned: u64,
    /// Transactions whose last terminal entry is a commit
    pub committed: u64,
    /// Transactions whose last terminal entry is a rollback
    pub rolled_back: u64,
    /// Prepared transactions with no terminal entry, in WAL order
    pub indeterminate: Vec<IndeterminateTxn>,
    /// Terminal entries whose transaction was never prepared
    pub orphaned_terminals: u64,
    /// Commits later superseded by a rollback
    pub superseded_commits: u64,
    /// Terminal entries after a transaction was already rolled back
    pub duplicate_terminals: u64,
    /// Corrupt lines skipped
    pub corrupt_entries_skipped: u64,
    /// Scan time (microseconds)
    pub scan_time_micros: u64,
}

impl RecoveryResult {
    /// Get human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Recovery scan: {} WAL entries, {} committed, {} rolled back, {} indeterminate, {} orphaned, {} corrupt, {:.2}ms",
            self.entries_scanned,
            self.committed,
            self.rolled_back,
            self.indeterminate.len(),
            self.orphaned_terminals,
            self.corrupt_entries_skipped,
            self.scan_time_micros as f64 / 1000.0,
        )
    }

    /// Check if the scan found anything needing attention
    pub fn has_issues(&self) -> bool {
        !self.indeterminate.is_empty()
            || self.orphaned_terminals > 0
            || self.duplicate_terminals > 0
            || self.corrupt_entries_skipped > 0
    }
}

// ============================================================================
// Recovery
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Open,
    Committed,
    RolledBack,
}

/// WAL recovery scanner
pub struct Recovery;

impl Recovery {
    /// Scan a WAL file
    ///
    /// Returns the valid entries and the classification of every transaction.
    pub fn scan(wal_path: &Path, options: RecoveryOptions) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let start = std::time::Instant::now();
        info!("Starting recovery scan of {}", wal_path.display());

        let (entries, corrupt) = read_entries::<WalEntry>(wal_path)?;
        if corrupt > options.max_corrupt_entries as u64 {
            return Err(DurabilityError::TooManyCorruptEntries(
                corrupt,
                options.max_corrupt_entries,
            ));
        }

        let mut result = Self::classify(&entries, &options);
        result.corrupt_entries_skipped = corrupt;
        result.scan_time_micros = start.elapsed().as_micros() as u64;

        info!("{}", result.summary());
        Ok((entries, result))
    }

    /// Classify already-loaded entries
    pub fn classify(entries: &[WalEntry], options: &RecoveryOptions) -> RecoveryResult {
        let mut result = RecoveryResult {
            entries_scanned: entries.len() as u64,
            ..Default::default()
        };

        let mut txns: HashMap<TxnId, (usize, TxnState)> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            let txn_id = entry.txn_id();
            match entry {
                WalEntry::Prepare { .. } => {
                    txns.entry(txn_id).or_insert((idx, TxnState::Open));
                }
                WalEntry::Commit { .. } | WalEntry::Rollback { .. } => {
                    let Some((_, state)) = txns.get_mut(&txn_id) else {
                        result.orphaned_terminals += 1;
                        warn!(txn_id = %txn_id, "Terminal WAL entry without prepare");
                        continue;
                    };
                    let is_commit = matches!(entry, WalEntry::Commit { .. });
                    *state = match (*state, is_commit) {
                        (TxnState::Open, true) => TxnState::Committed,
                        (TxnState::Open, false) => TxnState::RolledBack,
                        (TxnState::Committed, false) => {
                            result.superseded_commits += 1;
                            TxnState::RolledBack
                        }
                        (current, _) => {
                            result.duplicate_terminals += 1;
                            current
                        }
                    };
                }
            }
        }

        let mut open = Vec::new();
        for (idx, state) in txns.values() {
            match state {
                TxnState::Open => open.push(*idx),
                TxnState::Committed => result.committed += 1,
                TxnState::RolledBack => result.rolled_back += 1,
            }
        }
        open.sort_unstable();

        for idx in open {
            let entry = &entries[idx];
            if options.verbose {
                warn!(
                    txn_id = %entry.txn_id(),
                    event_id = %entry.event_id(),
                    "Indeterminate transaction (prepared, never committed or rolled back)"
                );
            }
            result.indeterminate.push(IndeterminateTxn {
                txn_id: entry.txn_id(),
                event_id: entry.event_id(),
                target_uri: entry.target_uri().to_string(),
                prepared_at: entry.timestamp(),
            });
        }

        result
    }
}

// ============================================================================
// Tests
// ============================================================================
