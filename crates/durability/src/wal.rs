//! WAL (Write-Ahead Log) entry types
//!
//! This module defines the entries of the two-phase publish log:
//! - Prepare: publish intent, carries the full enriched record
//! - Commit: downstream accepted the record
//! - Rollback: downstream prepare or commit failed
//!
//! Every entry carries the txn_id, event_id and downstream target. A
//! transaction is `prepare` followed by exactly one terminal entry; a prepare
//! with no terminal entry is indeterminate and only an operator may resolve it.

use cairn_core::{EnrichedRecord, EventId, TxnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase tag of a WAL entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalPhase {
    /// Publish intent
    Prepare,
    /// Publish committed
    Commit,
    /// Publish rolled back
    Rollback,
}

impl fmt::Display for WalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WalPhase::Prepare => "prepare",
            WalPhase::Commit => "commit",
            WalPhase::Rollback => "rollback",
        })
    }
}

/// WAL entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum WalEntry {
    /// Publish intent, written before the downstream is contacted
    Prepare {
        /// Transaction identifier
        txn_id: TxnId,
        /// Event being published
        event_id: EventId,
        /// Downstream target URI
        target_uri: String,
        /// When the entry was written
        timestamp: DateTime<Utc>,
        /// The full enriched record
        payload: EnrichedRecord,
    },

    /// Downstream commit succeeded
    Commit {
        /// Transaction identifier
        txn_id: TxnId,
        /// Event being published
        event_id: EventId,
        /// Downstream target URI
        target_uri: String,
        /// When the entry was written
        timestamp: DateTime<Utc>,
        /// Content key of the published record
        reference: String,
    },

    /// Publish abandoned
    Rollback {
        /// Transaction identifier
        txn_id: TxnId,
        /// Event being published
        event_id: EventId,
        /// Downstream target URI
        target_uri: String,
        /// When the entry was written
        timestamp: DateTime<Utc>,
        /// Why the publish was rolled back
        reason: String,
    },
}

impl WalEntry {
    /// Build a prepare entry for a record
    pub fn prepare(txn_id: TxnId, target_uri: &str, payload: EnrichedRecord) -> Self {
        WalEntry::Prepare {
            txn_id,
            event_id: payload.event_id(),
            target_uri: target_uri.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Build the commit entry closing `txn_id`
    pub fn commit(txn_id: TxnId, event_id: EventId, target_uri: &str, reference: &str) -> Self {
        WalEntry::Commit {
            txn_id,
            event_id,
            target_uri: target_uri.to_string(),
            timestamp: Utc::now(),
            reference: reference.to_string(),
        }
    }

    /// Build the rollback entry closing `txn_id`
    pub fn rollback(txn_id: TxnId, event_id: EventId, target_uri: &str, reason: &str) -> Self {
        WalEntry::Rollback {
            txn_id,
            event_id,
            target_uri: target_uri.to_string(),
            timestamp: Utc::now(),
            reason: reason.to_string(),
        }
    }

    /// Phase of this entry
    pub fn phase(&self) -> WalPhase {
        match self {
            WalEntry::Prepare { .. } => WalPhase::Prepare,
            WalEntry::Commit { .. } => WalPhase::Commit,
            WalEntry::Rollback { .. } => WalPhase::Rollback,
        }
    }

    /// Transaction identifier
    pub fn txn_id(&self) -> TxnId {
        match self {
            WalEntry::Prepare { txn_id, .. }
            | WalEntry::Commit { txn_id, .. }
            | WalEntry::Rollback { txn_id, .. } => *txn_id,
        }
    }

    /// Event identifier
    pub fn event_id(&self) -> EventId {
        match self {
            WalEntry::Prepare { event_id, .. }
            | WalEntry::Commit { event_id, .. }
            | WalEntry::Rollback { event_id, .. } => *event_id,
        }
    }

    /// Downstream target URI
    pub fn target_uri(&self) -> &str {
        match self {
            WalEntry::Prepare { target_uri, .. }
            | WalEntry::Commit { target_uri, .. }
            | WalEntry::Rollback { target_uri, .. } => target_uri,
        }
    }

    /// Entry timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WalEntry::Prepare { timestamp, .. }
            | WalEntry::Commit { timestamp, .. }
            | WalEntry::Rollback { timestamp, .. } => *timestamp,
        }
    }

    /// Record carried by a prepare entry
    pub fn payload(&self) -> Option<&EnrichedRecord> {
        match self {
            WalEntry::Prepare { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Check if entry closes a transaction
    pub fn is_terminal(&self) -> bool {
        matches!(self, WalEntry::Commit { .. } | WalEntry::Rollback { .. })
    }
}
