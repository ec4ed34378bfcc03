//! Deduplication engine
//!
//! The dedup set maps idempotency keys to a reservation state. A key goes
//! through:
//!
//! ```text
//! check_and_reserve ──► Reserved ──confirm──► Confirmed
//!                          │
//!                          └──release──► (absent)
//! ```
//!
//! `check_and_reserve` is atomic per key (DashMap entry API): two concurrent
//! callers with the same key never both see `Unique`. Reservation lets the
//! orchestrator hand a key back when storage fails, so a retried record is not
//! mistaken for a duplicate of a record that was never stored.
//!
//! With durable backing every confirmed key is journaled to `dedup.log` before
//! `confirm` returns, and the journal is replayed on open.

use crate::error::{EngineError, Result};
use cairn_durability::{AppendLog, DurabilityMode};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Result of a dedup check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// First sighting; the key is now reserved by the caller
    Unique,
    /// Key already reserved or confirmed
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Reserved,
    Confirmed,
}

/// Idempotency-key set
pub struct DedupCache {
    keys: DashMap<String, KeyState>,
    confirmed: AtomicUsize,
    journal: Option<Mutex<AppendLog<String>>>,
}

impl DedupCache {
    /// Process-local cache, lost on restart
    pub fn in_memory() -> Self {
        DedupCache {
            keys: DashMap::new(),
            confirmed: AtomicUsize::new(0),
            journal: None,
        }
    }

    /// Journaled cache; replays existing keys from `path`
    ///
    /// A journal with damaged lines is refused rather than replayed with
    /// keys missing or altered.
    pub fn durable(path: &Path, mode: DurabilityMode) -> Result<Self> {
        let journal = AppendLog::<String>::open(path, mode)?;
        if let Some(first) = journal.corrupt_lines().first() {
            return Err(EngineError::Integrity(format!(
                "dedup journal {} is damaged at line {}: {}",
                path.display(),
                first.line,
                first.reason
            )));
        }
        let keys = DashMap::new();
        for key in journal.snapshot() {
            keys.insert(key, KeyState::Confirmed);
        }
        let confirmed = keys.len();
        info!(path = %path.display(), keys = confirmed, "Loaded dedup journal");
        Ok(DedupCache {
            keys,
            confirmed: AtomicUsize::new(confirmed),
            journal: Some(Mutex::new(journal)),
        })
    }

    /// Atomically check a key and reserve it if unseen
    pub fn check_and_reserve(&self, key: &str) -> DedupDecision {
        match self.keys.entry(key.to_string()) {
            Entry::Occupied(_) => DedupDecision::Duplicate,
            Entry::Vacant(slot) => {
                slot.insert(KeyState::Reserved);
                DedupDecision::Unique
            }
        }
    }

    /// Make a reservation permanent
    ///
    /// Journals the key first when durable; on journal failure the key stays
    /// reserved and the error is returned.
    pub fn confirm(&self, key: &str) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.lock().append(key.to_string())?;
        }
        if let Some(mut state) = self.keys.get_mut(key) {
            if *state == KeyState::Reserved {
                *state = KeyState::Confirmed;
                self.confirmed.fetch_add(1, Ordering::AcqRel);
            }
        }
        debug!(key = %key, "Confirmed idempotency key");
        Ok(())
    }

    /// Drop a reservation that will not be confirmed
    pub fn release(&self, key: &str) {
        self.keys
            .remove_if(key, |_, state| *state == KeyState::Reserved);
    }

    /// Whether a key is reserved or confirmed
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Number of confirmed keys
    pub fn len(&self) -> usize {
        self.confirmed.load(Ordering::Acquire)
    }

    /// Whether no key is confirmed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the set survives restart
    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("confirmed", &self.len())
            .field("durable", &self.is_durable())
            .finish()
    }
}
