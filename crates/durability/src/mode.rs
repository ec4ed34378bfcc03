//! Durability mode for append-only logs.
//!
//! Defines when appended lines are fsynced to disk.

use serde::{Deserialize, Serialize};

/// Appends between fsyncs in [`DurabilityMode::Buffered`]
pub const BUFFERED_SYNC_EVERY: usize = 64;

/// Durability mode for log appends.
///
/// # Mode Comparison
///
/// | Mode | fsync | Crash loses |
/// |------|-------|-------------|
/// | None | never (OS decides) | anything not yet flushed by the OS |
/// | Buffered | every 64 appends and on drop | up to 64 lines |
/// | Strict | every append | nothing acknowledged |
///
/// The checkpoint chain is an audit log; `Strict` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// Write lines, never fsync.
    ///
    /// Use case: tests, throwaway runs.
    None,

    /// fsync periodically.
    Buffered,

    /// fsync after every append (slowest, safest).
    #[default]
    Strict,
}

impl DurabilityMode {
    /// Check if an fsync is due after `appends_since_sync` appends.
    pub fn sync_due(&self, appends_since_sync: usize) -> bool {
        match self {
            DurabilityMode::None => false,
            DurabilityMode::Buffered => appends_since_sync >= BUFFERED_SYNC_EVERY,
            DurabilityMode::Strict => true,
        }
    }
}
