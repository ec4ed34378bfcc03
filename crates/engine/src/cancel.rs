//! Cooperative cancellation
//!
//! The orchestrator polls the flag before starting each record. A record that
//! has begun is always carried through to commit or rollback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop request
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// New, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next record boundary
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear a previous request
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}
