//! Durability layer for Cairn
//!
//! This crate implements the append-only logs of a pipeline instance:
//! - WalEntry types: Prepare, Commit, Rollback
//! - Line framing with CRC32 checksums
//! - AppendLog: single-writer log with shared snapshot readers
//! - Durability modes: None, Buffered, Strict (default)
//! - Recovery: classify WAL transactions, report indeterminate ones

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod log;
pub mod mode;
pub mod recovery;
pub mod wal;

pub use error::{DurabilityError, FrameError, Result};
pub use frame::{decode_body, decode_line, encode_line};
pub use log::{load_log, read_entries, AppendLog, CorruptLine, LogContents, LogReader};
pub use mode::DurabilityMode;
pub use recovery::{IndeterminateTxn, Recovery, RecoveryOptions, RecoveryResult};
pub use wal::{WalEntry, WalPhase};
