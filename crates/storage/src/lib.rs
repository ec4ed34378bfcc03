//! Immutable content-addressable storage for Cairn
//!
//! This crate implements the record store:
//! - ContentStore: write-once interface, no update or delete
//! - FsContentStore: sharded directory tree, hard-link publication
//! - MemoryContentStore: DashMap-backed, for ephemeral pipelines
//! - StoredObject: record plus stored-at, pipeline id and CRC-32 checksum
//!
//! Retention or expiry of stored objects is an external process.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod store;

pub use error::{Result, StorageError};
pub use fs::FsContentStore;
pub use memory::MemoryContentStore;
pub use object::{crc32_hex, StoredObject};
pub use store::{ContentStore, PersistOutcome};
