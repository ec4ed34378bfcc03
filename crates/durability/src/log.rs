//! Append-only logs
//!
//! [`AppendLog`] is the single-writer, append-only sequence behind the
//! checkpoint chain, the WAL and the durable dedup journal. Entries are kept in
//! memory behind an `Arc<RwLock<Vec<T>>>` and, when file-backed, written as
//! framed lines before they become visible in memory.
//!
//! # Readers
//!
//! [`LogReader`] shares the in-memory vector. Because the vector only grows,
//! a snapshot taken at any time is a prefix of the final log. Readers never
//! block the writer for longer than one clone.

use crate::error::{DurabilityError, FrameError, Result};
use crate::frame::{decode_body, decode_line, encode_line};
use crate::mode::DurabilityMode;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

struct LogFile {
    path: PathBuf,
    file: File,
    unsynced: usize,
}

/// Append-only log, optionally backed by a file
pub struct AppendLog<T> {
    entries: Arc<RwLock<Vec<T>>>,
    sink: Option<LogFile>,
    read_only: Option<PathBuf>,
    mode: DurabilityMode,
    corrupt: Vec<CorruptLine>,
}

/// A line that failed its checksum or could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptLine {
    /// 1-based line number in the file
    pub line: usize,
    /// Position among the loaded entries when the body still decoded
    pub entry_index: Option<usize>,
    /// Why the line was rejected
    pub reason: String,
}

/// Entries of a log file together with its damage
#[derive(Debug, Clone)]
pub struct LogContents<T> {
    /// Valid entries plus entries salvaged from lines with a bad checksum
    pub entries: Vec<T>,
    /// Lines that failed verification, in file order
    pub corrupt: Vec<CorruptLine>,
    /// Offset of an unterminated, undecodable final line
    pub torn_tail: Option<u64>,
}

impl<T> LogContents<T> {
    /// No line failed verification
    pub fn is_intact(&self) -> bool {
        self.corrupt.is_empty()
    }
}

/// Load a log file, recording every damaged line
///
/// A line whose checksum fails but whose body still decodes is kept in
/// `entries` and listed in `corrupt` with its index, so callers can check the
/// altered entry itself. A final line with no trailing newline that does not
/// decode at all is an interrupted append: it is reported as `torn_tail`, not
/// as corruption. A missing file loads as empty.
pub fn load_log<T: DeserializeOwned>(path: &Path) -> Result<LogContents<T>> {
    let mut contents = LogContents {
        entries: Vec::new(),
        corrupt: Vec::new(),
        torn_tail: None,
    };
    if !path.exists() {
        return Ok(contents);
    }
    let bytes = read_file(path)?;

    let mut offset = 0usize;
    let mut lines = bytes.split(|b| *b == b'\n').enumerate().peekable();
    while let Some((lineno, raw)) = lines.next() {
        let start = offset;
        offset += raw.len() + 1;
        if raw.is_empty() {
            continue;
        }
        let unterminated = lines.peek().is_none();
        let text = std::str::from_utf8(raw).map_err(|_| FrameError::Malformed);
        let err = match text.clone().and_then(decode_line::<T>) {
            Ok(entry) => {
                contents.entries.push(entry);
                continue;
            }
            Err(e) => e,
        };
        match text.and_then(decode_body::<T>) {
            Ok(entry) => {
                warn!(path = %path.display(), line = lineno + 1, error = %err, "Log line fails its checksum");
                contents.corrupt.push(CorruptLine {
                    line: lineno + 1,
                    entry_index: Some(contents.entries.len()),
                    reason: err.to_string(),
                });
                contents.entries.push(entry);
            }
            Err(_) if unterminated => {
                warn!(path = %path.display(), line = lineno + 1, "Torn final log line");
                contents.torn_tail = Some(start as u64);
            }
            Err(_) => {
                warn!(path = %path.display(), line = lineno + 1, error = %err, "Undecodable log line");
                contents.corrupt.push(CorruptLine {
                    line: lineno + 1,
                    entry_index: None,
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(contents)
}

/// Read every valid entry of a log file
///
/// Returns the entries and the number of lines skipped because they failed
/// verification, a torn tail included. A missing file reads as empty.
pub fn read_entries<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, u64)> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }
    let bytes = read_file(path)?;

    let mut entries = Vec::new();
    let mut corrupt = 0u64;
    for (lineno, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        if raw.is_empty() {
            continue;
        }
        let decoded = std::str::from_utf8(raw)
            .map_err(|_| FrameError::Malformed)
            .and_then(decode_line::<T>);
        match decoded {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                corrupt += 1;
                warn!(path = %path.display(), line = lineno + 1, error = %e, "Skipping corrupt log line");
            }
        }
    }
    Ok((entries, corrupt))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| DurabilityError::io(path, e))?;
    Ok(bytes)
}

impl<T> AppendLog<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Create a log that lives only in memory
    pub fn in_memory() -> Self {
        AppendLog {
            entries: Arc::new(RwLock::new(Vec::new())),
            sink: None,
            read_only: None,
            mode: DurabilityMode::None,
            corrupt: Vec::new(),
        }
    }

    /// Load a log file for inspection
    ///
    /// The file is left untouched, torn tail included, and every append
    /// fails with [`DurabilityError::ReadOnly`].
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let LogContents { entries, corrupt, .. } = load_log::<T>(&path)?;
        Ok(AppendLog {
            entries: Arc::new(RwLock::new(entries)),
            sink: None,
            read_only: Some(path),
            mode: DurabilityMode::None,
            corrupt,
        })
    }

    /// Open a file-backed log, loading existing entries
    ///
    /// A torn final line is cut off. Lines that fail verification anywhere
    /// else are left in place and exposed through [`AppendLog::corrupt_lines`].
    pub fn open(path: impl Into<PathBuf>, mode: DurabilityMode) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DurabilityError::io(parent, e))?;
        }
        let LogContents {
            entries,
            corrupt,
            torn_tail,
        } = load_log::<T>(&path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DurabilityError::io(&path, e))?;

        if let Some(len) = torn_tail {
            file.set_len(len)
                .and_then(|_| file.sync_all())
                .map_err(|e| DurabilityError::io(&path, e))?;
            debug!(path = %path.display(), len, "Truncated torn log tail");
        }

        // A complete final line may still lack its newline
        if ends_without_newline(&path)? {
            file.write_all(b"\n")
                .and_then(|_| file.sync_all())
                .map_err(|e| DurabilityError::io(&path, e))?;
        }

        debug!(
            path = %path.display(),
            entries = entries.len(),
            corrupt = corrupt.len(),
            "Opened append log"
        );

        Ok(AppendLog {
            entries: Arc::new(RwLock::new(entries)),
            sink: Some(LogFile {
                path,
                file,
                unsynced: 0,
            }),
            read_only: None,
            mode,
            corrupt,
        })
    }

    /// Append an entry
    ///
    /// The entry is visible to readers only after it has been written (and,
    /// per the durability mode, fsynced).
    pub fn append(&mut self, entry: T) -> Result<()> {
        if let Some(path) = &self.read_only {
            return Err(DurabilityError::ReadOnly { path: path.clone() });
        }
        if let Some(sink) = self.sink.as_mut() {
            let line = encode_line(&entry)?;
            sink.file
                .write_all(line.as_bytes())
                .map_err(|e| DurabilityError::io(&sink.path, e))?;
            sink.unsynced += 1;
            if self.mode.sync_due(sink.unsynced) {
                sink.file
                    .sync_data()
                    .map_err(|e| DurabilityError::io(&sink.path, e))?;
                sink.unsynced = 0;
            }
        }
        self.entries.write().push(entry);
        Ok(())
    }

    /// Force an fsync of pending appends
    pub fn sync(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            if sink.unsynced > 0 {
                sink.file
                    .sync_data()
                    .map_err(|e| DurabilityError::io(&sink.path, e))?;
                sink.unsynced = 0;
            }
        }
        Ok(())
    }

    /// Read handle sharing this log's entries
    pub fn reader(&self) -> LogReader<T> {
        LogReader {
            entries: Arc::clone(&self.entries),
        }
    }

    /// Copy of all entries
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.read().clone()
    }

    /// Last entry
    pub fn last(&self) -> Option<T> {
        self.entries.read().last().cloned()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Lines that failed verification when the log was opened
    pub fn corrupt_lines(&self) -> &[CorruptLine] {
        &self.corrupt
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.sink
            .as_ref()
            .map(|s| s.path.as_path())
            .or(self.read_only.as_deref())
    }

    /// Durability mode of this log
    pub fn mode(&self) -> DurabilityMode {
        self.mode
    }
}

impl<T> Drop for AppendLog<T> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if sink.unsynced > 0 && self.mode != DurabilityMode::None {
                if let Err(e) = sink.file.sync_data() {
                    warn!(path = %sink.path.display(), error = %e, "Final log sync failed");
                }
            }
        }
    }
}

fn ends_without_newline(path: &Path) -> Result<bool> {
    Ok(read_file(path)?.last().is_some_and(|b| *b != b'\n'))
}

/// Shared read handle over an [`AppendLog`]
pub struct LogReader<T> {
    entries: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for LogReader<T> {
    fn clone(&self) -> Self {
        LogReader {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Clone> LogReader<T> {
    /// Immutable copy of the entries appended so far
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.read().clone()
    }

    /// Copy of the first `len` entries, or of all of them if fewer exist
    pub fn prefix(&self, len: usize) -> Vec<T> {
        let entries = self.entries.read();
        entries[..len.min(entries.len())].to_vec()
    }

    /// Number of entries appended so far
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
