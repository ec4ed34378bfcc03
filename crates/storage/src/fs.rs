//! Filesystem content store
//!
//! Layout: `<root>/ab/cd/<content_key>.json`, sharded by the first two and
//! next two hex characters of the key.
//!
//! # Write-once
//!
//! Objects are written to a temporary file in the shard directory, fsynced,
//! then published with `hard_link`, which fails if the target exists. Two
//! writers racing on the same key therefore cannot overwrite each other; the
//! loser compares its record with the winner's and reports a no-op or a
//! collision.

use crate::error::{Result, StorageError};
use crate::object::{check_key, StoredObject};
use crate::store::{ContentStore, PersistOutcome};
use cairn_core::EnrichedRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Content store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
    pipeline_id: String,
}

impl FsContentStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>, pipeline_id: impl Into<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        info!(root = %root.display(), "Opened content store");
        Ok(FsContentStore {
            root,
            pipeline_id: pipeline_id.into(),
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an object with this key is stored at
    ///
    /// Fails with [`StorageError::InvalidKey`] unless the key is 64 lowercase
    /// hex characters.
    pub fn object_path(&self, content_key: &str) -> Result<PathBuf> {
        check_key(content_key)?;
        Ok(self.shard_dir(content_key).join(format!("{content_key}.json")))
    }

    // Callers validate the key first
    fn shard_dir(&self, content_key: &str) -> PathBuf {
        self.root.join(&content_key[0..2]).join(&content_key[2..4])
    }

    fn read_object(&self, content_key: &str, path: &Path) -> Result<StoredObject> {
        let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
        let object: StoredObject =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupted {
                key: content_key.to_string(),
                reason: format!("unreadable object: {e}"),
            })?;
        if object.content_key != content_key {
            return Err(StorageError::Corrupted {
                key: content_key.to_string(),
                reason: format!("object claims key {}", object.content_key),
            });
        }
        Ok(object)
    }

    fn confirm_existing(&self, incoming: &StoredObject, path: &Path) -> Result<PersistOutcome> {
        let existing = self.read_object(&incoming.content_key, path)?;
        if existing.record.canonical_bytes()? != incoming.record.canonical_bytes()? {
            warn!(key = %incoming.content_key, "Stored object differs from incoming record");
            return Err(StorageError::KeyCollision(incoming.content_key.clone()));
        }
        debug!(key = %incoming.content_key, "Object already stored");
        Ok(PersistOutcome {
            content_key: incoming.content_key.clone(),
            newly_written: false,
        })
    }
}

impl ContentStore for FsContentStore {
    fn persist(&self, record: &EnrichedRecord) -> Result<PersistOutcome> {
        let object = StoredObject::new(record.clone(), &self.pipeline_id)?;
        let key = object.content_key.clone();
        let path = self.object_path(&key)?;

        if path.exists() {
            return self.confirm_existing(&object, &path);
        }

        let dir = self.shard_dir(&key);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let tmp = dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(&object)?;
        write_synced(&tmp, &bytes)?;

        let linked = fs::hard_link(&tmp, &path);
        // The temp name is unique to this call; leftovers are harmless
        let _ = fs::remove_file(&tmp);

        match linked {
            Ok(()) => {
                sync_dir(&dir)?;
                debug!(key = %key, "Stored object");
                Ok(PersistOutcome {
                    content_key: key,
                    newly_written: true,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self.confirm_existing(&object, &path),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    fn get(&self, content_key: &str) -> Result<Option<StoredObject>> {
        let path = self.object_path(content_key)?;
        if !path.exists() {
            return Ok(None);
        }
        let object = self.read_object(content_key, &path)?;
        object.verify()?;
        Ok(Some(object))
    }

    fn contains(&self, content_key: &str) -> Result<bool> {
        Ok(self.object_path(content_key)?.exists())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for level1 in read_dirs(&self.root)? {
            for level2 in read_dirs(&level1)? {
                let entries = fs::read_dir(&level2).map_err(|e| StorageError::io(&level2, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| StorageError::io(&level2, e))?;
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };
                    if let Some(key) = name.strip_suffix(".json") {
                        if check_key(key).is_ok() {
                            keys.push(key.to_string());
                        }
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn read_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            out.push(path);
        }
    }
    Ok(out)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| StorageError::io(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| StorageError::io(path, e))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StorageError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
