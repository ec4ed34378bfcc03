//! In-memory content store
//!
//! Used for ephemeral pipelines (no `data_dir`) and tests. DashMap gives
//! lock-free reads and an atomic insert-if-absent through its entry API.

use crate::error::{Result, StorageError};
use crate::object::{check_key, StoredObject};
use crate::store::{ContentStore, PersistOutcome};
use cairn_core::EnrichedRecord;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Content store held in memory
#[derive(Debug)]
pub struct MemoryContentStore {
    objects: DashMap<String, StoredObject>,
    pipeline_id: String,
}

impl MemoryContentStore {
    /// Create an empty store
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        MemoryContentStore {
            objects: DashMap::new(),
            pipeline_id: pipeline_id.into(),
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn persist(&self, record: &EnrichedRecord) -> Result<PersistOutcome> {
        let object = StoredObject::new(record.clone(), &self.pipeline_id)?;
        let key = object.content_key.clone();

        match self.objects.entry(key.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().record.canonical_bytes()? != object.record.canonical_bytes()? {
                    return Err(StorageError::KeyCollision(key));
                }
                debug!(key = %key, "Object already stored");
                Ok(PersistOutcome {
                    content_key: key,
                    newly_written: false,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(object);
                debug!(key = %key, "Stored object");
                Ok(PersistOutcome {
                    content_key: key,
                    newly_written: true,
                })
            }
        }
    }

    fn get(&self, content_key: &str) -> Result<Option<StoredObject>> {
        check_key(content_key)?;
        match self.objects.get(content_key) {
            Some(object) => {
                object.verify()?;
                Ok(Some(object.clone()))
            }
            None => Ok(None),
        }
    }

    fn contains(&self, content_key: &str) -> Result<bool> {
        check_key(content_key)?;
        Ok(self.objects.contains_key(content_key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}
