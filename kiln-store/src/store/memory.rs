//! Process-local record store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use kiln::{Error, Result};

use super::{Record, RecordStore};

/// A `HashMap`-backed store, optionally with a per-record size ceiling.
///
/// The ceiling mimics browser-style backends that reject single records
/// above some size; writes over it fail with `StorageUnavailable`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
    max_record_bytes: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects records whose payload exceeds `max_record_bytes`.
    #[must_use]
    pub fn with_max_record_bytes(max_record_bytes: usize) -> Self {
        Self {
            records: Mutex::default(),
            max_record_bytes: Some(max_record_bytes),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |r| r.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.lock().is_ok_and(|r| r.contains_key(id))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Record>>> {
        self.records
            .lock()
            .map_err(|_| Error::StorageUnavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, record: Record) -> Result<()> {
        if let Some(limit) = self.max_record_bytes {
            if record.payload_len() > limit {
                return Err(Error::StorageUnavailable(format!(
                    "record {} is {} bytes, limit is {limit}",
                    record.id(),
                    record.payload_len()
                )));
            }
        }
        self.lock()?.insert(record.id().to_string(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }
}
