//! Durable storage of single records keyed by string id.
//!
//! Artifact metadata and artifact chunks share one store and are told apart
//! by which fields they carry. Backends only need put/get/delete of one
//! record at a time; no secondary indexes.

mod memory;
mod sqlite;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use kiln::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Describes one logical artifact stored as `chunk_count` chunk records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub id: String,
    pub chunk_count: u64,
    pub total_size_bytes: u64,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl ArtifactMetadata {
    /// Metadata stamped with the current time.
    #[must_use]
    pub fn now(id: impl Into<String>, chunk_count: u64, total_size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            chunk_count,
            total_size_bytes,
            created_at: unix_millis(),
        }
    }
}

/// One contiguous slice of an artifact. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub id: String,
    pub ordinal: u64,
    pub payload: Vec<u8>,
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Metadata(ArtifactMetadata),
    Chunk(ChunkRecord),
}

impl Record {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Metadata(m) => &m.id,
            Self::Chunk(c) => &c.id,
        }
    }

    /// Approximate stored size, used by backends that enforce a ceiling.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Metadata(_) => 0,
            Self::Chunk(c) => c.payload.len(),
        }
    }
}

/// Key-value storage of opaque records.
///
/// `put` is an upsert, `get` returns `None` for unknown ids, and `delete`
/// of an unknown id succeeds. Any backend I/O failure surfaces as
/// `StorageUnavailable` and is never retried here.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, record: Record) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Record>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn put(&self, record: Record) -> Result<()> {
        (**self).put(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        (**self).get(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id).await
    }
}

#[allow(clippy::cast_possible_truncation)]
fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
