//! Integration tests for the chunked artifact cache.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kiln::{CancelToken, Error, Result};
use kiln_store::cache::{chunk_id, metadata_id};
use kiln_store::{
    ArtifactCache, ArtifactMetadata, ChunkRecord, MemoryStore, Record, RecordStore, SqliteStore,
};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Recording store: keeps the order of writes, and can hold only lengths
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn put(&self, record: Record) -> Result<()> {
        self.writes.lock().unwrap().push(record.id().to_string());
        self.inner.put(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
}

/// Remembers payload lengths only, so large artifacts cost no memory twice.
#[derive(Default)]
struct LengthStore {
    chunks: Mutex<Vec<(String, u64, usize)>>,
    metadata: Mutex<Option<ArtifactMetadata>>,
}

#[async_trait]
impl RecordStore for LengthStore {
    async fn put(&self, record: Record) -> Result<()> {
        match record {
            Record::Chunk(c) => self
                .chunks
                .lock()
                .unwrap()
                .push((c.id, c.ordinal, c.payload.len())),
            Record::Metadata(m) => *self.metadata.lock().unwrap() = Some(m),
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self
            .metadata
            .lock()
            .unwrap()
            .clone()
            .filter(|m| m.id == id)
            .map(Record::Metadata))
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

/// Fails every write after the first `allowed`.
struct FlakyStore {
    inner: MemoryStore,
    allowed: Mutex<usize>,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn put(&self, record: Record) -> Result<()> {
        {
            let mut allowed = self.allowed.lock().unwrap();
            if *allowed == 0 {
                return Err(Error::StorageUnavailable("quota exceeded".into()));
            }
            *allowed -= 1;
        }
        self.inner.put(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
}

/// Fires a cancel token once the first chunk has been written.
struct CancellingStore {
    inner: MemoryStore,
    cancel: CancelToken,
}

#[async_trait]
impl RecordStore for CancellingStore {
    async fn put(&self, record: Record) -> Result<()> {
        self.inner.put(record).await?;
        self.cancel.cancel();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
}

/// Writes succeed, every read fails.
struct UnreadableStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl RecordStore for UnreadableStore {
    async fn put(&self, record: Record) -> Result<()> {
        self.inner.put(record).await
    }

    async fn get(&self, _id: &str) -> Result<Option<Record>> {
        Err(Error::StorageUnavailable("backend offline".into()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
}

// ---------------------------------------------------------------------------
// Store / load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sizes_around_chunk_boundaries_load_back_identically() {
    let chunk = 16;
    let cache = ArtifactCache::with_chunk_size(MemoryStore::new(), chunk).unwrap();

    for (len, expected_chunks) in [(0, 0), (1, 1), (chunk, 1), (3 * chunk + 7, 4)] {
        let name = format!("artifact-{len}");
        let data = pattern(len);
        let metadata = cache.store(&name, &data).await.unwrap();
        assert_eq!(metadata.chunk_count, expected_chunks, "len {len}");
        assert_eq!(metadata.total_size_bytes, len as u64);
        assert_eq!(cache.load(&name).await, Some(data), "len {len}");
    }
}

#[tokio::test]
async fn empty_artifact_is_a_hit_not_a_miss() {
    let cache = ArtifactCache::new(MemoryStore::new());
    cache.store("empty", &[]).await.unwrap();
    assert_eq!(cache.load("empty").await, Some(Vec::new()));
    assert_eq!(cache.backend().len(), 1);
}

#[tokio::test]
async fn unknown_artifact_is_a_miss() {
    let cache = ArtifactCache::new(MemoryStore::new());
    assert_eq!(cache.load("nothing").await, None);
}

#[tokio::test]
async fn missing_chunk_makes_artifact_absent() {
    let cache = ArtifactCache::with_chunk_size(MemoryStore::new(), 4).unwrap();
    cache.store("a", &pattern(10)).await.unwrap();
    cache.backend().delete(&chunk_id("a", 1)).await.unwrap();
    assert_eq!(cache.load("a").await, None);
}

#[tokio::test]
async fn chunks_without_metadata_are_ignored() {
    let store = MemoryStore::new();
    store
        .put(Record::Chunk(ChunkRecord {
            id: chunk_id("orphan", 0),
            ordinal: 0,
            payload: vec![1, 2, 3],
        }))
        .await
        .unwrap();
    let cache = ArtifactCache::new(store);
    assert_eq!(cache.load("orphan").await, None);
}

#[tokio::test]
async fn short_chunk_is_a_size_mismatch_and_reads_as_absent() {
    let cache = ArtifactCache::with_chunk_size(MemoryStore::new(), 4).unwrap();
    cache.store("a", &pattern(8)).await.unwrap();
    cache
        .backend()
        .put(Record::Chunk(ChunkRecord {
            id: chunk_id("a", 1),
            ordinal: 1,
            payload: vec![0; 3],
        }))
        .await
        .unwrap();
    assert_eq!(cache.load("a").await, None);
}

#[tokio::test]
async fn metadata_is_written_after_every_chunk() {
    let cache = ArtifactCache::with_chunk_size(RecordingStore::default(), 3).unwrap();
    cache.store("w", &pattern(8)).await.unwrap();
    assert_eq!(
        cache.backend().writes(),
        vec![
            chunk_id("w", 0),
            chunk_id("w", 1),
            chunk_id("w", 2),
            metadata_id("w"),
        ]
    );
}

#[tokio::test]
async fn failed_chunk_write_leaves_no_metadata() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        allowed: Mutex::new(1),
    };
    let cache = ArtifactCache::with_chunk_size(store, 2).unwrap();
    let err = cache.store("f", &pattern(6)).await.unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));
    assert!(!cache.backend().inner.contains(&metadata_id("f")));
    assert_eq!(cache.load("f").await, None);
    assert!(cache.backend().inner.is_empty());
}

#[tokio::test]
async fn failed_metadata_write_discards_chunks() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        allowed: Mutex::new(3),
    };
    let cache = ArtifactCache::with_chunk_size(store, 2).unwrap();
    let err = cache.store("m", &pattern(6)).await.unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));
    assert!(cache.backend().inner.is_empty());
}

#[tokio::test]
async fn cancel_after_first_chunk_leaves_backend_empty() {
    let cancel = CancelToken::new();
    let store = CancellingStore {
        inner: MemoryStore::new(),
        cancel: cancel.clone(),
    };
    let cache = ArtifactCache::with_chunk_size(store, 2).unwrap();

    let err = cache
        .store_with_cancel("c", &pattern(6), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(cache.backend().inner.is_empty());
    assert_eq!(cache.load("c").await, None);
}

#[tokio::test]
async fn cancelled_restore_removes_old_and_new_chunks() {
    let cancel = CancelToken::new();
    let store = CancellingStore {
        inner: MemoryStore::new(),
        cancel: cancel.clone(),
    };
    store
        .inner
        .put(Record::Chunk(ChunkRecord {
            id: chunk_id("r", 3),
            ordinal: 3,
            payload: vec![1],
        }))
        .await
        .unwrap();
    store
        .inner
        .put(Record::Metadata(ArtifactMetadata::now(metadata_id("r"), 4, 4)))
        .await
        .unwrap();
    let cache = ArtifactCache::with_chunk_size(store, 2).unwrap();

    let err = cache
        .store_with_cancel("r", &pattern(6), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(cache.backend().inner.is_empty());
}

#[tokio::test]
async fn names_that_look_like_chunk_ids_do_not_collide() {
    let cache = ArtifactCache::with_chunk_size(MemoryStore::new(), 4).unwrap();
    cache.store("x", &[1, 2, 3]).await.unwrap();
    cache.store("x#chunk-0", &[9]).await.unwrap();
    cache.store("x#0", &[8]).await.unwrap();

    assert_eq!(cache.load("x").await, Some(vec![1, 2, 3]));
    assert_eq!(cache.load("x#chunk-0").await, Some(vec![9]));
    assert_eq!(cache.load("x#0").await, Some(vec![8]));
}

#[tokio::test]
async fn read_failure_is_a_miss() {
    let backend = Arc::new(MemoryStore::new());
    ArtifactCache::with_chunk_size(Arc::clone(&backend), 4)
        .unwrap()
        .store("u", &pattern(10))
        .await
        .unwrap();
    let store = UnreadableStore { inner: backend };
    let cache = ArtifactCache::with_chunk_size(store, 4).unwrap();

    assert_eq!(cache.load("u").await, None);
    assert!(matches!(
        cache.metadata("u").await,
        Err(Error::StorageUnavailable(_))
    ));
}

#[tokio::test]
async fn backend_size_ceiling_is_respected_by_chunking() {
    let store = MemoryStore::with_max_record_bytes(8);
    let oversized = ArtifactCache::with_chunk_size(MemoryStore::with_max_record_bytes(8), 16)
        .unwrap()
        .store("big", &pattern(16))
        .await;
    assert!(matches!(oversized, Err(Error::StorageUnavailable(_))));

    let cache = ArtifactCache::with_chunk_size(store, 8).unwrap();
    cache.store("big", &pattern(16)).await.unwrap();
    assert_eq!(cache.load("big").await, Some(pattern(16)));
}

#[tokio::test]
async fn hundred_fifty_mib_artifact_is_three_chunks() {
    const MIB: usize = 1024 * 1024;
    let cache = ArtifactCache::with_chunk_size(LengthStore::default(), 50 * MIB).unwrap();
    let data = vec![0u8; 150 * MIB];

    let metadata = cache.store("phi3.weights", &data).await.unwrap();
    assert_eq!(metadata.chunk_count, 3);
    assert_eq!(metadata.total_size_bytes, (150 * MIB) as u64);

    let chunks = cache.backend().chunks.lock().unwrap().clone();
    assert_eq!(
        chunks,
        vec![
            (chunk_id("phi3.weights", 0), 0, 50 * MIB),
            (chunk_id("phi3.weights", 1), 1, 50 * MIB),
            (chunk_id("phi3.weights", 2), 2, 50 * MIB),
        ]
    );
}

// ---------------------------------------------------------------------------
// Metadata / evict
// ---------------------------------------------------------------------------

#[tokio::test]
async fn evict_removes_every_record() {
    let cache = ArtifactCache::with_chunk_size(MemoryStore::new(), 4).unwrap();
    cache.store("e", &pattern(9)).await.unwrap();
    assert_eq!(cache.backend().len(), 4);

    cache.evict("e").await.unwrap();
    assert!(cache.backend().is_empty());
    assert_eq!(cache.metadata("e").await.unwrap(), None);

    // Evicting again is a no-op.
    cache.evict("e").await.unwrap();
}

#[tokio::test]
async fn shared_store_behind_arc() {
    let store = Arc::new(MemoryStore::new());
    let cache = ArtifactCache::new(Arc::clone(&store));
    cache.store("s", b"shared").await.unwrap();
    assert!(store.contains(&metadata_id("s")));
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("artifacts.sqlite");
    let data = pattern(1000);

    {
        let cache = ArtifactCache::with_chunk_size(SqliteStore::open(&path).unwrap(), 128).unwrap();
        let metadata = cache.store("model.weights", &data).await.unwrap();
        assert_eq!(metadata.chunk_count, 8);
    }

    let cache = ArtifactCache::with_chunk_size(SqliteStore::open(&path).unwrap(), 128).unwrap();
    assert_eq!(cache.load("model.weights").await, Some(data));
    let metadata = cache.metadata("model.weights").await.unwrap().unwrap();
    assert_eq!(metadata.total_size_bytes, 1000);
    assert!(metadata.created_at > 0);
}
