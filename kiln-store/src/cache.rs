//! Chunked artifact cache
//!
//! Persists artifacts larger than the backend's per-record ceiling as one
//! metadata record plus `chunk_count` chunk records:
//!
//! ```text
//! "meta:<name>"          → ArtifactMetadata { chunk_count, total_size_bytes, created_at }
//! "chunk:<name>#0"       → ChunkRecord { ordinal: 0, payload }
//! ...
//! "chunk:<name>#N-1"     → ChunkRecord { ordinal: N-1, payload }
//! ```
//!
//! The two prefixes keep metadata and chunk ids disjoint, and the ordinal
//! after the last `#` keeps chunk ids of different names disjoint, so any
//! artifact name is allowed.
//!
//! Chunks are written in ordinal order and the metadata record last, so a
//! crash mid-write leaves no metadata and the artifact reads as absent.
//! Reads never return partial data: any missing or malformed record turns
//! the whole load into a miss.

use tracing::{debug, info, warn};

use kiln::{CancelToken, Error, Result};

use crate::codec;
use crate::store::{ArtifactMetadata, ChunkRecord, Record, RecordStore};

/// Default chunk size: 50 MiB, well under what browser-class backends accept
/// for a single record.
pub const DEFAULT_CHUNK_SIZE: usize = 50 * 1024 * 1024;

/// Id of an artifact's metadata record.
#[must_use]
pub fn metadata_id(name: &str) -> String {
    format!("meta:{name}")
}

/// Id of an artifact's chunk record at `ordinal`.
#[must_use]
pub fn chunk_id(name: &str, ordinal: u64) -> String {
    format!("chunk:{name}#{ordinal}")
}

/// Artifact cache over any [`RecordStore`].
pub struct ArtifactCache<S> {
    store: S,
    chunk_size: usize,
}

impl<S: RecordStore> ArtifactCache<S> {
    /// Cache with [`DEFAULT_CHUNK_SIZE`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Cache with an explicit chunk size.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `chunk_size` is zero.
    pub fn with_chunk_size(store: S, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be at least 1".into()));
        }
        Ok(Self { store, chunk_size })
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The underlying record store.
    pub fn backend(&self) -> &S {
        &self.store
    }

    /// Persist `bytes` under `name`, replacing any previous artifact.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if any write fails. The artifact then
    /// reads as absent.
    pub async fn store(&self, name: &str, bytes: &[u8]) -> Result<ArtifactMetadata> {
        self.store_with_cancel(name, bytes, &CancelToken::new())
            .await
    }

    /// Like [`Self::store`], checking `cancel` before every write.
    ///
    /// A cancelled or failed store never writes the metadata record, and the
    /// chunks it already wrote are deleted again.
    ///
    /// # Errors
    /// Returns `Cancelled` or `StorageUnavailable`.
    pub async fn store_with_cancel(
        &self,
        name: &str,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<ArtifactMetadata> {
        // Readers must not pair old metadata with new chunks.
        let previous = self.metadata(name).await?;
        if previous.is_some() {
            self.store.delete(&metadata_id(name)).await?;
        }

        let chunks = codec::split(bytes, self.chunk_size)?;
        let chunk_count = chunks.len() as u64;
        let stale_count = previous.as_ref().map_or(0, |p| p.chunk_count);

        let mut written = 0u64;
        let outcome = async {
            for (ordinal, payload) in (0u64..).zip(chunks) {
                cancel.check()?;
                self.store
                    .put(Record::Chunk(ChunkRecord {
                        id: chunk_id(name, ordinal),
                        ordinal,
                        payload: payload.to_vec(),
                    }))
                    .await?;
                written = ordinal + 1;
            }
            cancel.check()
        }
        .await;
        if let Err(e) = outcome {
            self.discard_chunks(name, written.max(stale_count)).await;
            return Err(e);
        }

        let metadata = ArtifactMetadata::now(metadata_id(name), chunk_count, bytes.len() as u64);
        if let Err(e) = self.store.put(Record::Metadata(metadata.clone())).await {
            self.discard_chunks(name, chunk_count.max(stale_count)).await;
            return Err(e);
        }

        for ordinal in chunk_count..stale_count {
            self.store.delete(&chunk_id(name, ordinal)).await?;
        }

        info!(
            artifact = name,
            chunks = chunk_count,
            bytes = bytes.len(),
            "stored artifact"
        );
        Ok(metadata)
    }

    /// Best-effort removal of chunk ordinals `0..count` after a failed or
    /// cancelled store.
    async fn discard_chunks(&self, name: &str, count: u64) {
        for ordinal in 0..count {
            if let Err(e) = self.store.delete(&chunk_id(name, ordinal)).await {
                warn!(artifact = name, ordinal, error = %e, "could not discard chunk");
            }
        }
        debug!(artifact = name, chunks = count, "discarded partial artifact");
    }

    /// Reconstruct the artifact stored under `name`.
    ///
    /// Returns `None` when the artifact is absent, incomplete, or the
    /// backend fails; the caller is expected to fall back to the network.
    pub async fn load(&self, name: &str) -> Option<Vec<u8>> {
        match self.try_load(name).await {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                debug!(artifact = name, "artifact not cached");
                None
            }
            Err(e) => {
                warn!(artifact = name, error = %e, "cached artifact unusable, treating as miss");
                None
            }
        }
    }

    async fn try_load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(metadata) = self.metadata(name).await? else {
            return Ok(None);
        };
        let total_size = usize::try_from(metadata.total_size_bytes).map_err(|_| {
            Error::InvalidShape(format!(
                "declared size {} exceeds address space",
                metadata.total_size_bytes
            ))
        })?;

        let mut payloads = Vec::new();
        for ordinal in 0..metadata.chunk_count {
            let id = chunk_id(name, ordinal);
            match self.store.get(&id).await? {
                Some(Record::Chunk(chunk)) if chunk.ordinal == ordinal => {
                    payloads.push(chunk.payload);
                }
                Some(_) => {
                    return Err(Error::Other(format!("record {id} is not chunk {ordinal}")));
                }
                None => {
                    return Err(Error::Other(format!(
                        "chunk {ordinal} of {} missing",
                        metadata.chunk_count
                    )));
                }
            }
        }

        codec::join(&payloads, total_size).map(Some)
    }

    /// Metadata of the artifact stored under `name`, if any.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the backend fails.
    pub async fn metadata(&self, name: &str) -> Result<Option<ArtifactMetadata>> {
        match self.store.get(&metadata_id(name)).await? {
            Some(Record::Metadata(metadata)) => Ok(Some(metadata)),
            Some(Record::Chunk(_)) => {
                warn!(artifact = name, "metadata id holds a chunk record");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Remove the artifact stored under `name`.
    ///
    /// The metadata record goes first, so the artifact reads as absent even
    /// if sweeping its chunks is interrupted.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if a delete fails.
    pub async fn evict(&self, name: &str) -> Result<()> {
        let previous = self.metadata(name).await?;
        self.store.delete(&metadata_id(name)).await?;
        if let Some(metadata) = previous {
            for ordinal in 0..metadata.chunk_count {
                self.store.delete(&chunk_id(name, ordinal)).await?;
            }
            info!(artifact = name, chunks = metadata.chunk_count, "evicted artifact");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn zero_chunk_size_rejected() {
        let err = ArtifactCache::with_chunk_size(MemoryStore::new(), 0)
            .err()
            .expect("zero chunk size must fail");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn record_ids_are_namespaced() {
        assert_eq!(metadata_id("phi3.weights"), "meta:phi3.weights");
        assert_eq!(chunk_id("phi3.weights", 2), "chunk:phi3.weights#2");
        assert_ne!(metadata_id("x#chunk-0"), chunk_id("x", 0));
        assert_ne!(chunk_id("x#1", 0), chunk_id("x", 1));
    }

    #[tokio::test]
    async fn restore_with_fewer_chunks_sweeps_stale_ones() {
        let cache = ArtifactCache::with_chunk_size(MemoryStore::new(), 2).unwrap();
        cache.store("a", &[1, 2, 3, 4, 5]).await.unwrap();
        assert!(cache.backend().contains(&chunk_id("a", 2)));

        cache.store("a", &[9]).await.unwrap();
        assert!(!cache.backend().contains(&chunk_id("a", 1)));
        assert!(!cache.backend().contains(&chunk_id("a", 2)));
        assert_eq!(cache.load("a").await, Some(vec![9]));
    }

    #[tokio::test]
    async fn cancelled_store_leaves_artifact_absent() {
        let cache = ArtifactCache::with_chunk_size(MemoryStore::new(), 2).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = cache
            .store_with_cancel("a", &[1, 2, 3], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(cache.load("a").await, None);
        assert!(cache.backend().is_empty());
    }
}
