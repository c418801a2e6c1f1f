//! Kiln Store: persistence and retrieval of oversized model artifacts
//!
//! # Architecture
//!
//! ```text
//! ArtifactLoader           ← cache hit, or parallel fetch then cache
//!   ├── ArtifactCache<S>   ← one metadata record + N chunk records per artifact
//!   │     ├── codec        ← split / join, pure
//!   │     └── S: RecordStore  ← put / get / delete of single records
//!   └── ArtifactFetcher    ← all-or-nothing parallel HTTP GETs
//! ```

pub mod cache;
pub mod codec;
pub mod fetch;
pub mod loader;
pub mod store;

pub use cache::{ArtifactCache, DEFAULT_CHUNK_SIZE};
pub use fetch::ArtifactFetcher;
pub use loader::{ArtifactLoader, ArtifactOrigin, ModelArtifacts, ModelSource};
pub use store::{ArtifactMetadata, ChunkRecord, MemoryStore, Record, RecordStore, SqliteStore};
