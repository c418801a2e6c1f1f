//! SQLite-backed record store.
//!
//! One table, one row per record. Metadata rows fill `chunk_count`,
//! `total_size_bytes` and `created_at`; chunk rows fill `ordinal` and
//! `payload`. Blocking SQLite calls run on the tokio blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use kiln::{Error, Result};

use super::{ArtifactMetadata, ChunkRecord, Record, RecordStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id               TEXT PRIMARY KEY NOT NULL,
    chunk_count      INTEGER,
    total_size_bytes INTEGER,
    created_at       INTEGER,
    ordinal          INTEGER,
    payload          BLOB
);
";

struct Inner {
    conn: Connection,
    schema_ready: bool,
}

/// Durable store in a single SQLite file.
///
/// The schema is provisioned on first use; provisioning is idempotent.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Mutex<Inner>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StorageUnavailable(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(storage_err)?;
        debug!(path = %path.display(), "opened artifact database");
        Ok(Self::from_connection(conn))
    }

    /// A private in-memory database, gone when the store is dropped.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                schema_ready: false,
            })),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| Error::StorageUnavailable("sqlite connection lock poisoned".into()))?;
            if !guard.schema_ready {
                guard.conn.execute_batch(SCHEMA).map_err(storage_err)?;
                guard.schema_ready = true;
            }
            f(&guard.conn)
        })
        .await
        .map_err(|e| Error::StorageUnavailable(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn put(&self, record: Record) -> Result<()> {
        self.with_conn(move |conn| {
            let written = match &record {
                Record::Metadata(m) => conn.execute(
                    "INSERT OR REPLACE INTO records
                         (id, chunk_count, total_size_bytes, created_at, ordinal, payload)
                     VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
                    params![
                        m.id,
                        to_sql_int(m.chunk_count)?,
                        to_sql_int(m.total_size_bytes)?,
                        m.created_at
                    ],
                ),
                Record::Chunk(c) => conn.execute(
                    "INSERT OR REPLACE INTO records
                         (id, chunk_count, total_size_bytes, created_at, ordinal, payload)
                     VALUES (?1, NULL, NULL, NULL, ?2, ?3)",
                    params![c.id, to_sql_int(c.ordinal)?, c.payload],
                ),
            };
            written.map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT chunk_count, total_size_bytes, created_at, ordinal, payload
                     FROM records WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(RawRow {
                            chunk_count: row.get(0)?,
                            total_size_bytes: row.get(1)?,
                            created_at: row.get(2)?,
                            ordinal: row.get(3)?,
                            payload: row.get(4)?,
                        })
                    },
                )
                .optional()
                .map_err(storage_err)?;
            row.map(|raw| raw.into_record(id)).transpose()
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM records WHERE id = ?1", params![id])
                .map_err(storage_err)?;
            Ok(())
        })
        .await
    }
}

struct RawRow {
    chunk_count: Option<i64>,
    total_size_bytes: Option<i64>,
    created_at: Option<i64>,
    ordinal: Option<i64>,
    payload: Option<Vec<u8>>,
}

impl RawRow {
    fn into_record(self, id: String) -> Result<Record> {
        match self {
            Self {
                ordinal: Some(ordinal),
                payload: Some(payload),
                ..
            } => Ok(Record::Chunk(ChunkRecord {
                id,
                ordinal: from_sql_int(ordinal)?,
                payload,
            })),
            Self {
                chunk_count: Some(chunk_count),
                total_size_bytes: Some(total_size_bytes),
                created_at,
                ..
            } => Ok(Record::Metadata(ArtifactMetadata {
                id,
                chunk_count: from_sql_int(chunk_count)?,
                total_size_bytes: from_sql_int(total_size_bytes)?,
                created_at: created_at.unwrap_or_default(),
            })),
            _ => Err(Error::StorageUnavailable(format!(
                "record {id} has neither chunk nor metadata fields"
            ))),
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn storage_err(e: rusqlite::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

fn to_sql_int(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::StorageUnavailable(format!("{value} does not fit in an SQLite integer")))
}

fn from_sql_int(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::StorageUnavailable(format!("negative size field {value} in store")))
}
