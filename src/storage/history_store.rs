//! Durable key → history record store
//!
//! Records are keyed by persistence key (the URI's SURT form) and kept in
//! lexical key order, so a scan visits all URIs of a domain together.
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────────────┐
//! │ PersistLoadProcessor │──get──▶│                              │
//! ├──────────────────────┤        │  HistoryStore                │
//! │ PersistStoreProcessor│──put──▶│  (SQLite env / in-memory)    │
//! ├──────────────────────┤        │                              │
//! │ preload()            │──put──▶│                              │
//! └──────────────────────┘        └──────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::record::AttributeRecord;
use crate::utils::error::StoreError;

/// File holding the store inside an environment directory
pub const STORE_FILE_NAME: &str = "uri_history.sqlite";

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Store Trait
// ============================================================================

/// Persistent sorted map of persistence key → history record
///
/// Implementations provide their own concurrency control. `close()` is a
/// shutdown operation; any call after it fails with [`StoreError::Closed`].
pub trait HistoryStore: Send + Sync {
    /// Stored record for `key`, if any
    fn get(&self, key: &str) -> StoreResult<Option<AttributeRecord>>;

    /// Insert or replace the record for `key`
    fn put(&self, key: &str, record: &AttributeRecord) -> StoreResult<()>;

    /// Visit every record in ascending key order, returning the count visited
    ///
    /// Records that fail to decode are logged and skipped.
    fn scan(&self, visit: &mut dyn FnMut(&str, AttributeRecord)) -> StoreResult<usize>;

    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush pending writes to durable storage
    fn sync(&self) -> StoreResult<()>;

    /// Sync and release the store
    fn close(&self) -> StoreResult<()>;
}

fn encode(record: &AttributeRecord) -> StoreResult<String> {
    Ok(serde_json::to_string(record)?)
}

fn decode(key: &str, raw: &str) -> Option<AttributeRecord> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(key, error = %e, "Skipping undecodable history record");
            None
        }
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite-backed store living in an environment directory
pub struct SqliteHistoryStore {
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
}

impl SqliteHistoryStore {
    /// Open or create the store environment at `env_dir`
    pub fn open(env_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let env_dir = env_dir.as_ref();
        std::fs::create_dir_all(env_dir)?;
        let path = env_dir.join(STORE_FILE_NAME);

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::with_connection(conn, Some(path.clone()))?;
        tracing::info!(
            path = %path.display(),
            records = store.len()?,
            "History store opened"
        );
        Ok(store)
    }

    /// Open the store of a prior engagement, failing if none exists there
    pub fn open_existing(env_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let env_dir = env_dir.as_ref();
        let path = env_dir.join(STORE_FILE_NAME);
        if !path.is_file() {
            return Err(StoreError::InvalidEnvironment {
                path: env_dir.display().to_string(),
                reason: format!("no {STORE_FILE_NAME} present"),
            });
        }
        Self::open(env_dir)
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS uri_history (
                    key TEXT PRIMARY KEY,
                    record TEXT NOT NULL
                ) WITHOUT ROWID;
                "#,
        )?;
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard: MutexGuard<'_, Option<Connection>> =
            self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<AttributeRecord>> {
        let raw: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT record FROM uri_history WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        Ok(raw.and_then(|raw| decode(key, &raw)))
    }

    fn put(&self, key: &str, record: &AttributeRecord) -> StoreResult<()> {
        let raw = encode(record)?;
        self.with_conn(|conn| {
            conn.execute(
                r#"
                    INSERT INTO uri_history (key, record) VALUES (?1, ?2)
                    ON CONFLICT(key) DO UPDATE SET record = excluded.record
                    "#,
                params![key, raw],
            )?;
            Ok(())
        })
    }

    fn scan(&self, visit: &mut dyn FnMut(&str, AttributeRecord)) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, record FROM uri_history ORDER BY key")?;
            let mut rows = stmt.query([])?;
            let mut visited = 0;
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let raw: String = row.get(1)?;
                if let Some(record) = decode(&key, &raw) {
                    visit(&key, record);
                    visited += 1;
                }
            }
            Ok(visited)
        })
    }

    fn len(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM uri_history", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    fn sync(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            if self.path.is_some() {
                conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))?;
            }
            Ok(())
        })
    }

    fn close(&self) -> StoreResult<()> {
        self.sync()?;
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.take().ok_or(StoreError::Closed)?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        tracing::info!(
            path = %self.path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
            "History store closed"
        );
        Ok(())
    }
}

// ============================================================================
// Memory Implementation (for testing)
// ============================================================================

/// Ordered in-memory store
///
/// Records pass through the same encoding as the SQLite store, so records
/// holding streams or opaque objects are refused identically.
pub struct MemoryHistoryStore {
    records: Mutex<Option<BTreeMap<String, String>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Some(BTreeMap::new())),
        }
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let records = guard.as_mut().ok_or(StoreError::Closed)?;
        f(records)
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<AttributeRecord>> {
        self.with_records(|records| Ok(records.get(key).and_then(|raw| decode(key, raw))))
    }

    fn put(&self, key: &str, record: &AttributeRecord) -> StoreResult<()> {
        let raw = encode(record)?;
        self.with_records(|records| {
            records.insert(key.to_string(), raw);
            Ok(())
        })
    }

    fn scan(&self, visit: &mut dyn FnMut(&str, AttributeRecord)) -> StoreResult<usize> {
        self.with_records(|records| {
            let mut visited = 0;
            for (key, raw) in records.iter() {
                if let Some(record) = decode(key, raw) {
                    visit(key, record);
                    visited += 1;
                }
            }
            Ok(visited)
        })
    }

    fn len(&self) -> StoreResult<usize> {
        self.with_records(|records| Ok(records.len()))
    }

    fn sync(&self) -> StoreResult<()> {
        self.with_records(|_| Ok(()))
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.take().map(|_| ()).ok_or(StoreError::Closed)
    }
}
