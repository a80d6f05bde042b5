/// Durable key-value storage with a capacity ceiling
///
/// The library never assumes a write succeeds: every backend enforces a
/// byte quota (keys plus values) and offers a probe that reports whether a
/// value would fit without committing it.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded writing '{key}': {required} bytes needed, {quota} allowed")]
    QuotaExceeded {
        key: String,
        required: usize,
        quota: usize,
    },

    #[error("'{key}' ({bytes} bytes) would not fit in the remaining storage")]
    WouldExceedQuota { key: String, bytes: usize },

    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("failed to prepare storage directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A string-to-string store shared by every persisted collection
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, failing with `QuotaExceeded` when the
    /// store would grow past its ceiling.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    /// Whether `value` would fit under `key`. Leaves the store unchanged.
    fn can_persist(&mut self, key: &str, value: &str) -> Result<bool, StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn can_persist(&mut self, key: &str, value: &str) -> Result<bool, StorageError> {
        (**self).can_persist(key, value)
    }
}

/// In-process store, optionally capped
///
/// Used as a test double and for ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    capacity: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: Some(bytes),
        }
    }

    /// Bytes currently used by keys and values
    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Bytes the store would use after replacing `key` with `value`
    fn projected_bytes(&self, key: &str, value: &str) -> usize {
        let replaced = self.entries.get(key).map_or(0, |old| key.len() + old.len());
        self.used_bytes() - replaced + key.len() + value.len()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let required = self.projected_bytes(key, value);
        if let Some(quota) = self.capacity {
            if required > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    required,
                    quota,
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn can_persist(&mut self, key: &str, value: &str) -> Result<bool, StorageError> {
        Ok(self
            .capacity
            .map_or(true, |quota| self.projected_bytes(key, value) <= quota))
    }
}

/// SQLite-backed store
///
/// All keys live in a single `kv` table. Writes run inside a transaction
/// that is rolled back when the table grows past the quota, which also
/// gives `can_persist` a real try-write/rollback probe.
pub struct SqliteStore {
    conn: Connection,
    db_path: Option<PathBuf>,
    quota: usize,
}

impl SqliteStore {
    /// Open or create the store at `db_path`, creating parent directories
    pub fn open(db_path: &Path, quota: usize) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(db_path)?;
        tracing::info!(path = %db_path.display(), quota, "storage opened");

        let store = Self {
            conn,
            db_path: Some(db_path.to_path_buf()),
            quota,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Store that lives only as long as the connection
    pub fn open_in_memory(quota: usize) -> Result<Self, StorageError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            db_path: None,
            quota,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Path to the database file, if any
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Bytes currently used by keys and values
    pub fn used_bytes(&self) -> Result<usize, StorageError> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as usize)
    }

    /// Upsert inside a transaction and check the quota.
    ///
    /// Returns the projected size and whether it fits. The write is only
    /// committed when it fits and `commit` is set.
    fn write_checked(
        &mut self,
        key: &str,
        value: &str,
        commit: bool,
    ) -> Result<(usize, bool), StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, chrono::Utc::now().timestamp()],
        )?;
        let used: i64 = tx.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        let used = used.max(0) as usize;
        let fits = used <= self.quota;

        if fits && commit {
            tx.commit()?;
        } else {
            tx.rollback()?;
        }
        Ok((used, fits))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let (required, fits) = self.write_checked(key, value, true)?;
        if !fits {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                required,
                quota: self.quota,
            });
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn can_persist(&mut self, key: &str, value: &str) -> Result<bool, StorageError> {
        let (_, fits) = self.write_checked(key, value, false)?;
        Ok(fits)
    }
}

// Implement Debug without dumping the connection
impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("quota", &self.quota)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_enforces_capacity() {
        let mut store = MemoryStore::with_capacity(10);
        store.set("a", "1234").unwrap();
        assert_eq!(store.used_bytes(), 5);

        let err = store.set("b", "123456").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { required: 12, quota: 10, .. }));
        assert_eq!(store.get("b").unwrap(), None);

        // Replacing a value only counts the new size
        store.set("a", "123456789").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("123456789"));
    }

    #[test]
    fn test_memory_probe_does_not_write() {
        let mut store = MemoryStore::with_capacity(8);
        assert!(store.can_persist("k", "1234567").unwrap());
        assert!(!store.can_persist("k", "12345678").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_roundtrip_and_remove() {
        let mut store = SqliteStore::open_in_memory(1024).unwrap();
        store.set("lumio_presets_v1", "[]").unwrap();
        store.set("lumio_presets_v1", "[1]").unwrap();
        assert_eq!(store.get("lumio_presets_v1").unwrap().as_deref(), Some("[1]"));

        store.remove("lumio_presets_v1").unwrap();
        assert_eq!(store.get("lumio_presets_v1").unwrap(), None);
        assert_eq!(store.used_bytes().unwrap(), 0);
    }

    #[test]
    fn test_sqlite_quota_rolls_back() {
        let mut store = SqliteStore::open_in_memory(20).unwrap();
        store.set("a", "0123456789").unwrap();

        let err = store.set("b", "0123456789").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.get("a").unwrap().as_deref(), Some("0123456789"));
    }

    #[test]
    fn test_sqlite_probe_leaves_store_unchanged() {
        let mut store = SqliteStore::open_in_memory(64).unwrap();
        store.set("a", "old").unwrap();

        assert!(store.can_persist("a", "new").unwrap());
        assert!(!store.can_persist("a", &"x".repeat(100)).unwrap());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("old"));
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lumio.db");

        {
            let mut store = SqliteStore::open(&path, 4096).unwrap();
            store.set("lumio_current_project", "\"p1\"").unwrap();
        }

        let store = SqliteStore::open(&path, 4096).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(
            store.get("lumio_current_project").unwrap().as_deref(),
            Some("\"p1\"")
        );
    }
}
