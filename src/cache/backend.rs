//! Cache storage backends.
//!
//! Both engines expose the same get/set-with-expiry contract: a lock-free
//! in-memory map for hot reads and a SQLite store for durable, queryable
//! history. The cache layer on top treats them interchangeably.

use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

/// One stored cache entry: a JSON payload plus the bookkeeping the staleness
/// rules need.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub payload: String,
    pub written_at: DateTime<Utc>,
    /// Source modification timestamp captured at write time.
    pub freshness_token: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Key-value store with per-entry expiry, keyed by (namespace, key).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>, CacheError>;
    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<(), CacheError>;
}

/// Lock-free in-memory backend. Expired entries are dropped on read.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<(String, String), StoredEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all expired entries. Callers may run this periodically to bound
    /// memory growth.
    pub fn prune(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let map_key = (namespace.to_string(), key.to_string());
        let entry = match self.entries.get(&map_key) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        if entry.is_expired(Utc::now()) {
            drop(self.entries.remove(&map_key));
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        self.entries
            .insert((namespace.to_string(), key.to_string()), entry);
        Ok(())
    }
}

/// SQLite-backed durable backend.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Create or open the cache database at `~/.config/drivescope/cache.db`.
    pub fn new() -> Result<Self, CacheError> {
        let db_path = dirs::config_dir()
            .map(|d| d.join("drivescope").join("cache.db"))
            .ok_or_else(|| CacheError::Backend("no config directory".to_string()))?;
        Self::open(&db_path)
    }

    /// Create or open a cache database at an explicit path.
    pub fn open(db_path: &PathBuf) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Backend(format!("create dir: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                written_at TEXT NOT NULL,
                freshness_token TEXT,
                expires_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires
                ON cache_entries(expires_at);
        "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete rows past their expiry. Returns the number removed.
    pub fn prune(&self) -> Result<usize, CacheError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at < ?",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(removed)
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT payload, written_at, freshness_token, expires_at
                 FROM cache_entries WHERE namespace = ? AND key = ?",
                params![namespace, key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let (payload, written_at, freshness_token, expires_at) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| CacheError::Backend(format!("bad timestamp: {}", e)))
        };

        Ok(Some(StoredEntry {
            payload,
            written_at: parse(&written_at)?,
            freshness_token: freshness_token.as_deref().map(parse).transpose()?,
            expires_at: parse(&expires_at)?,
        }))
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO cache_entries (namespace, key, payload, written_at, freshness_token, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(namespace, key) DO UPDATE SET
                payload = excluded.payload,
                written_at = excluded.written_at,
                freshness_token = excluded.freshness_token,
                expires_at = excluded.expires_at
            "#,
            params![
                namespace,
                key,
                entry.payload,
                entry.written_at.to_rfc3339(),
                entry.freshness_token.map(|t| t.to_rfc3339()),
                entry.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn entry(payload: &str, ttl_secs: i64) -> StoredEntry {
        let now = Utc::now();
        StoredEntry {
            payload: payload.to_string(),
            written_at: now,
            freshness_token: Some(now),
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let backend = MemoryBackend::new();
        backend.set("metadata", "u:f1", entry("{}", 60)).await.unwrap();

        let got = backend.get("metadata", "u:f1").await.unwrap().unwrap();
        assert_eq!(got.payload, "{}");

        assert!(backend.get("analysis", "u:f1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_expiry_drops_entry() {
        let backend = MemoryBackend::new();
        backend.set("metadata", "k", entry("x", -1)).await.unwrap();
        assert!(backend.get("metadata", "k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::open(&dir.path().join("cache.db")).unwrap();

        backend
            .set("analysis", "u:f1:sharing", entry("first", 60))
            .await
            .unwrap();
        backend
            .set("analysis", "u:f1:sharing", entry("second", 60))
            .await
            .unwrap();

        let got = backend.get("analysis", "u:f1:sharing").await.unwrap().unwrap();
        assert_eq!(got.payload, "second");
        assert!(got.freshness_token.is_some());
    }

    #[tokio::test]
    async fn test_sqlite_prune() {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::open(&dir.path().join("cache.db")).unwrap();

        backend.set("metadata", "old", entry("x", -10)).await.unwrap();
        backend.set("metadata", "new", entry("y", 60)).await.unwrap();

        assert_eq!(backend.prune().unwrap(), 1);
        assert!(backend.get("metadata", "new").await.unwrap().is_some());
    }
}
