//! Durable cache partitions backed by SQLite.
//!
//! A partition is a named key→response map for one resource class of one
//! generation. Writes replace the row for their key atomically; readers
//! never observe a partial entry.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA_VERSION: i64 = 1;

const ACTIVE_VERSION_KEY: &str = "active_generation";

/// One cached response. Headers are stored as a JSON array of pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: i64,
}

pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache database at {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure_pragmas()?;
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory cache")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure_pragmas()?;
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
            )
            .context("failed to configure cache pragmas")?;
        debug!("cache pragmas configured");
        Ok(())
    }

    fn initialize_schema(&self) -> Result<()> {
        let current: i64 = self
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .context("failed to read cache schema version")?;

        if current == 0 {
            self.conn()
                .execute_batch(
                    "CREATE TABLE IF NOT EXISTS entries (
                    partition TEXT NOT NULL,
                    key TEXT NOT NULL,
                    status INTEGER NOT NULL,
                    headers TEXT NOT NULL,
                    body BLOB NOT NULL,
                    stored_at INTEGER NOT NULL,
                    PRIMARY KEY (partition, key)
                );
                CREATE INDEX IF NOT EXISTS idx_entries_key ON entries(key);

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
                )
                .context("failed to create cache schema")?;
            self.conn()
                .pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("failed to set cache schema version")?;
            info!("created cache schema v{SCHEMA_VERSION}");
        }
        Ok(())
    }

    /// Store one response, replacing any previous entry for the key.
    pub fn put(&self, partition: &str, key: &str, response: &StoredResponse) -> Result<()> {
        let headers = serde_json::to_string(&response.headers)?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO entries (partition, key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    partition,
                    key,
                    response.status,
                    headers,
                    response.body,
                    response.stored_at
                ],
            )
            .context("failed to store cache entry")?;
        Ok(())
    }

    /// Store a batch of responses in one transaction. Either every entry
    /// lands or none does; a failed shell install leaves no partition behind.
    pub fn put_all(&self, partition: &str, entries: &[(String, StoredResponse)]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (key, response) in entries {
            let headers = serde_json::to_string(&response.headers)?;
            tx.execute(
                "INSERT OR REPLACE INTO entries (partition, key, status, headers, body, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    partition,
                    key,
                    response.status,
                    headers,
                    response.body,
                    response.stored_at
                ],
            )?;
        }
        tx.commit().context("failed to commit shell entries")?;
        Ok(())
    }

    /// Look up a key within one partition.
    pub fn get(&self, partition: &str, key: &str) -> Option<StoredResponse> {
        self.conn()
            .query_row(
                "SELECT status, headers, body, stored_at FROM entries
             WHERE partition = ?1 AND key = ?2",
                params![partition, key],
                row_to_response,
            )
            .optional()
            .ok()
            .flatten()
    }

    /// Look up a key across every partition, static partitions first. This is
    /// the fallback-chain lookup: any generation's copy beats no copy.
    pub fn lookup(&self, key: &str) -> Option<StoredResponse> {
        self.conn()
            .query_row(
                "SELECT status, headers, body, stored_at FROM entries
             WHERE key = ?1
             ORDER BY partition LIKE '%-static-%' DESC, stored_at DESC
             LIMIT 1",
                params![key],
                row_to_response,
            )
            .optional()
            .ok()
            .flatten()
    }

    /// Names of every partition currently holding entries.
    pub fn partition_names(&self) -> Vec<String> {
        let conn = self.conn();
        let mut stmt = match conn.prepare("SELECT DISTINCT partition FROM entries ORDER BY partition")
        {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        stmt.query_map([], |row| row.get::<_, String>(0))
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// Delete every partition whose name is not in the keep-set. Returns the
    /// names that were removed.
    pub fn delete_partitions_except(&self, keep: &[String]) -> Result<Vec<String>> {
        let removed: Vec<String> = self
            .partition_names()
            .into_iter()
            .filter(|name| !keep.contains(name))
            .collect();
        let conn = self.conn();
        for name in &removed {
            conn.execute("DELETE FROM entries WHERE partition = ?1", params![name])
                .context("failed to delete stale partition")?;
        }
        Ok(removed)
    }

    pub fn entry_count(&self, partition: &str) -> usize {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE partition = ?1",
                params![partition],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize
    }

    /// Version recorded as the active generation. The cache worker is the
    /// only writer.
    pub fn active_version(&self) -> Option<String> {
        self.conn()
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![ACTIVE_VERSION_KEY],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten()
    }

    pub fn set_active_version(&self, version: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![ACTIVE_VERSION_KEY, version],
            )
            .context("failed to record active generation")?;
        Ok(())
    }
}

fn row_to_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredResponse> {
    let headers_json: String = row.get(1)?;
    Ok(StoredResponse {
        status: row.get::<_, i64>(0)? as u16,
        headers: serde_json::from_str(&headers_json).unwrap_or_default(),
        body: row.get(2)?,
        stored_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> StoredResponse {
        StoredResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: body.as_bytes().to_vec(),
            stored_at: 1_000,
        }
    }

    #[test]
    fn put_get_overwrite() {
        let store = CacheStore::open_in_memory().unwrap();
        store.put("p1", "/k", &response("v1")).unwrap();
        assert_eq!(store.get("p1", "/k").unwrap().body, b"v1");

        store.put("p1", "/k", &response("v2")).unwrap();
        assert_eq!(store.get("p1", "/k").unwrap().body, b"v2");
        assert_eq!(store.entry_count("p1"), 1);
    }

    #[test]
    fn lookup_prefers_static_partitions() {
        let store = CacheStore::open_in_memory().unwrap();
        store
            .put("snackshop-dynamic-1", "/k", &response("dynamic"))
            .unwrap();
        store
            .put("snackshop-static-1", "/k", &response("static"))
            .unwrap();
        assert_eq!(store.lookup("/k").unwrap().body, b"static");
        assert!(store.lookup("/missing").is_none());
    }

    #[test]
    fn put_all_is_transactional() {
        let store = CacheStore::open_in_memory().unwrap();
        let entries = vec![
            ("/a".to_string(), response("a")),
            ("/b".to_string(), response("b")),
        ];
        store.put_all("p1", &entries).unwrap();
        assert_eq!(store.entry_count("p1"), 2);
    }

    #[test]
    fn delete_partitions_except_keeps_only_named() {
        let store = CacheStore::open_in_memory().unwrap();
        store.put("snackshop-static-1", "/a", &response("a")).unwrap();
        store.put("snackshop-dynamic-1", "/b", &response("b")).unwrap();
        store.put("snackshop-static-2", "/c", &response("c")).unwrap();

        let keep = vec![
            "snackshop-static-2".to_string(),
            "snackshop-dynamic-2".to_string(),
        ];
        let removed = store.delete_partitions_except(&keep).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.partition_names(), vec!["snackshop-static-2"]);
    }

    #[test]
    fn active_version_roundtrip() {
        let store = CacheStore::open_in_memory().unwrap();
        assert!(store.active_version().is_none());
        store.set_active_version("2.0.0").unwrap();
        assert_eq!(store.active_version().as_deref(), Some("2.0.0"));
        store.set_active_version("2.1.0").unwrap();
        assert_eq!(store.active_version().as_deref(), Some("2.1.0"));
    }
}
