//! SQLite Cache Backend
//!
//! Rows are keyed by the SHA-256 of the prompt; the prompt itself is stored
//! alongside and compared on lookup. Upsert and prune run in one
//! `IMMEDIATE` transaction, so concurrent writers serialize on SQLite's
//! write lock instead of a sidecar file.

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{CacheEntry, CacheStats, ResponseCache, epoch_secs};
use crate::types::{ErrorCategory, Result, ResultExt, TutorError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS llm_cache (
    key        TEXT PRIMARY KEY,
    prompt     TEXT NOT NULL,
    response   TEXT NOT NULL,
    error      TEXT,
    created_at REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_llm_cache_created_at ON llm_cache(created_at);
"#;

const POOL_SIZE: u32 = 4;

pub struct SqliteCache {
    pool: Pool<SqliteConnectionManager>,
    ttl: Duration,
    location: String,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(Self::configure_connection);
        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .build(manager)
            .map_err(|e| TutorError::Cache(format!("Failed to create connection pool: {}", e)))?;

        let cache = Self {
            pool,
            ttl,
            location: path.display().to_string(),
        };
        cache.initialize()?;
        Ok(cache)
    }

    /// In-memory cache for tests and one-shot runs
    pub fn open_in_memory(ttl: Duration) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .map_err(|e| TutorError::Cache(format!("Failed to create in-memory pool: {}", e)))?;

        let cache = Self {
            pool,
            ttl,
            location: ":memory:".to_string(),
        };
        cache.initialize()?;
        Ok(cache)
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| TutorError::Cache(format!("Failed to acquire cache connection: {}", e)))
    }

    fn initialize(&self) -> Result<()> {
        self.conn()?
            .execute_batch(SCHEMA)
            .with_context("Failed to initialize cache schema")
    }

    fn prune_expired(&self, conn: &Connection, now: f64) -> Result<usize> {
        let pruned = conn.execute(
            "DELETE FROM llm_cache WHERE ?1 - created_at > ?2",
            params![now, self.ttl.as_secs_f64()],
        )?;
        Ok(pruned)
    }
}

fn prompt_key(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn encode_category(category: Option<ErrorCategory>) -> Result<Option<String>> {
    Ok(match category {
        Some(category) => Some(serde_json::to_string(&category)?),
        None => None,
    })
}

fn decode_category(raw: Option<String>) -> Option<ErrorCategory> {
    raw.and_then(|raw| serde_json::from_str(&raw).ok())
}

impl ResponseCache for SqliteCache {
    fn get(&self, prompt: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT prompt, response, error, created_at FROM llm_cache WHERE key = ?1",
                params![prompt_key(prompt)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                },
            )
            .optional()?;

        let now = epoch_secs();
        Ok(row
            .filter(|(stored_prompt, ..)| stored_prompt == prompt)
            .map(|(_, response, error, timestamp)| CacheEntry {
                timestamp,
                response,
                error: decode_category(error),
            })
            .filter(|entry| entry.is_fresh(now, self.ttl)))
    }

    fn put(&self, prompt: &str, entry: CacheEntry) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .with_context("Failed to start cache transaction")?;

        tx.execute(
            r#"
            INSERT INTO llm_cache (key, prompt, response, error, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
                prompt = excluded.prompt,
                response = excluded.response,
                error = excluded.error,
                created_at = excluded.created_at
            "#,
            params![
                prompt_key(prompt),
                prompt,
                entry.response,
                encode_category(entry.error)?,
                entry.timestamp
            ],
        )?;
        let pruned = self.prune_expired(&tx, epoch_secs())?;

        tx.commit().with_context("Failed to commit cache transaction")?;
        debug!("Cached response in {} ({} pruned)", self.location, pruned);
        Ok(pruned)
    }

    fn prune(&self) -> Result<usize> {
        let conn = self.conn()?;
        self.prune_expired(&conn, epoch_secs())
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM llm_cache", [])?)
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn()?;
        let now = epoch_secs();
        let ttl = self.ttl.as_secs_f64();

        let (entries, fresh, expired) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN ?1 - created_at < ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN ?1 - created_at > ?2 THEN 1 ELSE 0 END), 0)
            FROM llm_cache
            "#,
            params![now, ttl],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        Ok(CacheStats {
            entries: entries as usize,
            fresh: fresh as usize,
            expired: expired as usize,
            legacy: 0,
        })
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LlmError;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(600);

    #[test]
    fn test_put_then_get() {
        let cache = SqliteCache::open_in_memory(TTL).unwrap();
        assert!(cache.get("p").unwrap().is_none());

        cache.put("p", CacheEntry::response("r")).unwrap();
        assert_eq!(cache.get("p").unwrap().unwrap().response, "r");

        // Upsert replaces
        cache.put("p", CacheEntry::response("r2")).unwrap();
        assert_eq!(cache.get("p").unwrap().unwrap().response, "r2");
        assert_eq!(cache.stats().unwrap().entries, 1);
    }

    #[test]
    fn test_error_entries_keep_category() {
        let cache = SqliteCache::open_in_memory(TTL).unwrap();
        let err = LlmError::new(ErrorCategory::RateLimit, "slow down");
        cache.put("p", CacheEntry::error(&err)).unwrap();

        let entry = cache.get("p").unwrap().unwrap();
        assert_eq!(entry.error, Some(ErrorCategory::RateLimit));
        assert_eq!(entry.response, "Error: slow down");
    }

    #[test]
    fn test_expired_entries_pruned_on_write() {
        let cache = SqliteCache::open_in_memory(TTL).unwrap();
        let old = epoch_secs() - 601.0;

        assert_eq!(cache.put("old", CacheEntry::response("x").at(old)).unwrap(), 1);
        assert!(cache.get("old").unwrap().is_none());

        cache.put("new", CacheEntry::response("y")).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.fresh, 1);
        assert_eq!(cache.clear().unwrap(), 1);
    }

    #[test]
    fn test_file_backed_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache/llm_cache.db");

        SqliteCache::open(&path, TTL)
            .unwrap()
            .put("p", CacheEntry::response("kept"))
            .unwrap();

        let reopened = SqliteCache::open(&path, TTL).unwrap();
        assert_eq!(reopened.get("p").unwrap().unwrap().response, "kept");
    }

    #[test]
    fn test_prompt_key_is_stable() {
        assert_eq!(prompt_key("hello"), prompt_key("hello"));
        assert_ne!(prompt_key("hello"), prompt_key("hello "));
        assert_eq!(prompt_key("hello").len(), 64);
    }
}
