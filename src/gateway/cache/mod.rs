//! Response Cache
//!
//! Maps exact prompt text to a timestamped response. An entry is a hit while
//! `now - timestamp < ttl`; every write also prunes entries older than the
//! TTL. Read-modify-write of the store happens inside one critical section
//! so concurrent callers (threads or processes) never lose each other's
//! entries.
//!
//! Two backends share the [`ResponseCache`] trait:
//! - [`JsonFileCache`]: the JSON object file, guarded by an advisory lock
//! - [`SqliteCache`]: transactional upsert and prune in SQLite

mod json_file;
mod sqlite;

pub use json_file::JsonFileCache;
pub use sqlite::SqliteCache;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::{CacheBackend, CacheConfig};
use crate::types::{ErrorCategory, LlmError, Result};

/// Cached outcome of one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Seconds since the Unix epoch when the entry was written
    pub timestamp: f64,
    /// Generated text, or the rendered error string
    pub response: String,
    /// Set when `response` is a rendered routine error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCategory>,
}

impl CacheEntry {
    /// Successful response stamped with the current time
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            timestamp: epoch_secs(),
            response: text.into(),
            error: None,
        }
    }

    /// Routine error stamped with the current time
    pub fn error(err: &LlmError) -> Self {
        Self {
            timestamp: epoch_secs(),
            response: err.render(),
            error: Some(err.category),
        }
    }

    /// Same entry with an explicit timestamp
    pub fn at(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Still usable as a hit
    pub fn is_fresh(&self, now: f64, ttl: Duration) -> bool {
        now - self.timestamp < ttl.as_secs_f64()
    }

    /// Removed by the next prune pass
    pub fn is_expired(&self, now: f64, ttl: Duration) -> bool {
        now - self.timestamp > ttl.as_secs_f64()
    }

    /// Replay the cached outcome
    pub fn into_result(self) -> Result<String> {
        match self.error {
            None => Ok(self.response),
            Some(category) => Err(LlmError::from_rendered(category, &self.response).into()),
        }
    }
}

/// Entry counts for `codetutor cache stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub fresh: usize,
    pub expired: usize,
    /// Values that are not timestamped records (never hits, never pruned)
    pub legacy: usize,
}

/// Persistent prompt → response store
///
/// Implementations block; async callers go through `spawn_blocking`.
pub trait ResponseCache: Send + Sync {
    /// Fresh entry for `prompt`, if any
    fn get(&self, prompt: &str) -> Result<Option<CacheEntry>>;

    /// Store `entry` under `prompt` and prune expired entries in the same
    /// critical section. Returns the number of entries pruned.
    fn put(&self, prompt: &str, entry: CacheEntry) -> Result<usize>;

    /// Remove expired entries, returning how many were removed
    fn prune(&self) -> Result<usize>;

    /// Remove every entry, returning how many were removed
    fn clear(&self) -> Result<usize>;

    fn stats(&self) -> Result<CacheStats>;

    /// Entry validity window
    fn ttl(&self) -> Duration;

    /// Human-readable location for diagnostics
    fn location(&self) -> String;
}

pub type SharedCache = Arc<dyn ResponseCache>;

/// Open the backend selected by configuration
pub fn open_cache(config: &CacheConfig) -> Result<SharedCache> {
    let ttl = Duration::from_secs(config.ttl_secs);
    let path = config.resolved_path();
    let cache: SharedCache = match config.backend {
        CacheBackend::Json => Arc::new(JsonFileCache::new(&path, ttl)),
        CacheBackend::Sqlite => Arc::new(SqliteCache::open(&path, ttl)?),
    };
    Ok(cache)
}

/// Current time as fractional seconds since the Unix epoch
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
