//! JSON File Cache
//!
//! One JSON object per file: `{ "<prompt>": {"timestamp": f64, "response": str} }`.
//! Readers take a shared lock and writers an exclusive lock on a `<file>.lock`
//! sidecar, so the whole load → insert → prune → save cycle is serialized
//! across threads and processes. Saves go through a temp file and rename.
//!
//! Values that are not timestamped records (older bare-string entries) are
//! never returned as hits and are left in place by pruning.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{CacheEntry, CacheStats, ResponseCache, epoch_secs};
use crate::constants::cache::LOCK_SUFFIX;
use crate::types::{Result, ResultExt};

type Store = Map<String, Value>;

pub struct JsonFileCache {
    path: PathBuf,
    lock_path: PathBuf,
    ttl: Duration,
}

impl JsonFileCache {
    pub fn new(path: impl AsRef<Path>, ttl: Duration) -> Self {
        let path = path.as_ref().to_path_buf();
        let lock_path = sibling(&path, LOCK_SUFFIX);
        Self {
            path,
            lock_path,
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the sidecar lock; released when the returned handle drops
    fn lock(&self, exclusive: bool) -> Result<File> {
        if let Some(parent) = self.lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context_fn(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context_fn(|| format!("Failed to open {}", self.lock_path.display()))?;

        let locked = if exclusive {
            file.lock()
        } else {
            file.lock_shared()
        };
        locked.with_context_fn(|| format!("Failed to lock {}", self.lock_path.display()))?;

        Ok(file)
    }

    /// Current store; a missing or corrupt file reads as empty
    fn load(&self) -> Store {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Store::new(),
            Err(e) => {
                warn!("Failed to read cache {}: {}", self.path.display(), e);
                return Store::new();
            }
        };

        if content.trim().is_empty() {
            return Store::new();
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(store)) => store,
            Ok(_) => {
                warn!(
                    "Cache {} is not a JSON object, treating as empty",
                    self.path.display()
                );
                Store::new()
            }
            Err(e) => {
                warn!(
                    "Cache {} is corrupt, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Store::new()
            }
        }
    }

    fn save(&self, store: &Store) -> Result<()> {
        let tmp_path = sibling(&self.path, "tmp");
        let json = serde_json::to_string_pretty(store)?;
        fs::write(&tmp_path, json)
            .with_context_fn(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context_fn(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn prune_store(&self, store: &mut Store, now: f64) -> usize {
        let before = store.len();
        store.retain(|_, value| !record(value).is_some_and(|e| e.is_expired(now, self.ttl)));
        before - store.len()
    }
}

/// Parse a stored value as a timestamped record
fn record(value: &Value) -> Option<CacheEntry> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

/// `<path>.<suffix>` next to `path`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl ResponseCache for JsonFileCache {
    fn get(&self, prompt: &str) -> Result<Option<CacheEntry>> {
        let _guard = self.lock(false)?;
        let store = self.load();
        let now = epoch_secs();

        Ok(store
            .get(prompt)
            .and_then(record)
            .filter(|entry| entry.is_fresh(now, self.ttl)))
    }

    fn put(&self, prompt: &str, entry: CacheEntry) -> Result<usize> {
        let _guard = self.lock(true)?;
        let mut store = self.load();
        store.insert(prompt.to_string(), serde_json::to_value(&entry)?);

        let pruned = self.prune_store(&mut store, epoch_secs());
        self.save(&store)?;

        debug!(
            "Cached response in {} ({} entries, {} pruned)",
            self.path.display(),
            store.len(),
            pruned
        );
        Ok(pruned)
    }

    fn prune(&self) -> Result<usize> {
        let _guard = self.lock(true)?;
        let mut store = self.load();
        let pruned = self.prune_store(&mut store, epoch_secs());
        if pruned > 0 {
            self.save(&store)?;
        }
        Ok(pruned)
    }

    fn clear(&self) -> Result<usize> {
        let _guard = self.lock(true)?;
        let store = self.load();
        let removed = store.len();
        self.save(&Store::new())?;
        Ok(removed)
    }

    fn stats(&self) -> Result<CacheStats> {
        let _guard = self.lock(false)?;
        let store = self.load();
        let now = epoch_secs();

        let mut stats = CacheStats {
            entries: store.len(),
            ..Default::default()
        };
        for value in store.values() {
            match record(value) {
                Some(entry) if entry.is_fresh(now, self.ttl) => stats.fresh += 1,
                Some(entry) if entry.is_expired(now, self.ttl) => stats.expired += 1,
                Some(_) => {}
                None => stats.legacy += 1,
            }
        }
        Ok(stats)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
