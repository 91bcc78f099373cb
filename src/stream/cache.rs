//! Stream URL cache
//!
//! Bounded LRU map from episode page URL to resolved stream URL, shared by
//! the foreground player and the background preloader.
//!
//! Persistence is write-through: every `put` rewrites the storage file while
//! still holding the lock, so the file only ever has one writer and a crash
//! loses at most the resolution in flight. Storage is a JSON array of
//! `[episode_url, stream_url]` pairs, least recently used first.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of cached streams
pub const DEFAULT_CAPACITY: usize = 100;

/// Cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

struct Inner {
    entries: LruCache<String, String>,
    path: Option<PathBuf>,
}

/// Thread-safe LRU stream cache with optional durable storage
pub struct StreamCache {
    inner: Mutex<Inner>,
    capacity: NonZeroUsize,
}

impl StreamCache {
    /// In-memory cache (nothing is persisted)
    pub fn in_memory(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                path: None,
            }),
            capacity,
        }
    }

    /// Open a persistent cache, loading whatever valid state is on disk.
    ///
    /// A missing or malformed file yields an empty cache.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let cache = Self::in_memory(capacity);
        {
            let mut inner = cache.inner.lock();
            for (key, value) in load_entries(&path, cache.capacity.get()) {
                inner.entries.put(key, value);
            }
            debug!(path = %path.display(), entries = inner.entries.len(), "stream cache loaded");
            inner.path = Some(path);
        }
        cache
    }

    /// Look up a stream, promoting the entry on hit
    pub fn get(&self, episode_url: &str) -> Option<String> {
        self.inner.lock().entries.get(episode_url).cloned()
    }

    /// Look up without touching recency
    pub fn peek(&self, episode_url: &str) -> Option<String> {
        self.inner.lock().entries.peek(episode_url).cloned()
    }

    pub fn contains(&self, episode_url: &str) -> bool {
        self.inner.lock().entries.contains(episode_url)
    }

    /// Insert or refresh an entry, evicting the least recently used one when
    /// full, then persist.
    pub fn put(&self, episode_url: impl Into<String>, stream_url: impl Into<String>) {
        let key = episode_url.into();
        let mut inner = self.inner.lock();
        // push also hands back the old pair when the key was already present
        if let Some((evicted, _)) = inner.entries.push(key.clone(), stream_url.into()) {
            if evicted != key {
                debug!(evicted = %evicted, "stream cache evicted entry");
            }
        }
        persist(&inner);
    }

    /// Remove every entry, in memory and on disk
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        persist(&inner);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Storage location, if persistent
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    /// Entries ordered least recently used first
    pub fn entries(&self) -> Vec<(String, String)> {
        snapshot(&self.inner.lock())
    }

    /// Write the current state to storage
    pub fn save(&self) -> Result<(), CacheError> {
        let inner = self.inner.lock();
        match inner.path.as_deref() {
            Some(path) => write_entries(path, &snapshot(&inner)),
            None => Ok(()),
        }
    }
}

fn snapshot(inner: &Inner) -> Vec<(String, String)> {
    inner
        .entries
        .iter()
        .rev()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Save failures are logged and swallowed; the in-memory state stays valid
fn persist(inner: &Inner) {
    if let Some(path) = inner.path.as_deref() {
        if let Err(e) = write_entries(path, &snapshot(inner)) {
            warn!(path = %path.display(), error = %e, "failed to save stream cache");
        }
    }
}

fn load_entries(path: &Path, capacity: usize) -> Vec<(String, String)> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to read stream cache");
            }
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<(String, String)>>(&text) {
        Ok(mut entries) => {
            let excess = entries.len().saturating_sub(capacity);
            entries.drain(..excess);
            entries
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "stream cache is malformed, starting empty");
            Vec::new()
        }
    }
}

fn write_entries(path: &Path, entries: &[(String, String)]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(entries)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let cache = StreamCache::in_memory(0);
        assert_eq!(cache.capacity(), 1);
        cache.put("a", "1");
        cache.put("b", "2");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some("2".to_string()));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = StreamCache::in_memory(2);
        cache.put("a", "1");
        cache.put("b", "2");
        assert_eq!(cache.peek("a"), Some("1".to_string()));
        cache.put("c", "3");
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let cache = StreamCache::in_memory(4);
        cache.put("a", "1");
        assert!(cache.save().is_ok());
        assert!(cache.path().is_none());
    }

    #[test]
    fn test_snapshot_order_oldest_first() {
        let cache = StreamCache::in_memory(4);
        cache.put("a", "1");
        cache.put("b", "2");
        cache.get("a");
        assert_eq!(
            cache.entries(),
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string())
            ]
        );
    }
}
