//! Stream cache tests
//!
//! Covers LRU ordering, capacity bounds, durable storage and concurrent use.

use std::sync::Arc;
use std::thread;

use dhua::stream::StreamCache;
use tempfile::TempDir;

fn pairs(path: &std::path::Path) -> Vec<(String, String)> {
    let text = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

// =============================================================================
// LRU behaviour
// =============================================================================

#[test]
fn test_evicts_least_recently_used() {
    let cache = StreamCache::in_memory(2);
    cache.put("a", "a.m3u8");
    cache.put("b", "b.m3u8");
    assert_eq!(cache.get("a"), Some("a.m3u8".to_string()));

    cache.put("c", "c.m3u8");

    assert_eq!(cache.len(), 2);
    assert!(cache.contains("a"));
    assert!(!cache.contains("b"));
    assert!(cache.contains("c"));
}

#[test]
fn test_size_never_exceeds_capacity() {
    let cache = StreamCache::in_memory(3);
    for i in 0..20 {
        cache.put(format!("ep{}", i), format!("ep{}.m3u8", i));
        assert!(cache.len() <= cache.capacity());
    }
    let keys: Vec<String> = cache.entries().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["ep17", "ep18", "ep19"]);
}

#[test]
fn test_repeated_put_is_idempotent() {
    let cache = StreamCache::in_memory(4);
    cache.put("a", "a.m3u8");
    cache.put("a", "a.m3u8");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("a"), Some("a.m3u8".to_string()));
}

#[test]
fn test_put_existing_key_refreshes_value_and_recency() {
    let cache = StreamCache::in_memory(2);
    cache.put("a", "old");
    cache.put("b", "b.m3u8");
    cache.put("a", "new");
    cache.put("c", "c.m3u8");

    assert_eq!(cache.peek("a"), Some("new".to_string()));
    assert!(!cache.contains("b"));
}

#[test]
fn test_get_miss() {
    let cache = StreamCache::in_memory(2);
    assert_eq!(cache.get("nope"), None);
    assert!(cache.is_empty());
}

// =============================================================================
// Storage
// =============================================================================

#[test]
fn test_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream_cache.json");

    {
        let cache = StreamCache::open(&path, 10);
        cache.put("ep1", "one.m3u8");
        cache.put("ep2", "two.m3u8");
        cache.get("ep1");
        // promotion by get is in memory only; the next put writes it out
        cache.put("ep3", "three.m3u8");
    }

    let reopened = StreamCache::open(&path, 10);
    assert_eq!(
        reopened.entries(),
        vec![
            ("ep2".to_string(), "two.m3u8".to_string()),
            ("ep1".to_string(), "one.m3u8".to_string()),
            ("ep3".to_string(), "three.m3u8".to_string()),
        ]
    );
    assert_eq!(reopened.path().as_deref(), Some(path.as_path()));
}

#[test]
fn test_file_is_json_pairs_oldest_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let cache = StreamCache::open(&path, 10);
    cache.put("ep1", "one.m3u8");
    cache.put("ep2", "two.m3u8");

    assert_eq!(
        pairs(&path),
        vec![
            ("ep1".to_string(), "one.m3u8".to_string()),
            ("ep2".to_string(), "two.m3u8".to_string()),
        ]
    );
}

#[test]
fn test_load_truncates_to_capacity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(
        &path,
        r#"[["a","1"],["b","2"],["c","3"],["d","4"],["e","5"]]"#,
    )
    .unwrap();

    let cache = StreamCache::open(&path, 3);
    assert_eq!(cache.len(), 3);
    assert!(!cache.contains("a"));
    assert!(!cache.contains("b"));

    // "c" is the oldest survivor and goes first
    cache.put("f", "6");
    assert!(!cache.contains("c"));
    assert!(cache.contains("e"));
}

#[test]
fn test_malformed_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{ not json").unwrap();

    let cache = StreamCache::open(&path, 5);
    assert!(cache.is_empty());

    // first write replaces the garbage
    cache.put("ep1", "one.m3u8");
    assert_eq!(pairs(&path).len(), 1);
}

#[test]
fn test_missing_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let cache = StreamCache::open(dir.path().join("nested").join("cache.json"), 5);
    assert!(cache.is_empty());
}

#[test]
fn test_unwritable_location_keeps_memory_state() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();
    let path = blocker.join("cache.json");

    let cache = StreamCache::open(&path, 5);
    cache.put("ep1", "one.m3u8");

    assert_eq!(cache.get("ep1"), Some("one.m3u8".to_string()));
    assert!(cache.save().is_err());
}

#[test]
fn test_clear_empties_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let cache = StreamCache::open(&path, 5);
    cache.put("ep1", "one.m3u8");
    cache.clear();

    assert!(cache.is_empty());
    assert!(pairs(&path).is_empty());
    assert!(StreamCache::open(&path, 5).is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_writers_stay_bounded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let cache = Arc::new(StreamCache::open(&path, 50));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..40 {
                    let key = format!("t{}-ep{}", t, i);
                    cache.put(key.clone(), format!("{}.m3u8", key));
                    cache.get(&key);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 50);
    let on_disk = pairs(&path);
    assert_eq!(on_disk.len(), 50);
    for (key, value) in on_disk {
        assert_eq!(value, format!("{}.m3u8", key));
    }
}
