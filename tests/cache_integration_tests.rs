//! Integration Tests for the Filesystem Cache
//!
//! Exercises the cache engine against real temporary directories.

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use clicache::cache::FsStorage;
use clicache::{CacheEntry, CacheError, CacheStore, Config};
use tempfile::TempDir;

// == Helper Functions ==

fn test_config(dir: &Path) -> Config {
    Config {
        cache_dir: dir.to_path_buf(),
        ..Config::default()
    }
}

fn create_test_cache() -> (TempDir, CacheStore<FsStorage>) {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheStore::open(&test_config(dir.path())).unwrap();
    (dir, cache)
}

fn seed_expired(cache: &CacheStore<FsStorage>, args: &[&str]) {
    let bytes = CacheEntry::new("stale", -1).encode().unwrap();
    fs::write(cache.storage().path_of(&cache.blob_name(args)), bytes).unwrap();
}

fn blob_count(dir: &Path, prefix: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.starts_with(prefix) && name.ends_with(".json")
        })
        .count()
}

// == Set Tests ==

#[test]
fn test_set_creates_blob_file() {
    let (dir, cache) = create_test_cache();
    let args = ["command", "arg1", "arg2"];
    let data = "This is cached data.";

    cache.set(&args, data, 1).unwrap();

    let path = cache.storage().path_of(&cache.blob_name(&args));
    assert!(path.exists(), "Cache file not created");
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains(data), "Cache file does not contain expected data");

    // Only the committed blob remains; the staging file was renamed away
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_set_records_expiration() {
    let (_dir, cache) = create_test_cache();
    let args = ["command", "arg1", "arg2"];

    cache.set(&args, "data", 60).unwrap();

    let bytes = fs::read(cache.storage().path_of(&cache.blob_name(&args))).unwrap();
    let entry = CacheEntry::<String>::decode(&bytes).unwrap();
    let expected = Utc::now() + TimeDelta::seconds(60);
    let drift = (entry.expiration - expected).num_milliseconds().abs();
    assert!(drift < 1000, "Cache expiration does not match expected TTL");
}

#[test]
fn test_set_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheStore::new(
        FsStorage::new(dir.path().join("gone")),
        &test_config(dir.path()),
    )
    .unwrap();

    let result = cache.set(&["command"], "data", 60);
    assert!(matches!(result, Err(CacheError::Write(_))));
}

#[test]
fn test_open_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("tools").join("cache");

    let cache = CacheStore::open(&test_config(&nested)).unwrap();
    cache.set(&["command"], "data", 60).unwrap();

    assert_eq!(blob_count(&nested, "cli_cache_"), 1);
}

// == Get Tests ==

#[test]
fn test_get_existing_and_missing() {
    let (_dir, cache) = create_test_cache();
    let args = ["command", "arg1", "arg2"];
    cache.set(&args, "This is cached data.", 5).unwrap();

    let found: Option<String> = cache.get(&args).unwrap();
    assert_eq!(found.as_deref(), Some("This is cached data."));

    let missing: Option<String> = cache.get(&["command", "nonexistent"]).unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_get_after_expiration() {
    let (dir, cache) = create_test_cache();
    let args = ["command", "arg1"];
    cache.set(&args, "short lived", 1).unwrap();

    sleep(Duration::from_millis(1100));

    let result: Option<String> = cache.get(&args).unwrap();
    assert!(result.is_none(), "Cache entry should be expired and not found");
    assert_eq!(blob_count(dir.path(), "cli_cache_"), 0);
}

#[test]
fn test_get_heals_truncated_blob() {
    let (dir, cache) = create_test_cache();
    let args = ["command"];
    cache.set(&args, "complete payload", 60).unwrap();

    let path = cache.storage().path_of(&cache.blob_name(&args));
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let result: Option<String> = cache.get(&args).unwrap();
    assert!(result.is_none());
    assert_eq!(blob_count(dir.path(), "cli_cache_"), 0);
}

#[test]
fn test_entries_survive_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let writer = CacheStore::open(&test_config(dir.path())).unwrap();
    writer.set(&["command"], &vec![1, 2, 3], 60).unwrap();
    drop(writer);

    let reader = CacheStore::open(&test_config(dir.path())).unwrap();
    let cached: Option<Vec<i32>> = reader.get(&["command"]).unwrap();
    assert_eq!(cached, Some(vec![1, 2, 3]));
}

// == GC and Cleanup Tests ==

#[test]
fn test_gc_removes_expired_blobs_only() {
    let (dir, cache) = create_test_cache();
    for i in 0..4 {
        cache.set(&["valid", i.to_string().as_str()], "fresh", 60).unwrap();
    }
    for i in 0..3 {
        seed_expired(&cache, &["expired", i.to_string().as_str()]);
    }
    fs::write(dir.path().join("notes.txt"), "not a blob").unwrap();

    let stats = cache.gc();

    assert_eq!(stats.scanned, 7);
    assert_eq!(stats.expired, 3);
    assert_eq!(stats.removed, 3);
    assert_eq!(blob_count(dir.path(), "cli_cache_"), 4);
    assert!(dir.path().join("notes.txt").exists());
    for i in 0..4 {
        let cached: Option<String> = cache.get(&["valid", i.to_string().as_str()]).unwrap();
        assert_eq!(cached.as_deref(), Some("fresh"));
    }
}

#[test]
fn test_set_triggers_gc() {
    let (dir, cache) = create_test_cache();
    seed_expired(&cache, &["expired"]);

    cache.set(&["fresh"], "value", 60).unwrap();

    assert_eq!(blob_count(dir.path(), "cli_cache_"), 1);
}

#[test]
fn test_cleanup_removes_all_blobs() {
    let (dir, cache) = create_test_cache();
    cache.set(&["one"], "value", 60).unwrap();
    cache.set(&["two"], "value", 3600).unwrap();
    seed_expired(&cache, &["three"]);
    fs::write(dir.path().join("other_cache.json"), "{}").unwrap();

    let stats = cache.cleanup();

    assert_eq!(stats.removed, 3);
    assert_eq!(blob_count(dir.path(), "cli_cache_"), 0);
    assert!(dir.path().join("other_cache.json").exists());
}

// == Read-through Tests ==

#[test]
fn test_cache_invokes_handler_once_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let args = ["weather", "--city", "Oslo"];
    let calls = Cell::new(0);
    let handler = || {
        calls.set(calls.get() + 1);
        Ok::<_, CacheError>("This is data.".to_string())
    };

    let first_run = CacheStore::open(&test_config(dir.path())).unwrap();
    assert_eq!(first_run.cache(&args, handler).unwrap(), "This is data.");

    let second_run = CacheStore::open(&test_config(dir.path())).unwrap();
    assert_eq!(second_run.cache(&args, handler).unwrap(), "This is data.");

    assert_eq!(calls.get(), 1);
}

#[test]
fn test_cache_handler_error_propagates() {
    let (dir, cache) = create_test_cache();

    let result = cache.cache(&["command"], || -> anyhow::Result<String> {
        anyhow::bail!("upstream unavailable")
    });

    assert_eq!(result.unwrap_err().to_string(), "upstream unavailable");
    assert_eq!(blob_count(dir.path(), "cli_cache_"), 0);
}

// == Concurrency Tests ==

#[test]
fn test_concurrent_set_and_get_on_distinct_keys() {
    let (dir, cache) = create_test_cache();
    let cache = Arc::new(cache);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let args = [format!("worker-{worker}"), format!("item-{i}")];
                    let payload = format!("payload {worker}/{i}");
                    cache.set(&args, &payload, 60).unwrap();
                    let cached: Option<String> = cache.get(&args).unwrap();
                    assert_eq!(cached, Some(payload));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(blob_count(dir.path(), "cli_cache_"), 8 * 25);
    assert_eq!(cache.gc().removed, 0);
}

#[test]
fn test_concurrent_overwrites_of_one_key() {
    let (dir, cache) = create_test_cache();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let cache = &cache;
            scope.spawn(move || {
                for i in 0..20 {
                    cache.set(&["shared"], &format!("{worker}-{i}"), 60).unwrap();
                }
            });
        }
    });

    let cached: Option<String> = cache.get(&["shared"]).unwrap();
    assert!(cached.is_some());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
