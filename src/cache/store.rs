//! Cache Store Module
//!
//! Main cache engine: maps argument lists to blobs, reads and writes entries
//! through a storage backend, and sweeps stale blobs after every operation.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{derive_key, CacheEntry, FsStorage, Storage, SweepStats, BLOB_EXTENSION};
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Why a lookup came back empty. Only used for logging.
#[derive(Debug, Clone, Copy)]
enum MissReason {
    NotFound,
    Expired,
    Corrupt,
}

// == Cache Store ==
/// File-backed cache keyed by argument lists.
///
/// All operations on one store are serialized by an internal mutex, so the
/// store can be shared between threads (e.g. behind an `Arc`). Nothing is
/// coordinated across processes: two processes writing the same key race
/// and the last writer wins.
#[derive(Debug)]
pub struct CacheStore<S = FsStorage> {
    /// Blob backend
    storage: S,
    /// Namespace prefix of every blob name
    prefix: String,
    /// `.json`
    suffix: String,
    /// Default TTL in seconds used by [`CacheStore::cache`]
    default_ttl: AtomicI64,
    /// Serializes set/get/gc/cleanup within this process
    lock: Mutex<()>,
}

impl CacheStore<FsStorage> {
    // == Constructor ==
    /// Opens a store over the configured directory, creating it if needed.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.cache_dir).map_err(CacheError::Write)?;
        Self::new(FsStorage::new(&config.cache_dir), config)
    }
}

impl<S: Storage> CacheStore<S> {
    /// Creates a store over an arbitrary backend.
    ///
    /// Only `prefix` and `default_ttl` are taken from `config`; the backend
    /// decides where blobs live.
    pub fn new(storage: S, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            prefix: config.prefix.clone(),
            suffix: format!(".{BLOB_EXTENSION}"),
            default_ttl: AtomicI64::new(config.default_ttl),
            lock: Mutex::new(()),
        })
    }

    /// Returns the storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the name of the blob backing `args`.
    pub fn blob_name<A: AsRef<str>>(&self, args: &[A]) -> String {
        format!("{}{}{}", self.prefix, derive_key(args), self.suffix)
    }

    // == TTL ==
    /// Sets the default TTL used by [`CacheStore::cache`].
    ///
    /// The sign is not checked: zero or negative values make the read-through
    /// helper recompute on every call.
    pub fn set_ttl(&self, ttl_seconds: i64) {
        self.default_ttl.store(ttl_seconds, Ordering::Relaxed);
    }

    /// Returns the default TTL in seconds.
    pub fn default_ttl(&self) -> i64 {
        self.default_ttl.load(Ordering::Relaxed)
    }

    // == Set ==
    /// Stores `data` under `args`, replacing any previous entry.
    ///
    /// The entry expires `ttl_seconds` from now. A GC sweep runs before
    /// returning; its failures are never reported.
    ///
    /// # Errors
    /// - `CacheError::Encode` if `data` cannot be serialized
    /// - `CacheError::Write` if the blob cannot be written
    pub fn set<A, T>(&self, args: &[A], data: &T, ttl_seconds: i64) -> Result<()>
    where
        A: AsRef<str>,
        T: Serialize + ?Sized,
    {
        let _guard = self.lock();

        let name = self.blob_name(args);
        let bytes = CacheEntry::new(data, ttl_seconds).encode()?;
        self.write_blob(&name, &bytes)?;
        debug!(blob = %name, ttl_seconds, "Cache entry written");

        self.sweep();
        Ok(())
    }

    // == Get ==
    /// Retrieves the value stored under `args`.
    ///
    /// Returns `Ok(None)` when there is no entry, when it has expired, or when
    /// it cannot be decoded as `T`. Expired and undecodable blobs are removed
    /// on the way. A GC sweep runs before returning.
    ///
    /// # Errors
    /// - `CacheError::Read` if the blob exists but cannot be read
    pub fn get<A, T>(&self, args: &[A]) -> Result<Option<T>>
    where
        A: AsRef<str>,
        T: DeserializeOwned,
    {
        let _guard = self.lock();

        let name = self.blob_name(args);
        let found = self.lookup(&name);

        self.sweep();
        found
    }

    // == Cache ==
    /// Read-through helper: returns the cached value for `args`, or runs
    /// `handler` and caches its result with the default TTL.
    ///
    /// `handler` runs at most once. Its error is returned unchanged and
    /// nothing is cached. Other processes with the same arguments may run
    /// their own handler concurrently.
    pub fn cache<A, T, E, F>(&self, args: &[A], handler: F) -> std::result::Result<T, E>
    where
        A: AsRef<str>,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        if let Some(cached) = self.get(args)? {
            return Ok(cached);
        }

        let value = handler()?;
        self.set(args, &value, self.default_ttl())?;
        Ok(value)
    }

    // == GC ==
    /// Removes every expired or undecodable blob under the prefix.
    ///
    /// Best effort: listing, read and removal failures are logged and
    /// skipped.
    pub fn gc(&self) -> SweepStats {
        let _guard = self.lock();
        self.sweep()
    }

    // == Cleanup ==
    /// Removes every blob under the prefix, expired or not.
    ///
    /// Best effort, like [`CacheStore::gc`].
    pub fn cleanup(&self) -> SweepStats {
        let _guard = self.lock();

        let mut stats = SweepStats::new();
        for name in self.list_blobs() {
            stats.record_scanned();
            if self.remove_quietly(&name) {
                stats.record_removed();
            }
        }

        info!(removed = stats.removed, "Cache cleaned up");
        stats
    }

    // == Internals ==
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let bytes = match self.read_blob(name) {
            Ok(bytes) => bytes,
            Err(err) if self.storage.is_not_found(&err) => {
                debug!(blob = %name, reason = ?MissReason::NotFound, "Cache miss");
                return Ok(None);
            }
            Err(err) => return Err(CacheError::Read(err)),
        };

        match CacheEntry::<T>::decode(&bytes) {
            Ok(entry) if !entry.is_expired() => {
                debug!(blob = %name, "Cache hit");
                Ok(Some(entry.payload))
            }
            Ok(_) => {
                self.discard(name, MissReason::Expired);
                Ok(None)
            }
            Err(err) => {
                debug!(blob = %name, error = %err, "Cache entry failed to decode");
                self.discard(name, MissReason::Corrupt);
                Ok(None)
            }
        }
    }

    fn discard(&self, name: &str, reason: MissReason) {
        debug!(blob = %name, ?reason, "Cache miss, removing blob");
        self.remove_quietly(name);
    }

    fn read_blob(&self, name: &str) -> io::Result<Vec<u8>> {
        let mut reader = self.storage.open(name)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn write_blob(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut writer = self.storage.create(name).map_err(CacheError::Write)?;
        writer.write_all(bytes).map_err(CacheError::Write)?;
        writer.commit().map_err(CacheError::Write)
    }

    /// Returns true only if this call removed the blob.
    fn remove_quietly(&self, name: &str) -> bool {
        match self.storage.remove(name) {
            Ok(()) => true,
            Err(err) if self.storage.is_not_found(&err) => false,
            Err(err) => {
                warn!(blob = %name, error = %err, "Failed to remove cache blob");
                false
            }
        }
    }

    fn list_blobs(&self) -> Vec<String> {
        self.storage
            .list(&self.prefix, &self.suffix)
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to list cache blobs");
                Vec::new()
            })
    }

    /// GC body; callers hold the lock.
    fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::new();
        let now = Utc::now();

        for name in self.list_blobs() {
            stats.record_scanned();

            let bytes = match self.read_blob(&name) {
                Ok(bytes) => bytes,
                Err(err) => {
                    if !self.storage.is_not_found(&err) {
                        debug!(blob = %name, error = %err, "Skipping unreadable cache blob");
                    }
                    continue;
                }
            };

            match CacheEntry::<IgnoredAny>::decode(&bytes) {
                Ok(entry) if !entry.is_expired_at(now) => {}
                Ok(_) => {
                    if self.remove_quietly(&name) {
                        stats.record_expired();
                    }
                }
                Err(_) => {
                    if self.remove_quietly(&name) {
                        stats.record_corrupt();
                    }
                }
            }
        }

        if stats.removed > 0 {
            info!(
                scanned = stats.scanned,
                expired = stats.expired,
                corrupt = stats.corrupt,
                "Cache sweep removed stale blobs"
            );
        } else {
            debug!(scanned = stats.scanned, "Cache sweep found nothing to remove");
        }
        stats
    }
}

// == Utility Functions ==
/// Returns the current process arguments without the program name.
///
/// Useful as the `args` of [`CacheStore::cache`] when a tool wants its whole
/// command line to be the cache key.
pub fn ambient_args() -> Vec<String> {
    std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}
