//! Cache Module
//!
//! Provides a file-backed cache keyed by argument lists, with TTL expiration
//! and opportunistic garbage collection of stale blobs.

mod entry;
mod key;
mod stats;
mod storage;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use key::derive_key;
pub use stats::SweepStats;
pub use storage::{BlobWriter, FsStorage, MemoryStorage, Storage};
pub use store::{ambient_args, CacheStore};

// == Public Constants ==
/// Namespace prefix of every blob name unless configured otherwise
pub const DEFAULT_PREFIX: &str = "cli_cache_";

/// File extension of every blob name
pub const BLOB_EXTENSION: &str = "json";
