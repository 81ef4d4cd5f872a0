//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::io;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Only write, read, encode and configuration failures ever reach a caller.
/// `CorruptEntry` is produced by the entry codec and turned into a cache miss
/// by the engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backing blob could not be created, written or committed
    #[error("failed to write cache entry: {0}")]
    Write(#[source] io::Error),

    /// Backing blob exists but could not be opened or read
    #[error("failed to read cache entry: {0}")]
    Read(#[source] io::Error),

    /// Payload could not be serialized
    #[error("failed to encode cache entry: {0}")]
    Encode(#[source] serde_json::Error),

    /// Blob contents are malformed, truncated or of another payload type
    #[error("corrupt cache entry: {0}")]
    CorruptEntry(#[source] serde_json::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
