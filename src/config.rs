//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::DEFAULT_PREFIX;
use crate::error::{CacheError, Result};

/// Default TTL in seconds for entries written by the read-through helper
pub const DEFAULT_TTL: i64 = 300;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Shared directory holding the backing blobs
    pub cache_dir: PathBuf,
    /// Namespace prefix of every blob name
    pub prefix: String,
    /// Default TTL in seconds used by the read-through helper
    pub default_ttl: i64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CLICACHE_DIR` - Cache directory (default: the system temp dir)
    /// - `CLICACHE_PREFIX` - Blob name prefix (default: `cli_cache_`)
    /// - `CLICACHE_TTL` - Default TTL in seconds (default: 300)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            cache_dir: lookup("CLICACHE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            prefix: lookup("CLICACHE_PREFIX")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.prefix),
            default_ttl: lookup("CLICACHE_TTL")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.default_ttl),
        }
    }

    /// Checks that the prefix can only ever name files inside `cache_dir`.
    ///
    /// An empty prefix is rejected as well: cleanup would otherwise claim
    /// every `.json` file in a shared directory.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(CacheError::Config("prefix cannot be empty".to_string()));
        }
        if self.prefix.contains(['/', '\\']) || self.prefix.contains("..") {
            return Err(CacheError::Config(format!(
                "prefix {:?} must not contain path components",
                self.prefix
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: env::temp_dir(),
            prefix: DEFAULT_PREFIX.to_string(),
            default_ttl: DEFAULT_TTL,
        }
    }
}
