//! clicache - A file-backed cache for command-line tools
//!
//! Lets a CLI reuse results across separate invocations by storing one
//! JSON blob per argument list in a shared directory, with TTL expiration
//! and opportunistic garbage collection.
//!
//! ```no_run
//! use clicache::{CacheStore, Config};
//!
//! # fn main() -> anyhow::Result<()> {
//! let cache = CacheStore::open(&Config::from_env())?;
//! let args = ["forecast", "--city", "Oslo"];
//! let out: String = cache.cache(&args, || -> anyhow::Result<String> {
//!     Ok("sunny".to_string())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{ambient_args, derive_key, CacheEntry, CacheStore, SweepStats};
pub use config::Config;
pub use error::{CacheError, Result};
