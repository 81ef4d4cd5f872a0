//! Cache Entry Module
//!
//! Defines the persisted envelope of a cached value and its byte codec.

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Entry ==
/// A cached payload together with the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Expiration instant, persisted as Unix milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expiration: DateTime<Utc>,
    /// The stored value
    pub payload: T,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates an entry that expires `ttl_seconds` from now.
    ///
    /// Zero or negative TTLs produce an entry that is already expired.
    pub fn new(payload: T, ttl_seconds: i64) -> Self {
        Self {
            expiration: expiration_after(Utc::now(), ttl_seconds),
            payload,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is valid strictly before its expiration instant and expired
    /// from that instant on.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks expiry against an explicit instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or `None` once expired.
    pub fn ttl_remaining(&self) -> Option<TimeDelta> {
        let remaining = self.expiration.signed_duration_since(Utc::now());
        (remaining > TimeDelta::zero()).then_some(remaining)
    }
}

// == Codec ==
impl<T: Serialize> CacheEntry<T> {
    /// Serializes the entry to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(CacheError::Encode)
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    /// Deserializes an entry, failing with `CorruptEntry` on malformed,
    /// truncated or type-mismatched input.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(CacheError::CorruptEntry)
    }
}

// == Utility Functions ==
/// Adds a TTL in seconds to `now`, saturating at the calendar bounds.
fn expiration_after(now: DateTime<Utc>, ttl_seconds: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(ttl_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(if ttl_seconds > 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
}
