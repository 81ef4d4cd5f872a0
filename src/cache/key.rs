//! Cache Key Module
//!
//! Maps an ordered argument list to a fixed-length hex identifier.

use sha2::{Digest, Sha256};

/// Derives the cache key for an argument list.
///
/// Each argument is hashed as its byte length (8 bytes, big-endian) followed
/// by its UTF-8 bytes, so `["ab", "c"]` and `["a", "bc"]` produce different
/// keys. The result is a 64-character lowercase hex SHA-256 digest.
pub fn derive_key<A: AsRef<str>>(args: &[A]) -> String {
    let mut hasher = Sha256::new();
    for arg in args {
        let bytes = arg.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}
