//! Content hashing for raw store keys.
//!
//! The digest only depends on the bytes of the input, so the same URL maps to
//! the same file name on every run and platform.

use sha2::{Digest, Sha224};

/// Lowercase hex SHA-224 digest of `s` (56 characters).
pub fn hash_url(s: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}
