//! Audit digest over raw embedding bytes.
//!
//! # Algorithm
//!
//! ```text
//! SHA-256(f32_le(v[0]) || f32_le(v[1]) || ... || f32_le(v[n-1])) → hex
//! ```
//!
//! The digest is taken over the vector exactly as supplied, before any
//! normalization, and with an explicit little-endian byte order. The same
//! embedding therefore hashes identically under every similarity metric and
//! on every host.
//!
//! ```rust
//! use index::embedding_digest;
//!
//! let digest = embedding_digest(&[0.25, -1.0, 3.5]);
//! assert_eq!(digest.len(), 64);
//! assert_eq!(digest, embedding_digest(&[0.25, -1.0, 3.5]));
//! ```

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the raw little-endian `f32` bytes of `vector`.
pub fn embedding_digest(vector: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in vector {
        hasher.update(value.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}
