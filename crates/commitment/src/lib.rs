//! # FaceAuth Commitment
//!
//! Derives a salted, tamper-evident commitment from an embedding digest.
//!
//! ```text
//! salt        = hex(16 random bytes from the OS RNG)
//! payload     = {"embeddingDigest": "<digest>", "salt": "<salt>"}   (canonical JSON)
//! commitment  = hex(Keccak-256(payload))                            (64 chars, no 0x)
//! ```
//!
//! The salt makes two commitments over the same embedding unlinkable; anyone
//! holding the digest and the salt can recompute and [`verify`](CommitmentBuilder::verify)
//! the hash. Commitments are an audit trail only and never gate
//! authentication.
//!
//! ```
//! use commitment::CommitmentBuilder;
//!
//! let builder = CommitmentBuilder::new();
//! let c = builder.build("9f86d081884c7d65").unwrap();
//! assert_eq!(c.commitment_hash.len(), 64);
//! assert_eq!(c.salt.len(), 32);
//! assert!(builder.verify("9f86d081884c7d65", &c.salt, &c.commitment_hash));
//! ```

mod canonical;

use alloy_primitives::keccak256;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Salt length in bytes before hex encoding.
pub const DEFAULT_SALT_BYTES: usize = 16;

/// Errors produced while building a commitment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("commitment payload serialization failed: {0}")]
    Serialize(String),
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

/// A commitment hash and the salt it was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// Lower-case hex Keccak-256, no `0x` prefix.
    pub commitment_hash: String,
    /// Lower-case hex salt.
    pub salt: String,
}

/// Builds and verifies salted commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitmentBuilder {
    salt_bytes: usize,
}

impl Default for CommitmentBuilder {
    fn default() -> Self {
        Self {
            salt_bytes: DEFAULT_SALT_BYTES,
        }
    }
}

impl CommitmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the salt length (bytes). Zero is clamped to one.
    pub fn with_salt_bytes(mut self, salt_bytes: usize) -> Self {
        self.salt_bytes = salt_bytes.max(1);
        self
    }

    /// Commit to `embedding_digest` under a fresh random salt.
    pub fn build(&self, embedding_digest: &str) -> Result<Commitment, CommitmentError> {
        let salt = self.fresh_salt()?;
        let commitment_hash = commit_with_salt(embedding_digest, &salt)?;
        tracing::debug!(salt_bytes = self.salt_bytes, "commitment_built");
        Ok(Commitment {
            commitment_hash,
            salt,
        })
    }

    /// Recompute the commitment for `(embedding_digest, salt)` and compare it
    /// with `commitment_hash` in constant time.
    ///
    /// The comparison ignores case and an optional `0x` prefix.
    pub fn verify(&self, embedding_digest: &str, salt: &str, commitment_hash: &str) -> bool {
        let Ok(expected) = commit_with_salt(embedding_digest, salt) else {
            return false;
        };
        let given = commitment_hash.trim();
        let given = given
            .strip_prefix("0x")
            .or_else(|| given.strip_prefix("0X"))
            .unwrap_or(given)
            .to_ascii_lowercase();
        expected.as_bytes().ct_eq(given.as_bytes()).into()
    }

    fn fresh_salt(&self) -> Result<String, CommitmentError> {
        let mut bytes = vec![0u8; self.salt_bytes];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CommitmentError::Entropy(e.to_string()))?;
        Ok(hex::encode(bytes))
    }
}

/// Deterministic commitment for a given digest and salt.
pub fn commit_with_salt(embedding_digest: &str, salt: &str) -> Result<String, CommitmentError> {
    let mut payload = BTreeMap::new();
    payload.insert("embeddingDigest", embedding_digest);
    payload.insert("salt", salt);
    let bytes = canonical::canonical_json(&payload)
        .map_err(|e| CommitmentError::Serialize(e.to_string()))?;
    Ok(hex::encode(keccak256(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_matches_known_vector() {
        // Keccak-256 of the empty string.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn commitment_hashes_canonical_payload() {
        let expected = hex::encode(keccak256(
            br#"{"embeddingDigest": "abc123", "salt": "00112233"}"#,
        ));
        assert_eq!(commit_with_salt("abc123", "00112233").unwrap(), expected);
    }

    #[test]
    fn salt_is_randomized() {
        let builder = CommitmentBuilder::new();
        let a = builder.build("digest").unwrap();
        let b = builder.build("digest").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.commitment_hash, b.commitment_hash);
        assert!(a.salt.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_is_deterministic() {
        let builder = CommitmentBuilder::new();
        let c = builder.build("digest").unwrap();
        for _ in 0..3 {
            assert!(builder.verify("digest", &c.salt, &c.commitment_hash));
        }
        assert_eq!(
            commit_with_salt("digest", &c.salt).unwrap(),
            c.commitment_hash
        );
    }

    #[test]
    fn verify_accepts_prefix_and_upper_case() {
        let builder = CommitmentBuilder::new();
        let c = builder.build("digest").unwrap();
        let prefixed = format!("0x{}", c.commitment_hash.to_uppercase());
        assert!(builder.verify("digest", &c.salt, &prefixed));
    }

    #[test]
    fn verify_rejects_tampering() {
        let builder = CommitmentBuilder::new();
        let c = builder.build("digest").unwrap();
        assert!(!builder.verify("other-digest", &c.salt, &c.commitment_hash));
        assert!(!builder.verify("digest", "00", &c.commitment_hash));
        assert!(!builder.verify("digest", &c.salt, &c.commitment_hash[..62]));
    }

    #[test]
    fn salt_length_is_configurable() {
        let builder = CommitmentBuilder::new().with_salt_bytes(8);
        assert_eq!(builder.build("d").unwrap().salt.len(), 16);
        let clamped = CommitmentBuilder::new().with_salt_bytes(0);
        assert_eq!(clamped.build("d").unwrap().salt.len(), 2);
    }
}
