//! Seams to the external systems the engine depends on.
//!
//! Face detection, embedding inference, anti-spoofing and the on-chain
//! commitment store all live outside this crate. The engine only sees them
//! through these traits, which keeps it testable with in-process doubles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier of a committed ledger write (e.g. a transaction hash).
pub type TransactionId = String;

/// Failure reported by an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
}

/// Outcome of a liveness (anti-spoof) check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessResult {
    pub is_live: bool,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

impl LivenessResult {
    pub fn live(confidence: f32) -> Self {
        Self {
            is_live: true,
            confidence,
        }
    }

    pub fn spoof(confidence: f32) -> Self {
        Self {
            is_live: false,
            confidence,
        }
    }
}

/// Turns a captured image into a face embedding.
pub trait FaceEmbeddingExtractor: Send + Sync {
    /// `Ok(None)` means no usable face was found.
    fn embed(&self, image: &[u8]) -> Result<Option<Vec<f32>>, CollaboratorError>;
}

/// Decides whether a captured image shows a live person.
pub trait LivenessDetector: Send + Sync {
    fn check(&self, image: &[u8]) -> Result<LivenessResult, CollaboratorError>;
}

/// External key/value commitment store ("the chain").
pub trait LedgerClient: Send + Sync {
    /// Record `commitment_hash` for `wallet` and return the write's id.
    fn set_commitment(
        &self,
        wallet: &str,
        commitment_hash: &str,
    ) -> Result<TransactionId, CollaboratorError>;

    /// Latest commitment recorded for `wallet`.
    fn get_commitment(&self, wallet: &str) -> Result<Option<String>, CollaboratorError>;
}
