//! A [`LedgerClient`] that records commitments in a local snapshot backend.
//!
//! Stands in for the on-chain store when running locally (the CLI, tests).
//! Each wallet keeps only its latest commitment, mirroring a contract
//! mapping `wallet => bytes32`.

use crate::collaborators::{CollaboratorError, LedgerClient, TransactionId};
use ledger::normalize_wallet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use store::{InMemoryBackend, SnapshotBackend};
use tracing::info;
use uuid::Uuid;

const KEY_PREFIX: &str = "commitments/";

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    commitment_hash: String,
    transaction_id: String,
}

/// Commitment journal over a [`SnapshotBackend`].
pub struct JournalLedgerClient {
    backend: Arc<dyn SnapshotBackend>,
}

impl JournalLedgerClient {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    fn key(wallet: &str) -> Result<String, CollaboratorError> {
        let wallet =
            normalize_wallet(wallet).map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
        Ok(format!("{KEY_PREFIX}{wallet}"))
    }

    fn entry(&self, wallet: &str) -> Result<Option<JournalEntry>, CollaboratorError> {
        let key = Self::key(wallet)?;
        let Some(bytes) = self
            .backend
            .get(&key)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CollaboratorError::Unavailable(format!("corrupt journal entry: {e}")))
    }
}

impl LedgerClient for JournalLedgerClient {
    fn set_commitment(
        &self,
        wallet: &str,
        commitment_hash: &str,
    ) -> Result<TransactionId, CollaboratorError> {
        let key = Self::key(wallet)?;
        let entry = JournalEntry {
            commitment_hash: commitment_hash.to_string(),
            transaction_id: format!("0x{}", Uuid::new_v4().simple()),
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
        self.backend
            .put(&key, &bytes)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        info!(key = %key, transaction_id = %entry.transaction_id, "journal_commitment_written");
        Ok(entry.transaction_id)
    }

    fn get_commitment(&self, wallet: &str) -> Result<Option<String>, CollaboratorError> {
        Ok(self.entry(wallet)?.map(|e| e.commitment_hash))
    }
}
