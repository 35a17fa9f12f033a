//! # FaceAuth Ledger
//!
//! Maps each wallet to exactly one enrolled identity.
//!
//! A binding records which identity a wallet enrolled as, together with the
//! audit digest of the enrolled embedding and the salt used for its on-chain
//! commitment. Binding the same wallet again replaces the previous binding
//! (latest wins); the replaced binding is handed back so callers can retire
//! whatever it pointed at.
//!
//! Every identity belongs to at most one wallet, and
//! [`owner_of`](IdentityLedger::owner_of) answers which one in constant time.
//!
//! Wallet keys are trimmed and lower-cased, so `0xAbC` and ` 0xabc ` name the
//! same binding.
//!
//! The whole map is persisted as JSON under [`WALLETS_KEY`] after every
//! mutation. A failed write leaves the in-memory map untouched.
//!
//! ```
//! use ledger::IdentityLedger;
//!
//! let ledger = IdentityLedger::in_memory();
//! ledger.bind("0xABC", "id-1", "digest-1", "salt-1").unwrap();
//! let replaced = ledger.bind("0xabc", "id-2", "digest-2", "salt-2").unwrap();
//! assert_eq!(replaced.unwrap().identity_id, "id-1");
//! assert_eq!(ledger.get("0xAbc").unwrap().identity_id, "id-2");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use store::{InMemoryBackend, SnapshotBackend, StoreError};
use thiserror::Error;
use tracing::{info, warn};

/// Backend key of the persisted wallet map.
pub const WALLETS_KEY: &str = "wallets.json";

/// Errors produced by the identity ledger.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid wallet: {0}")]
    InvalidWallet(String),
    #[error("wallet map encode error: {0}")]
    Encode(String),
    #[error("wallet map decode error: {0}")]
    Decode(String),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Canonical form of a wallet key: trimmed and lower-cased.
pub fn normalize_wallet(wallet: &str) -> Result<String, LedgerError> {
    let normalized = wallet.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(LedgerError::InvalidWallet(
            "wallet must not be empty".into(),
        ));
    }
    Ok(normalized)
}

/// Current association between a wallet and an enrolled identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityBinding {
    /// Normalized wallet key.
    pub wallet: String,
    pub identity_id: String,
    /// Hex SHA-256 of the raw enrolled embedding.
    pub embedding_digest: String,
    /// Hex salt that went into the on-chain commitment.
    pub salt: String,
}

/// On-disk value; the wallet is the map key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BindingRecord {
    identity_id: String,
    embedding_digest: String,
    salt: String,
}

impl BindingRecord {
    fn into_binding(self, wallet: String) -> IdentityBinding {
        IdentityBinding {
            wallet,
            identity_id: self.identity_id,
            embedding_digest: self.embedding_digest,
            salt: self.salt,
        }
    }
}

/// Wallet map plus its identity → wallet inverse. Only `records` is
/// persisted; `owners` is derived.
#[derive(Debug, Clone, Default)]
struct WalletMap {
    records: BTreeMap<String, BindingRecord>,
    owners: HashMap<String, String>,
}

impl WalletMap {
    fn from_records(records: BTreeMap<String, BindingRecord>) -> Self {
        let owners = records
            .iter()
            .map(|(wallet, r)| (r.identity_id.clone(), wallet.clone()))
            .collect();
        Self { records, owners }
    }

    fn insert(&mut self, wallet: String, record: BindingRecord) -> Option<BindingRecord> {
        let identity_id = record.identity_id.clone();
        let replaced = self.records.insert(wallet.clone(), record);
        if let Some(old) = &replaced {
            self.owners.remove(&old.identity_id);
        }
        self.owners.insert(identity_id, wallet);
        replaced
    }

    fn remove(&mut self, wallet: &str) -> Option<BindingRecord> {
        let removed = self.records.remove(wallet)?;
        self.owners.remove(&removed.identity_id);
        Some(removed)
    }
}

/// Persistent wallet → identity map.
pub struct IdentityLedger {
    backend: Arc<dyn SnapshotBackend>,
    bindings: RwLock<WalletMap>,
}

impl IdentityLedger {
    /// Open the ledger, loading the wallet map from `backend` if present.
    pub fn open(backend: Arc<dyn SnapshotBackend>) -> Result<Self, LedgerError> {
        let records: BTreeMap<String, BindingRecord> = match backend.get(WALLETS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LedgerError::Decode(e.to_string()))?,
            None => BTreeMap::new(),
        };
        info!(bindings = records.len(), "ledger_opened");
        Ok(Self {
            backend,
            bindings: RwLock::new(WalletMap::from_records(records)),
        })
    }

    /// Empty ledger over a private in-memory backend.
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
            bindings: RwLock::new(WalletMap::default()),
        }
    }

    /// Bind `wallet` to `identity_id`, replacing any existing binding.
    ///
    /// Returns the replaced binding, if any.
    pub fn bind(
        &self,
        wallet: &str,
        identity_id: &str,
        embedding_digest: &str,
        salt: &str,
    ) -> Result<Option<IdentityBinding>, LedgerError> {
        let wallet = normalize_wallet(wallet)?;
        let record = BindingRecord {
            identity_id: identity_id.to_string(),
            embedding_digest: embedding_digest.to_string(),
            salt: salt.to_string(),
        };

        let mut bindings = self.write();
        let mut next = bindings.clone();
        let replaced = next.insert(wallet.clone(), record);
        self.persist(&next.records)?;
        *bindings = next;

        info!(
            wallet = %wallet,
            identity_id,
            replaced = replaced.is_some(),
            "ledger_bind"
        );
        Ok(replaced.map(|r| r.into_binding(wallet)))
    }

    pub fn get(&self, wallet: &str) -> Option<IdentityBinding> {
        let wallet = normalize_wallet(wallet).ok()?;
        self.read()
            .records
            .get(&wallet)
            .cloned()
            .map(|r| r.into_binding(wallet))
    }

    /// Wallet currently bound to `identity_id`, if any.
    pub fn owner_of(&self, identity_id: &str) -> Option<String> {
        self.read().owners.get(identity_id).cloned()
    }

    /// Remove the binding for `wallet`; `Ok(None)` when there was none.
    pub fn unbind(&self, wallet: &str) -> Result<Option<IdentityBinding>, LedgerError> {
        let wallet = normalize_wallet(wallet)?;
        let mut bindings = self.write();
        if !bindings.records.contains_key(&wallet) {
            return Ok(None);
        }

        let mut next = bindings.clone();
        let removed = next.remove(&wallet);
        self.persist(&next.records)?;
        *bindings = next;

        info!(wallet = %wallet, "ledger_unbind");
        Ok(removed.map(|r| r.into_binding(wallet)))
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Bound wallets in sorted order.
    pub fn wallets(&self) -> Vec<String> {
        self.read().records.keys().cloned().collect()
    }

    fn persist(&self, bindings: &BTreeMap<String, BindingRecord>) -> Result<(), LedgerError> {
        let bytes =
            serde_json::to_vec(bindings).map_err(|e| LedgerError::Encode(e.to_string()))?;
        self.backend.put(WALLETS_KEY, &bytes).map_err(|err| {
            warn!(error = %err, "ledger_persist_failure");
            LedgerError::Persistence(err)
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, WalletMap> {
        self.bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, WalletMap> {
        self.bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for IdentityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityLedger")
            .field("bindings", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::testing::FlakyBackend;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_wallet("  0xAbCd ").unwrap(), "0xabcd");
        assert!(matches!(
            normalize_wallet("   "),
            Err(LedgerError::InvalidWallet(_))
        ));
    }

    #[test]
    fn single_binding_law() {
        let ledger = IdentityLedger::in_memory();
        assert!(ledger.bind("0xW", "id1", "d1", "s1").unwrap().is_none());
        let replaced = ledger.bind("0xw", "id2", "d2", "s2").unwrap().unwrap();
        assert_eq!(replaced.identity_id, "id1");
        assert_eq!(replaced.wallet, "0xw");

        let current = ledger.get("0xW").unwrap();
        assert_eq!(current.identity_id, "id2");
        assert_eq!(current.embedding_digest, "d2");
        assert_eq!(current.salt, "s2");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn owner_follows_rebinds_and_unbinds() {
        let ledger = IdentityLedger::in_memory();
        ledger.bind("0xA", "id1", "d1", "s1").unwrap();
        assert_eq!(ledger.owner_of("id1").as_deref(), Some("0xa"));

        ledger.bind("0xa", "id2", "d2", "s2").unwrap();
        assert!(ledger.owner_of("id1").is_none());
        assert_eq!(ledger.owner_of("id2").as_deref(), Some("0xa"));

        ledger.unbind("0xa").unwrap();
        assert!(ledger.owner_of("id2").is_none());
        assert!(ledger.owner_of("never-bound").is_none());
    }

    #[test]
    fn unknown_and_empty_wallets_have_no_binding() {
        let ledger = IdentityLedger::in_memory();
        assert!(ledger.get("0xnobody").is_none());
        assert!(ledger.get("").is_none());
        assert!(matches!(
            ledger.bind("", "id", "d", "s"),
            Err(LedgerError::InvalidWallet(_))
        ));
    }

    #[test]
    fn unbind_removes_binding() {
        let ledger = IdentityLedger::in_memory();
        ledger.bind("0xa", "id-a", "d", "s").unwrap();
        ledger.bind("0xb", "id-b", "d", "s").unwrap();

        let removed = ledger.unbind("0xA").unwrap().unwrap();
        assert_eq!(removed.identity_id, "id-a");
        assert!(ledger.get("0xa").is_none());
        assert!(ledger.unbind("0xa").unwrap().is_none());
        assert_eq!(ledger.wallets(), vec!["0xb".to_string()]);
    }

    #[test]
    fn reopen_restores_bindings() {
        let backend: Arc<dyn SnapshotBackend> = Arc::new(InMemoryBackend::new());
        {
            let ledger = IdentityLedger::open(backend.clone()).unwrap();
            ledger.bind("0xa", "id-a", "da", "sa").unwrap();
            ledger.bind("0xb", "id-b", "db", "sb").unwrap();
            ledger.unbind("0xb").unwrap();
        }
        let reopened = IdentityLedger::open(backend).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("0xa").unwrap().salt, "sa");
        assert_eq!(reopened.owner_of("id-a").as_deref(), Some("0xa"));
        assert!(reopened.owner_of("id-b").is_none());
    }

    #[test]
    fn wallet_map_layout_is_keyed_by_wallet() {
        let backend = Arc::new(InMemoryBackend::new());
        let ledger = IdentityLedger::open(backend.clone()).unwrap();
        ledger.bind("0xA", "id-a", "da", "sa").unwrap();

        let raw = backend.get(WALLETS_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["0xa"]["identity_id"], "id-a");
        assert_eq!(json["0xa"]["embedding_digest"], "da");
        assert_eq!(json["0xa"]["salt"], "sa");
    }

    #[test]
    fn failed_persist_leaves_ledger_unchanged() {
        let flaky = Arc::new(FlakyBackend::new());
        let ledger = IdentityLedger::open(flaky.clone()).unwrap();
        ledger.bind("0xa", "id-a", "d", "s").unwrap();

        flaky.set_fail_writes(true);
        assert!(matches!(
            ledger.bind("0xa", "id-b", "d", "s"),
            Err(LedgerError::Persistence(_))
        ));
        assert!(matches!(
            ledger.unbind("0xa"),
            Err(LedgerError::Persistence(_))
        ));
        assert_eq!(ledger.get("0xa").unwrap().identity_id, "id-a");
        assert_eq!(ledger.owner_of("id-a").as_deref(), Some("0xa"));
        assert!(ledger.owner_of("id-b").is_none());
    }

    #[test]
    fn corrupt_wallet_map_is_an_error() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.put(WALLETS_KEY, b"not json").unwrap();
        assert!(matches!(
            IdentityLedger::open(backend),
            Err(LedgerError::Decode(_))
        ));
    }
}
