//! # FaceAuth Store
//!
//! Whole-snapshot persistence for the FaceAuth index and ledger.
//!
//! Both stores keep their authoritative state in memory and mirror it to a
//! [`SnapshotBackend`] after every mutation. A snapshot is a small set of
//! named blobs (`embedding_index.bin`, `id_map.json`, `wallets.json`) that
//! are rewritten in full; there is no incremental append format.
//!
//! Backends:
//! - [`InMemoryBackend`]: a `RwLock<HashMap>`; ephemeral, used by tests.
//! - [`RedbBackend`]: a single-file ACID database (feature `backend-redb`,
//!   enabled by default). Multi-key writes commit in one transaction, so the
//!   index blob and its id-map can never be observed half-written.
//!
//! ```
//! use store::{BackendConfig, SnapshotBackend};
//!
//! let backend = BackendConfig::in_memory().build().unwrap();
//! backend
//!     .put_many(vec![
//!         ("a".to_string(), b"1".to_vec()),
//!         ("b".to_string(), b"2".to_vec()),
//!     ])
//!     .unwrap();
//! assert_eq!(backend.get("a").unwrap(), Some(b"1".to_vec()));
//! ```

mod backend;

#[doc(hidden)]
pub mod testing;

pub use backend::{BackendConfig, InMemoryBackend, SnapshotBackend};

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;

use thiserror::Error;

/// Errors raised by snapshot backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}
