//! Workspace umbrella crate for FaceAuth.
//!
//! FaceAuth binds a face embedding to a wallet and later decides whether a
//! fresh capture belongs to the identity that wallet enrolled as. The
//! building blocks live in their own crates and are re-exported here:
//!
//! - `store`: snapshot backends (in-memory, redb)
//! - `index`: persistent embedding similarity index
//! - `ledger`: wallet → identity bindings
//! - `commitment`: salted Keccak-256 commitments over embedding digests
//! - `engine`: [`FaceAuthService`], the enrollment and decision engine
//!
//! [`build_service`] assembles a service from a [`FaceAuthConfig`].
//!
//! ```
//! use faceauth::{build_service, FaceAuthConfig, LivenessResult};
//!
//! let mut config = FaceAuthConfig::default();
//! config.index.dimension = 3;
//! let service = build_service(&config).unwrap();
//!
//! service.enroll("0xabc", &[0.3, 0.4, 0.5]).unwrap();
//! let verdict = service
//!     .authenticate("0xabc", Some(&[0.31, 0.4, 0.49]), &LivenessResult::live(0.99))
//!     .unwrap();
//! assert!(verdict.passed);
//! ```

pub mod config;

pub use crate::config::{ConfigLoadError, FaceAuthConfig};

pub use commitment::{commit_with_salt, Commitment, CommitmentBuilder, CommitmentError};
pub use engine::{
    set_auth_metrics, AuthConfig, AuthDecision, AuthError, AuthMetrics, AuthResult,
    CollaboratorError, CommitmentAudit, EnrollReceipt, FaceAuthService, FaceEmbeddingExtractor,
    JournalLedgerClient, LedgerClient, LivenessDetector, LivenessResult, ServiceStats,
};
pub use index::{
    embedding_digest, AnnConfig, CompressionCodec, CompressionConfig, EmbeddingIndex, IndexConfig,
    IndexError, Metric, Nearest, Neighbor, DEFAULT_DIMENSION,
};
pub use ledger::{normalize_wallet, IdentityBinding, IdentityLedger, LedgerError};
pub use store::{BackendConfig, InMemoryBackend, SnapshotBackend, StoreError};

use thiserror::Error;

/// Errors raised while assembling a service from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Open (or create) the persisted state described by `config` and return a
/// ready service. Index, ledger and commitment journal share one backend.
pub fn build_service(config: &FaceAuthConfig) -> Result<FaceAuthService, BuildError> {
    config.validate()?;
    let backend = config.backend_config().build()?;
    let service = FaceAuthService::open(backend, config.index_config(), config.auth_config())?
        .with_commitment_builder(config.commitment_builder());

    let stats = service.stats();
    tracing::info!(
        enrolled = stats.enrolled_identities,
        wallets = stats.bound_wallets,
        metric = ?stats.metric,
        "service_ready"
    );
    Ok(service)
}
