//! # FaceAuth Engine (`engine`)
//!
//! ## Purpose
//!
//! `engine` composes the embedding index (`index`), the wallet binding
//! ledger (`ledger`) and the commitment builder (`commitment`) into the two
//! operations a face-authentication backend exposes:
//!
//! - **Enroll**: store a face embedding under a fresh identity, commit to
//!   its digest externally, and bind the wallet to it. Re-enrolling a wallet
//!   replaces its binding and retires the previous identity's vector.
//! - **Authenticate**: decide whether a capture belongs to the identity the
//!   wallet is bound to. The decision is fail-closed and evaluated in a fixed
//!   order; see [`AuthDecision`].
//!
//! Capture processing (face detection, embedding inference, anti-spoofing)
//! and the on-chain commitment store are external and reached through the
//! traits in [`collaborators`]. [`JournalLedgerClient`] is a local stand-in
//! for the chain.
//!
//! ## Example Usage
//!
//! ```
//! use engine::{AuthConfig, AuthDecision, FaceAuthService, LivenessResult};
//! use index::IndexConfig;
//!
//! let service = FaceAuthService::in_memory(
//!     IndexConfig::new().with_dimension(4),
//!     AuthConfig::default(),
//! )
//! .unwrap();
//!
//! let receipt = service.enroll("0xWallet", &[0.9, 0.1, 0.0, 0.2]).unwrap();
//!
//! let live = LivenessResult::live(0.98);
//! let result = service
//!     .authenticate("0xwallet", Some(&[0.88, 0.12, 0.01, 0.2]), &live)
//!     .unwrap();
//! assert!(result.passed);
//! assert_eq!(result.identity_id, Some(receipt.identity_id));
//!
//! let spoof = LivenessResult::spoof(0.91);
//! let result = service
//!     .authenticate("0xwallet", Some(&[0.9, 0.1, 0.0, 0.2]), &spoof)
//!     .unwrap();
//! assert_eq!(result.decision, AuthDecision::LivenessRejected);
//! ```
//!
//! ## Observability
//!
//! Every enrollment and verdict is logged through `tracing`
//! (`enroll_success`, `authenticate_decision`, ...). Install an
//! [`AuthMetrics`] implementation via [`set_auth_metrics`] to additionally
//! record latencies and decisions in a metrics backend.

pub mod collaborators;
pub mod engine;
pub mod journal;
pub mod metrics;
pub mod types;

pub use crate::collaborators::{
    CollaboratorError, FaceEmbeddingExtractor, LedgerClient, LivenessDetector, LivenessResult,
    TransactionId,
};
pub use crate::engine::FaceAuthService;
pub use crate::journal::JournalLedgerClient;
pub use crate::metrics::{set_auth_metrics, AuthMetrics};
pub use crate::types::{
    AuthConfig, AuthDecision, AuthError, AuthResult, CommitmentAudit, EnrollReceipt, ServiceStats,
};
