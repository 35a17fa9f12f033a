use commitment::CommitmentError;
use index::{IndexError, Metric};
use ledger::LedgerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::{CollaboratorError, LivenessResult};

/// Decision thresholds for [`FaceAuthService`](crate::FaceAuthService).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Minimum cosine similarity accepted as a match.
    pub similarity_threshold: f32,
    /// Maximum squared L2 distance accepted as a match (euclidean indexes).
    pub max_distance: f32,
    /// Live captures below this detector confidence are rejected.
    pub min_liveness_confidence: f32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            max_distance: 1.0,
            min_liveness_confidence: 0.0,
        }
    }
}

impl AuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_min_liveness_confidence(mut self, confidence: f32) -> Self {
        self.min_liveness_confidence = confidence;
        self
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AuthError::InvalidConfig(
                "similarity_threshold must be between -1.0 and 1.0".into(),
            ));
        }
        if !self.max_distance.is_finite() || self.max_distance < 0.0 {
            return Err(AuthError::InvalidConfig(
                "max_distance must be a finite value >= 0.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_liveness_confidence) {
            return Err(AuthError::InvalidConfig(
                "min_liveness_confidence must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }

    /// Whether a capture clears the liveness gate. A NaN confidence never
    /// does.
    pub fn passes_liveness(&self, liveness: &LivenessResult) -> bool {
        liveness.is_live && liveness.confidence >= self.min_liveness_confidence
    }

    /// Whether `score` clears the threshold for `metric`.
    pub fn accepts(&self, metric: Metric, score: f32) -> bool {
        match metric {
            Metric::Cosine => score >= self.similarity_threshold,
            Metric::Euclidean => score <= self.max_distance,
        }
    }
}

/// Verdict of one authentication attempt, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthDecision {
    LivenessRejected,
    NoFaceOrNoEmbedding,
    NoMatch,
    ImpersonationRejected,
    Authenticated,
}

impl AuthDecision {
    pub fn passed(&self) -> bool {
        matches!(self, AuthDecision::Authenticated)
    }

    /// Human-readable reason reported alongside the verdict.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthDecision::LivenessRejected => "Liveness check failed",
            AuthDecision::NoFaceOrNoEmbedding => "No face detected",
            AuthDecision::NoMatch => "Not matched",
            AuthDecision::ImpersonationRejected => "Face matches another enrolled identity",
            AuthDecision::Authenticated => "Authenticated",
        }
    }
}

/// Result of [`FaceAuthService::authenticate`](crate::FaceAuthService::authenticate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Matched identity; only set when `passed`.
    pub identity_id: Option<String>,
    /// Best similarity score seen (0.0 when no search ran).
    pub score: f32,
    pub passed: bool,
    pub decision: AuthDecision,
    pub reason: String,
}

impl AuthResult {
    pub(crate) fn rejected(decision: AuthDecision, score: f32) -> Self {
        Self {
            identity_id: None,
            score,
            passed: false,
            decision,
            reason: decision.reason().to_string(),
        }
    }

    pub(crate) fn authenticated(identity_id: String, score: f32) -> Self {
        Self {
            identity_id: Some(identity_id),
            score,
            passed: true,
            decision: AuthDecision::Authenticated,
            reason: AuthDecision::Authenticated.reason().to_string(),
        }
    }
}

/// Everything produced by a successful enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollReceipt {
    pub wallet: String,
    pub identity_id: String,
    pub embedding_digest: String,
    pub commitment_hash: String,
    pub salt: String,
    pub transaction_id: String,
    /// Identity previously bound to the wallet, now retired.
    pub replaced_identity: Option<String>,
}

/// Comparison of the externally recorded commitment with the local binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentAudit {
    pub wallet: String,
    pub identity_id: String,
    /// Commitment recomputed from the bound digest and salt.
    pub expected_commitment: String,
    /// Commitment reported by the ledger client, if any.
    pub recorded_commitment: Option<String>,
    pub verified: bool,
}

/// Point-in-time counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub enrolled_identities: usize,
    pub bound_wallets: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub ann_active: bool,
}

/// Errors produced by the engine.
///
/// Rejections (no match, impersonation, failed liveness) are not errors;
/// they come back as an [`AuthResult`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid auth config: {0}")]
    InvalidConfig(String),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("commitment error: {0}")]
    Commitment(#[from] CommitmentError),
    /// The external commitment write failed; nothing was enrolled.
    #[error("on-chain commit failed: {0}")]
    LedgerWrite(CollaboratorError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("wallet `{0}` is not bound to an identity")]
    WalletNotBound(String),
    #[error("collaborator error: {0}")]
    Collaborator(CollaboratorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = AuthConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.similarity_threshold, 0.6);
    }

    #[test]
    fn liveness_gate_fails_closed_on_nan() {
        let cfg = AuthConfig::new().with_min_liveness_confidence(0.5);
        assert!(cfg.passes_liveness(&LivenessResult::live(0.5)));
        assert!(!cfg.passes_liveness(&LivenessResult::live(0.49)));
        assert!(!cfg.passes_liveness(&LivenessResult::live(f32::NAN)));
        assert!(!cfg.passes_liveness(&LivenessResult::spoof(0.99)));

        // Even with no floor configured.
        let open = AuthConfig::default();
        assert!(!open.passes_liveness(&LivenessResult::live(f32::NAN)));
        assert!(open.passes_liveness(&LivenessResult::live(0.0)));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let cfg = AuthConfig::new().with_similarity_threshold(1.5);
        let err = cfg.validate().expect_err("config should be invalid");
        match err {
            AuthError::InvalidConfig(msg) => assert!(msg.contains("similarity_threshold")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_distance_rejected() {
        let cfg = AuthConfig::new().with_max_distance(-0.1);
        assert!(matches!(cfg.validate(), Err(AuthError::InvalidConfig(_))));
    }

    #[test]
    fn threshold_direction_follows_metric() {
        let cfg = AuthConfig::default();
        assert!(cfg.accepts(Metric::Cosine, 0.6));
        assert!(!cfg.accepts(Metric::Cosine, 0.59));
        assert!(cfg.accepts(Metric::Euclidean, 0.5));
        assert!(!cfg.accepts(Metric::Euclidean, 1.5));
    }

    #[test]
    fn only_authenticated_passes() {
        assert!(AuthDecision::Authenticated.passed());
        assert!(!AuthDecision::ImpersonationRejected.passed());
        assert_eq!(AuthDecision::NoMatch.reason(), "Not matched");
    }

    #[test]
    fn decision_serializes_snake_case() {
        let json = serde_json::to_string(&AuthDecision::ImpersonationRejected).unwrap();
        assert_eq!(json, "\"impersonation_rejected\"");
    }
}
