use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use commitment::{commit_with_salt, CommitmentBuilder};
use index::{EmbeddingIndex, IndexConfig};
use ledger::{normalize_wallet, IdentityBinding, IdentityLedger};
use store::SnapshotBackend;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    FaceEmbeddingExtractor, LedgerClient, LivenessDetector, LivenessResult,
};
use crate::journal::JournalLedgerClient;
use crate::metrics::metrics_recorder;
use crate::types::{
    AuthConfig, AuthDecision, AuthError, AuthResult, CommitmentAudit, EnrollReceipt, ServiceStats,
};


/// Enrollment and authentication over one index, one ledger and one
/// external commitment store.
pub struct FaceAuthService {
    index: EmbeddingIndex,
    ledger: IdentityLedger,
    commitments: CommitmentBuilder,
    ledger_client: Arc<dyn LedgerClient>,
    cfg: AuthConfig,
    enroll_lock: Mutex<()>,
}

impl FaceAuthService {
    /// Assemble a service from already opened stores.
    pub fn new(
        index: EmbeddingIndex,
        ledger: IdentityLedger,
        ledger_client: Arc<dyn LedgerClient>,
        cfg: AuthConfig,
    ) -> Result<Self, AuthError> {
        cfg.validate()?;
        Ok(Self {
            index,
            ledger,
            commitments: CommitmentBuilder::new(),
            ledger_client,
            cfg,
            enroll_lock: Mutex::new(()),
        })
    }

    /// Open the index, the ledger and a local commitment journal that all
    /// share `backend`.
    pub fn open(
        backend: Arc<dyn SnapshotBackend>,
        index_cfg: IndexConfig,
        cfg: AuthConfig,
    ) -> Result<Self, AuthError> {
        let index = EmbeddingIndex::open(index_cfg, backend.clone())?;
        let ledger = IdentityLedger::open(backend.clone())?;
        let journal = Arc::new(JournalLedgerClient::new(backend));
        Self::new(index, ledger, journal, cfg)
    }

    /// Ephemeral service for tests and demos.
    pub fn in_memory(index_cfg: IndexConfig, cfg: AuthConfig) -> Result<Self, AuthError> {
        Self::new(
            EmbeddingIndex::in_memory(index_cfg)?,
            IdentityLedger::in_memory(),
            Arc::new(JournalLedgerClient::in_memory()),
            cfg,
        )
    }

    pub fn with_commitment_builder(mut self, builder: CommitmentBuilder) -> Self {
        self.commitments = builder;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.cfg
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn ledger(&self) -> &IdentityLedger {
        &self.ledger
    }

    /// Enroll `embedding` as a new identity and bind `wallet` to it.
    ///
    /// The steps run in a fixed order: index insert, commitment, external
    /// commitment write, retiring the identity the wallet was previously
    /// bound to, then the binding. Any failure abandons the enroll and
    /// removes the freshly inserted vector again.
    ///
    /// A vector that no wallet owns never authenticates, so a failed
    /// rollback cannot open a path around the ownership check; such
    /// leftovers are pruned by the next successful enroll.
    pub fn enroll(&self, wallet: &str, embedding: &[f32]) -> Result<EnrollReceipt, AuthError> {
        let start = Instant::now();
        let wallet = normalize_wallet(wallet)?;
        let result = self.enroll_inner(&wallet, embedding);

        let latency = start.elapsed();
        if let Some(recorder) = metrics_recorder() {
            recorder.record_enroll(&wallet, latency, result.is_ok());
        }
        match &result {
            Ok(receipt) => info!(
                wallet = %wallet,
                identity_id = %receipt.identity_id,
                replaced = ?receipt.replaced_identity,
                elapsed_micros = latency.as_micros(),
                "enroll_success"
            ),
            Err(err) => warn!(wallet = %wallet, error = %err, "enroll_failure"),
        }
        result
    }

    fn enroll_inner(&self, wallet: &str, embedding: &[f32]) -> Result<EnrollReceipt, AuthError> {
        let _guard = self.lock_enroll();
        let previous = self.ledger.get(wallet);

        let identity_id = Uuid::new_v4().to_string();
        let embedding_digest = self.index.add(&identity_id, embedding)?;

        let commitment = match self.commitments.build(&embedding_digest) {
            Ok(c) => c,
            Err(err) => return self.abort_enroll(&identity_id, err.into()),
        };

        let transaction_id = match self
            .ledger_client
            .set_commitment(wallet, &commitment.commitment_hash)
        {
            Ok(tx) => tx,
            Err(err) => {
                warn!(wallet, error = %err, "enroll_ledger_write_failure");
                return self.abort_enroll(&identity_id, AuthError::LedgerWrite(err));
            }
        };

        // Retire before rebinding. If the bind below fails, the wallet is left
        // pointing at a vector that no longer exists and cannot authenticate
        // until it enrolls again.
        if let Some(old) = &previous {
            if let Err(err) = self.index.remove(&old.identity_id) {
                warn!(
                    wallet,
                    identity_id = %old.identity_id,
                    error = %err,
                    "enroll_retire_failure"
                );
                return self.abort_enroll(&identity_id, err.into());
            }
        }

        let replaced = match self.ledger.bind(
            wallet,
            &identity_id,
            &embedding_digest,
            &commitment.salt,
        ) {
            Ok(replaced) => replaced,
            Err(err) => return self.abort_enroll(&identity_id, err.into()),
        };

        if self.index.len() != self.ledger.len() {
            if let Err(err) = self.prune_unowned() {
                warn!(wallet, error = %err, "enroll_prune_failure");
            }
        }

        Ok(EnrollReceipt {
            wallet: wallet.to_string(),
            identity_id,
            embedding_digest,
            commitment_hash: commitment.commitment_hash,
            salt: commitment.salt,
            transaction_id,
            replaced_identity: replaced.map(|old| old.identity_id),
        })
    }

    /// Extract an embedding from `image` and enroll it.
    pub fn enroll_capture(
        &self,
        wallet: &str,
        image: &[u8],
        extractor: &dyn FaceEmbeddingExtractor,
    ) -> Result<EnrollReceipt, AuthError> {
        let embedding = extractor
            .embed(image)
            .map_err(AuthError::Collaborator)?
            .ok_or(AuthError::NoFaceDetected)?;
        self.enroll(wallet, &embedding)
    }

    /// Decide whether `embedding`, captured under `liveness`, authenticates
    /// `wallet`.
    ///
    /// Checks run strictly in order and the first failing one decides:
    /// liveness, presence of an embedding, similarity threshold, then
    /// ownership (a wallet bound to a different identity than the matched
    /// one is rejected as impersonation). Rejections are returned as
    /// `Ok(AuthResult)` with `passed == false`.
    pub fn authenticate(
        &self,
        wallet: &str,
        embedding: Option<&[f32]>,
        liveness: &LivenessResult,
    ) -> Result<AuthResult, AuthError> {
        let start = Instant::now();
        let result = self.decide(wallet, embedding, liveness)?;
        let wallet = wallet.trim().to_lowercase();

        let latency = start.elapsed();
        if let Some(recorder) = metrics_recorder() {
            recorder.record_authenticate(&wallet, result.decision, latency);
        }
        info!(
            wallet = %wallet,
            decision = ?result.decision,
            score = result.score,
            elapsed_micros = latency.as_micros(),
            "authenticate_decision"
        );
        Ok(result)
    }

    fn decide(
        &self,
        wallet: &str,
        embedding: Option<&[f32]>,
        liveness: &LivenessResult,
    ) -> Result<AuthResult, AuthError> {
        if !self.cfg.passes_liveness(liveness) {
            return Ok(AuthResult::rejected(AuthDecision::LivenessRejected, 0.0));
        }

        let Some(embedding) = embedding else {
            return Ok(AuthResult::rejected(AuthDecision::NoFaceOrNoEmbedding, 0.0));
        };

        let wallet = normalize_wallet(wallet)?;
        let nearest = self.index.nearest(embedding)?;
        let matched = match nearest.identity_id {
            Some(id) if self.cfg.accepts(self.index.metric(), nearest.score) => id,
            _ => return Ok(AuthResult::rejected(AuthDecision::NoMatch, nearest.score)),
        };

        let Some(owner) = self.ledger.owner_of(&matched) else {
            warn!(wallet = %wallet, identity_id = %matched, "authenticate_unowned_match");
            return Ok(AuthResult::rejected(AuthDecision::NoMatch, nearest.score));
        };

        if owner != wallet && self.ledger.get(&wallet).is_some() {
            debug!(
                wallet = %wallet,
                owner = %owner,
                matched = %matched,
                "authenticate_identity_mismatch"
            );
            return Ok(AuthResult::rejected(
                AuthDecision::ImpersonationRejected,
                nearest.score,
            ));
        }

        Ok(AuthResult::authenticated(matched, nearest.score))
    }

    /// Run liveness on `image` and, if live, extract and authenticate.
    ///
    /// Embedding extraction is skipped entirely for a non-live capture.
    pub fn authenticate_capture(
        &self,
        wallet: &str,
        image: &[u8],
        liveness: &dyn LivenessDetector,
        extractor: &dyn FaceEmbeddingExtractor,
    ) -> Result<AuthResult, AuthError> {
        let verdict = liveness.check(image).map_err(AuthError::Collaborator)?;
        if !self.cfg.passes_liveness(&verdict) {
            return self.authenticate(wallet, None, &verdict);
        }
        let embedding = extractor.embed(image).map_err(AuthError::Collaborator)?;
        self.authenticate(wallet, embedding.as_deref(), &verdict)
    }

    pub fn get_binding(&self, wallet: &str) -> Option<IdentityBinding> {
        self.ledger.get(wallet)
    }

    /// Remove the wallet's enrolled vector, then its binding.
    ///
    /// Safe to retry: a repeated call finishes whichever step failed.
    pub fn unenroll(&self, wallet: &str) -> Result<Option<IdentityBinding>, AuthError> {
        let wallet = normalize_wallet(wallet)?;
        let _guard = self.lock_enroll();

        let Some(binding) = self.ledger.get(&wallet) else {
            return Ok(None);
        };
        self.index.remove(&binding.identity_id)?;
        let removed = self.ledger.unbind(&wallet)?;

        info!(wallet = %wallet, identity_id = %binding.identity_id, "unenroll_success");
        Ok(removed)
    }

    /// Compare the externally recorded commitment for `wallet` with the one
    /// implied by its local binding. Audit only; never consulted by
    /// [`authenticate`](Self::authenticate).
    pub fn audit_commitment(&self, wallet: &str) -> Result<CommitmentAudit, AuthError> {
        let wallet = normalize_wallet(wallet)?;
        let binding = self
            .ledger
            .get(&wallet)
            .ok_or_else(|| AuthError::WalletNotBound(wallet.clone()))?;

        let expected_commitment = commit_with_salt(&binding.embedding_digest, &binding.salt)?;
        let recorded_commitment = self
            .ledger_client
            .get_commitment(&wallet)
            .map_err(AuthError::Collaborator)?;
        let verified = recorded_commitment.as_deref().is_some_and(|recorded| {
            self.commitments
                .verify(&binding.embedding_digest, &binding.salt, recorded)
        });

        if !verified {
            warn!(wallet = %wallet, "commitment_audit_mismatch");
        }
        Ok(CommitmentAudit {
            wallet,
            identity_id: binding.identity_id,
            expected_commitment,
            recorded_commitment,
            verified,
        })
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            enrolled_identities: self.index.len(),
            bound_wallets: self.ledger.len(),
            dimension: self.index.dimension(),
            metric: self.index.metric(),
            ann_active: self.index.ann_active(),
        }
    }

    /// Remove every enrolled vector that no wallet is bound to. Returns how
    /// many were removed.
    pub fn prune_unowned_vectors(&self) -> Result<usize, AuthError> {
        let _guard = self.lock_enroll();
        self.prune_unowned()
    }

    fn prune_unowned(&self) -> Result<usize, AuthError> {
        let mut pruned = 0;
        for identity_id in self.index.identities() {
            if self.ledger.owner_of(&identity_id).is_none() {
                self.index.remove(&identity_id)?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            info!(pruned, "unowned_vectors_pruned");
        }
        Ok(pruned)
    }

    fn abort_enroll<T>(&self, identity_id: &str, err: AuthError) -> Result<T, AuthError> {
        if let Err(rollback) = self.index.remove(identity_id) {
            warn!(identity_id, error = %rollback, "enroll_rollback_failure");
        }
        Err(err)
    }

    fn lock_enroll(&self) -> MutexGuard<'_, ()> {
        self.enroll_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FaceAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceAuthService")
            .field("index", &self.index)
            .field("ledger", &self.ledger)
            .field("cfg", &self.cfg)
            .finish()
    }
}
