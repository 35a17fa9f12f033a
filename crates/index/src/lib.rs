//! # FaceAuth Index
//!
//! Persistent nearest-neighbor store over fixed-dimension face embeddings.
//!
//! ## Core Features
//!
//! - **Metrics**: [`Metric::Cosine`] L2-normalizes every stored and queried
//!   vector and scores with the inner product, so scores are cosine
//!   similarities in [-1, 1] (higher is better). [`Metric::Euclidean`] keeps
//!   vectors raw and scores with the squared L2 distance (lower is better).
//! - **Audit digest**: [`EmbeddingIndex::add`] returns the SHA-256 of the
//!   *raw* vector bytes, independent of normalization (see [`embedding_digest`]).
//! - **Synchronous persistence**: every mutation rewrites the index blob and
//!   the position → identity map through a [`store::SnapshotBackend`] in one
//!   atomic write. The in-memory arena is only changed after that write
//!   succeeds, so a failed persist leaves the index exactly as it was.
//! - **Search**: exact linear scan, or HNSW once enabled and large enough
//!   (see [`ann`]).
//!
//! ## Concurrency
//!
//! The arena sits behind an `RwLock`. `add` and `remove` hold the write lock
//! across persistence, so mutations are serialized process-wide; `search`
//! runs under the read lock and may proceed concurrently with other reads.
//!
//! ## Example Usage
//!
//! ```
//! use index::{EmbeddingIndex, IndexConfig};
//!
//! let index = EmbeddingIndex::in_memory(IndexConfig::new().with_dimension(3)).unwrap();
//! let digest = index.add("user-1", &[0.2, 0.1, 0.9]).unwrap();
//! assert_eq!(digest.len(), 64);
//!
//! let hit = index.nearest(&[0.2, 0.1, 0.9]).unwrap();
//! assert_eq!(hit.identity_id.as_deref(), Some("user-1"));
//! assert!((hit.score - 1.0).abs() < 1e-5);
//!
//! assert!(index.remove("user-1").unwrap());
//! assert!(index.nearest(&[0.2, 0.1, 0.9]).unwrap().identity_id.is_none());
//! ```

pub mod ann;
mod digest;
mod normalize;
mod snapshot;

pub use crate::ann::AnnConfig;
pub use crate::digest::embedding_digest;
pub use crate::normalize::NORM_EPSILON;
pub use crate::snapshot::{CompressionCodec, CompressionConfig, INDEX_SCHEMA_VERSION};

use crate::ann::VectorArena;
use crate::normalize::l2_normalize_in_place;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use store::{InMemoryBackend, SnapshotBackend, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Embedding width produced by the face model (InceptionResnetV1 / FaceNet).
pub const DEFAULT_DIMENSION: usize = 512;

/// Similarity metric used for storage and search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity via normalized inner product; higher is better.
    #[default]
    Cosine,
    /// Squared Euclidean distance over raw vectors; lower is better.
    Euclidean,
}

impl Metric {
    /// Whether a larger score means a closer match.
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Metric::Cosine)
    }
}

/// Config for initializing the index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Exact vector length accepted by `add` and `search`.
    pub dimension: usize,
    /// Similarity metric.
    pub metric: Metric,
    /// Compression for the persisted index blob.
    pub compression: CompressionConfig,
    /// Approximate search configuration.
    pub ann: AnnConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            metric: Metric::default(),
            compression: CompressionConfig::default(),
            ann: AnnConfig::default(),
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.dimension == 0 {
            return Err(IndexError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        if self.ann.enabled && self.ann.m == 0 {
            return Err(IndexError::InvalidConfig("ann.m must be >= 1".into()));
        }
        Ok(())
    }
}

/// Errors produced by the embedding index.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("vector component {0} is not finite")]
    NonFiniteComponent(usize),
    #[error("identity `{0}` is already enrolled")]
    DuplicateIdentity(String),
    #[error("invalid index config: {0}")]
    InvalidConfig(String),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    #[error("incompatible snapshot: {0}")]
    IncompatibleSnapshot(String),
    #[error("serialization encode error: {0}")]
    Encode(String),
    #[error("serialization decode error: {0}")]
    Decode(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub identity_id: String,
    /// Cosine similarity, or squared L2 distance under [`Metric::Euclidean`].
    pub score: f32,
}

/// Best match for a query; `identity_id` is `None` on an empty index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nearest {
    pub identity_id: Option<String>,
    pub score: f32,
}

impl Nearest {
    /// The defined "no enrollments yet" result.
    pub fn none() -> Self {
        Self {
            identity_id: None,
            score: 0.0,
        }
    }
}

/// Persistent embedding index.
pub struct EmbeddingIndex {
    cfg: IndexConfig,
    backend: Arc<dyn SnapshotBackend>,
    arena: RwLock<VectorArena>,
}

impl EmbeddingIndex {
    /// Open the index, loading any snapshot already present in `backend`.
    pub fn open(cfg: IndexConfig, backend: Arc<dyn SnapshotBackend>) -> Result<Self, IndexError> {
        cfg.validate()?;

        let arena = match snapshot::load_snapshot(backend.as_ref(), &cfg)? {
            Some((ids, vectors)) => {
                VectorArena::from_parts(cfg.dimension, cfg.metric, cfg.ann, ids, vectors)?
            }
            None => VectorArena::new(cfg.dimension, cfg.metric, cfg.ann),
        };
        info!(
            enrolled = arena.len(),
            dimension = cfg.dimension,
            metric = ?cfg.metric,
            "index_opened"
        );

        Ok(Self {
            cfg,
            backend,
            arena: RwLock::new(arena),
        })
    }

    /// Build an empty index over a private in-memory backend.
    pub fn in_memory(cfg: IndexConfig) -> Result<Self, IndexError> {
        cfg.validate()?;
        let arena = VectorArena::new(cfg.dimension, cfg.metric, cfg.ann);
        Ok(Self {
            cfg,
            backend: Arc::new(InMemoryBackend::new()),
            arena: RwLock::new(arena),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    pub fn metric(&self) -> Metric {
        self.cfg.metric
    }

    pub fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    /// Number of enrolled vectors.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, identity_id: &str) -> bool {
        self.read().position(identity_id).is_some()
    }

    /// Whether searches currently go through the HNSW graph.
    pub fn ann_active(&self) -> bool {
        let arena = self.read();
        arena.has_graph() && self.cfg.ann.should_use_ann(arena.len())
    }

    /// Identity ids in index-position order.
    pub fn identities(&self) -> Vec<String> {
        self.read().ids().to_vec()
    }

    /// Insert `vector` under `identity_id` and return the raw-vector digest.
    ///
    /// The snapshot is persisted before this returns; if that fails the
    /// index is left unchanged and the error is surfaced.
    pub fn add(&self, identity_id: &str, vector: &[f32]) -> Result<String, IndexError> {
        let start = Instant::now();
        self.check_vector(vector)?;
        let digest = embedding_digest(vector);
        let stored = self.to_search_form(vector);

        let mut arena = self.write();
        if arena.position(identity_id).is_some() {
            return Err(IndexError::DuplicateIdentity(identity_id.to_string()));
        }

        let mut ids: Vec<&str> = arena.ids().iter().map(String::as_str).collect();
        ids.push(identity_id);
        let mut vectors: Vec<&[f32]> = arena.vectors().iter().map(Vec::as_slice).collect();
        vectors.push(&stored);
        self.persist(ids, vectors)?;

        arena.push(identity_id.to_string(), stored);
        info!(
            identity_id,
            enrolled = arena.len(),
            elapsed_micros = start.elapsed().as_micros(),
            "index_add"
        );
        Ok(digest)
    }

    /// Top-`k` neighbors of `query`, best first. Empty on an empty index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_vector(query)?;
        let query = self.to_search_form(query);

        let arena = self.read();
        let hits = arena
            .search(&query, k)
            .into_iter()
            .filter_map(|(pos, score)| {
                arena.id_at(pos).map(|id| Neighbor {
                    identity_id: id.to_string(),
                    score,
                })
            })
            .collect();
        Ok(hits)
    }

    /// Single best match (`k = 1`); `(None, 0.0)` on an empty index.
    pub fn nearest(&self, query: &[f32]) -> Result<Nearest, IndexError> {
        let best = self.search(query, 1)?.into_iter().next();
        Ok(match best {
            Some(hit) => Nearest {
                identity_id: Some(hit.identity_id),
                score: hit.score,
            },
            None => Nearest::none(),
        })
    }

    /// Remove `identity_id`; `Ok(false)` when it is not enrolled.
    ///
    /// Rebuilds the arena from the retained vectors, O(n) in the number of
    /// enrollments.
    pub fn remove(&self, identity_id: &str) -> Result<bool, IndexError> {
        let start = Instant::now();
        let mut arena = self.write();
        let Some(position) = arena.position(identity_id) else {
            debug!(identity_id, "index_remove_unknown");
            return Ok(false);
        };

        let ids: Vec<&str> = arena
            .ids()
            .iter()
            .enumerate()
            .filter(|(pos, _)| *pos != position)
            .map(|(_, id)| id.as_str())
            .collect();
        let vectors: Vec<&[f32]> = arena
            .vectors()
            .iter()
            .enumerate()
            .filter(|(pos, _)| *pos != position)
            .map(|(_, v)| v.as_slice())
            .collect();
        self.persist(ids, vectors)?;

        arena.remove_at(position);
        info!(
            identity_id,
            enrolled = arena.len(),
            elapsed_micros = start.elapsed().as_micros(),
            "index_remove"
        );
        Ok(true)
    }

    fn persist(&self, ids: Vec<&str>, vectors: Vec<&[f32]>) -> Result<(), IndexError> {
        let entries = snapshot::encode_snapshot(&self.cfg, ids, vectors)?;
        self.backend.put_many(entries).map_err(|err| {
            warn!(error = %err, "index_persist_failure");
            IndexError::Persistence(err)
        })
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.cfg.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.cfg.dimension,
                got: vector.len(),
            });
        }
        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(IndexError::NonFiniteComponent(pos));
        }
        Ok(())
    }

    fn to_search_form(&self, vector: &[f32]) -> Vec<f32> {
        let mut out = vector.to_vec();
        if self.cfg.metric == Metric::Cosine {
            l2_normalize_in_place(&mut out);
        }
        out
    }

    fn read(&self) -> RwLockReadGuard<'_, VectorArena> {
        self.arena
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VectorArena> {
        self.arena
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.read();
        f.debug_struct("EmbeddingIndex")
            .field("dimension", &arena.dimension())
            .field("metric", &self.cfg.metric)
            .field("enrolled", &arena.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::testing::FlakyBackend;

    fn cfg(dim: usize) -> IndexConfig {
        IndexConfig::new().with_dimension(dim)
    }

    fn wave(dim: usize, phase: f32) -> Vec<f32> {
        (0..dim).map(|i| (i as f32 * 0.13 + phase).sin()).collect()
    }

    #[test]
    fn self_match_scores_one_under_cosine() {
        let index = EmbeddingIndex::in_memory(cfg(DEFAULT_DIMENSION)).unwrap();
        let e = wave(DEFAULT_DIMENSION, 0.4);
        index.add("id-a", &e).unwrap();

        let hit = index.nearest(&e).unwrap();
        assert_eq!(hit.identity_id.as_deref(), Some("id-a"));
        assert!((hit.score - 1.0).abs() < 1e-5, "score = {}", hit.score);
    }

    #[test]
    fn empty_index_returns_none_and_zero() {
        let index = EmbeddingIndex::in_memory(cfg(4)).unwrap();
        let hit = index.nearest(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(hit, Nearest::none());
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_on_add_and_search() {
        let index = EmbeddingIndex::in_memory(cfg(4)).unwrap();
        assert_eq!(
            index.add("x", &[1.0, 2.0]),
            Err(IndexError::DimensionMismatch {
                expected: 4,
                got: 2
            })
        );
        assert!(matches!(
            index.nearest(&[1.0; 5]),
            Err(IndexError::DimensionMismatch { expected: 4, got: 5 })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        let index = EmbeddingIndex::in_memory(cfg(3)).unwrap();
        assert_eq!(
            index.add("x", &[1.0, f32::NAN, 0.0]),
            Err(IndexError::NonFiniteComponent(1))
        );
    }

    #[test]
    fn scores_stay_within_cosine_bounds() {
        let index = EmbeddingIndex::in_memory(cfg(16)).unwrap();
        for i in 0..12 {
            index.add(&format!("id-{i}"), &wave(16, i as f32)).unwrap();
        }
        for q in 0..20 {
            let query: Vec<f32> = wave(16, q as f32 * 0.7).iter().map(|v| v * -3.0).collect();
            for hit in index.search(&query, 12).unwrap() {
                assert!((-1.0..=1.0).contains(&hit.score), "score {}", hit.score);
            }
        }
    }

    #[test]
    fn digest_ignores_normalization() {
        let cosine = EmbeddingIndex::in_memory(cfg(3)).unwrap();
        let euclid = EmbeddingIndex::in_memory(cfg(3).with_metric(Metric::Euclidean)).unwrap();
        let v = [3.0, 4.0, 12.0];
        let d1 = cosine.add("a", &v).unwrap();
        let d2 = euclid.add("a", &v).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1, embedding_digest(&v));
    }

    #[test]
    fn deletion_law() {
        let index = EmbeddingIndex::in_memory(cfg(8)).unwrap();
        let e = wave(8, 1.0);
        index.add("keep", &wave(8, 2.5)).unwrap();
        index.add("drop", &e).unwrap();
        assert_eq!(index.len(), 2);

        assert!(index.remove("drop").unwrap());
        assert_eq!(index.len(), 1);
        let hits = index.search(&e, 10).unwrap();
        assert!(hits.iter().all(|h| h.identity_id != "drop"));

        assert!(!index.remove("drop").unwrap());
        assert!(!index.remove("never-added").unwrap());
        assert_eq!(index.len(), 1);
        assert_eq!(index.identities(), vec!["keep".to_string()]);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let index = EmbeddingIndex::in_memory(cfg(2)).unwrap();
        index.add("a", &[1.0, 0.0]).unwrap();
        assert_eq!(
            index.add("a", &[0.0, 1.0]),
            Err(IndexError::DuplicateIdentity("a".into()))
        );
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn euclidean_scores_are_squared_distances() {
        let index = EmbeddingIndex::in_memory(cfg(2).with_metric(Metric::Euclidean)).unwrap();
        index.add("origin", &[0.0, 0.0]).unwrap();
        index.add("far", &[10.0, 10.0]).unwrap();

        let hit = index.nearest(&[3.0, 4.0]).unwrap();
        assert_eq!(hit.identity_id.as_deref(), Some("origin"));
        assert!((hit.score - 25.0).abs() < 1e-4);
    }

    #[test]
    fn reopen_restores_enrollments() {
        let backend: Arc<dyn SnapshotBackend> = Arc::new(InMemoryBackend::new());
        let e = wave(32, 0.9);
        {
            let index = EmbeddingIndex::open(cfg(32), backend.clone()).unwrap();
            index.add("a", &wave(32, 0.1)).unwrap();
            index.add("b", &e).unwrap();
            index.remove("a").unwrap();
        }

        let reopened = EmbeddingIndex::open(cfg(32), backend).unwrap();
        assert_eq!(reopened.identities(), vec!["b".to_string()]);
        let hit = reopened.nearest(&e).unwrap();
        assert_eq!(hit.identity_id.as_deref(), Some("b"));
        assert!((hit.score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn failed_persist_leaves_index_unchanged() {
        let flaky = Arc::new(FlakyBackend::new());
        let index = EmbeddingIndex::open(cfg(2), flaky.clone()).unwrap();
        index.add("a", &[1.0, 0.0]).unwrap();

        flaky.set_fail_writes(true);
        assert!(matches!(
            index.add("b", &[0.0, 1.0]),
            Err(IndexError::Persistence(_))
        ));
        assert!(matches!(index.remove("a"), Err(IndexError::Persistence(_))));
        assert_eq!(index.identities(), vec!["a".to_string()]);

        flaky.set_fail_writes(false);
        let reopened = EmbeddingIndex::open(cfg(2), flaky).unwrap();
        assert_eq!(reopened.identities(), vec!["a".to_string()]);
    }

    #[test]
    fn zero_dimension_config_is_invalid() {
        let backend: Arc<dyn SnapshotBackend> = Arc::new(InMemoryBackend::new());
        assert!(matches!(
            EmbeddingIndex::open(cfg(0), backend),
            Err(IndexError::InvalidConfig(_))
        ));
        assert!(matches!(
            EmbeddingIndex::in_memory(cfg(0)),
            Err(IndexError::InvalidConfig(_))
        ));
    }
}
