//! Vector arena with exact and approximate (HNSW) nearest-neighbor search.
//!
//! The arena is the in-memory half of [`EmbeddingIndex`](crate::EmbeddingIndex):
//! a dense list of stored vectors addressed by position, plus the
//! position ↔ identity mapping. Stored vectors are already in their search
//! form (L2-normalized under [`Metric::Cosine`], raw under
//! [`Metric::Euclidean`]).
//!
//! ## Search strategy
//!
//! - **Linear scan** (default): exact, O(n) per query. Authoritative whenever
//!   the graph is absent.
//! - **HNSW** (`hnsw_rs`): sub-linear approximate search, used once ANN is
//!   enabled and the arena holds at least `min_vectors_for_ann` vectors.
//!   Typical recall is 95-99%, so a true best match can occasionally be missed.
//!
//! ## Deletion
//!
//! Neither representation supports deleting a row in place. Removing an
//! identity copies every retained vector into a fresh arena and rebuilds the
//! graph, which is O(n) (O(n log n) with the graph). This is the first
//! scaling bottleneck once enrollments reach the hundreds of thousands.

use crate::{IndexError, Metric};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Configuration for ANN graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    /// Default: 16
    pub m: usize,
    /// Size of dynamic candidate list during construction.
    /// Default: 200
    pub ef_construction: usize,
    /// Size of dynamic candidate list during search.
    /// Default: 50
    pub ef_search: usize,
    /// Whether to use ANN at all.
    /// Default: false (exact linear scan only)
    pub enabled: bool,
    /// Minimum number of vectors before the graph is built and used.
    /// Default: 1000
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            enabled: false,
            min_vectors_for_ann: 1000,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    /// Check if ANN should be used given the current arena size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

/// HNSW graph over the arena positions; one variant per metric.
enum Graph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    Euclidean(Hnsw<'static, f32, DistL2>),
}

impl Graph {
    fn build(metric: Metric, cfg: &AnnConfig, capacity: usize, vectors: &[Vec<f32>]) -> Self {
        let nb_layer = 16.min((capacity as f32).ln().trunc() as usize).max(1);
        let graph = match metric {
            Metric::Cosine => Graph::Cosine(Hnsw::<f32, DistCosine>::new(
                cfg.m,
                capacity,
                nb_layer,
                cfg.ef_construction,
                DistCosine {},
            )),
            Metric::Euclidean => Graph::Euclidean(Hnsw::<f32, DistL2>::new(
                cfg.m,
                capacity,
                nb_layer,
                cfg.ef_construction,
                DistL2 {},
            )),
        };

        let data: Vec<(&Vec<f32>, usize)> = vectors
            .iter()
            .enumerate()
            .map(|(pos, vec)| (vec, pos))
            .collect();
        match &graph {
            Graph::Cosine(hnsw) => hnsw.parallel_insert(&data),
            Graph::Euclidean(hnsw) => hnsw.parallel_insert(&data),
        }
        graph
    }

    fn insert(&self, vector: &Vec<f32>, position: usize) {
        let data = [(vector, position)];
        match self {
            Graph::Cosine(hnsw) => hnsw.parallel_insert(&data),
            Graph::Euclidean(hnsw) => hnsw.parallel_insert(&data),
        }
    }

    /// Candidate positions only. Graph distances are not reported as
    /// scores: `DistCosine` treats a zero-norm operand as distance 0.
    fn candidates(&self, query: &[f32], k: usize, ef: usize) -> Vec<usize> {
        let neighbours = match self {
            Graph::Cosine(hnsw) => hnsw.search(query, k, ef),
            Graph::Euclidean(hnsw) => hnsw.search(query, k, ef),
        };
        neighbours.into_iter().map(|n| n.get_origin_id()).collect()
    }
}

/// Dense vector storage keyed by a stable identity id.
pub(crate) struct VectorArena {
    metric: Metric,
    dimension: usize,
    config: AnnConfig,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    positions: HashMap<String, usize>,
    graph: Option<Graph>,
    graph_capacity: usize,
}

impl VectorArena {
    pub(crate) fn new(dimension: usize, metric: Metric, config: AnnConfig) -> Self {
        Self {
            metric,
            dimension,
            config,
            ids: Vec::new(),
            vectors: Vec::new(),
            positions: HashMap::new(),
            graph: None,
            graph_capacity: 0,
        }
    }

    /// Rebuild an arena from persisted parts, checking the id ↔ row invariant.
    pub(crate) fn from_parts(
        dimension: usize,
        metric: Metric,
        config: AnnConfig,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if ids.len() != vectors.len() {
            return Err(IndexError::CorruptSnapshot(format!(
                "id map holds {} entries but index holds {} vectors",
                ids.len(),
                vectors.len()
            )));
        }

        let mut positions = HashMap::with_capacity(ids.len());
        for (pos, (id, vec)) in ids.iter().zip(&vectors).enumerate() {
            if vec.len() != dimension {
                return Err(IndexError::CorruptSnapshot(format!(
                    "vector {pos} has dimension {}, expected {dimension}",
                    vec.len()
                )));
            }
            if positions.insert(id.clone(), pos).is_some() {
                return Err(IndexError::CorruptSnapshot(format!(
                    "identity `{id}` appears twice in the id map"
                )));
            }
        }

        let mut arena = Self {
            metric,
            dimension,
            config,
            ids,
            vectors,
            positions,
            graph: None,
            graph_capacity: 0,
        };
        arena.ensure_graph();
        Ok(arena)
    }

    pub(crate) fn len(&self) -> usize {
        self.vectors.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub(crate) fn dimension(&self) -> usize {
        self.dimension
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub(crate) fn id_at(&self, position: usize) -> Option<&str> {
        self.ids.get(position).map(String::as_str)
    }

    pub(crate) fn ids(&self) -> &[String] {
        &self.ids
    }

    pub(crate) fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub(crate) fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Append a vector already in search form. Callers check dimension and
    /// uniqueness first.
    pub(crate) fn push(&mut self, id: String, vector: Vec<f32>) {
        let position = self.vectors.len();
        self.positions.insert(id.clone(), position);
        self.ids.push(id);
        self.vectors.push(vector);

        let inserted = match &self.graph {
            Some(graph) if position < self.graph_capacity => {
                graph.insert(&self.vectors[position], position);
                true
            }
            _ => false,
        };
        if !inserted {
            // Graph missing or full: build at the new size.
            self.graph = None;
            self.graph_capacity = 0;
            self.ensure_graph();
        }
    }

    /// Drop the row at `position` by copying all other rows into a fresh
    /// arena. Returns the removed identity id.
    pub(crate) fn remove_at(&mut self, position: usize) -> Option<String> {
        if position >= self.vectors.len() {
            return None;
        }

        let old_ids = std::mem::take(&mut self.ids);
        let old_vectors = std::mem::take(&mut self.vectors);
        self.positions.clear();
        self.graph = None;
        self.graph_capacity = 0;

        let mut removed = None;
        for (pos, (id, vec)) in old_ids.into_iter().zip(old_vectors).enumerate() {
            if pos == position {
                removed = Some(id);
                continue;
            }
            self.positions.insert(id.clone(), self.ids.len());
            self.ids.push(id);
            self.vectors.push(vec);
        }

        self.ensure_graph();
        removed
    }

    /// Top-`k` `(position, score)` pairs, best first.
    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.vectors.is_empty() {
            return Vec::new();
        }

        match &self.graph {
            Some(graph) if self.config.should_use_ann(self.vectors.len()) => {
                // Re-score exactly so both search paths report the same value.
                let mut hits: Vec<(usize, f32)> = graph
                    .candidates(query, k, self.config.ef_search.max(k))
                    .into_iter()
                    .filter_map(|pos| {
                        let stored = self.vectors.get(pos)?;
                        Some((pos, self.metric.score(query, stored)))
                    })
                    .collect();
                self.metric.sort_best_first(&mut hits);
                hits
            }
            _ => self.linear_search(query, k),
        }
    }

    /// Exact scan. Ties keep insertion order (stable sort).
    fn linear_search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, vec)| (pos, self.metric.score(query, vec)))
            .collect();

        self.metric.sort_best_first(&mut scored);
        scored.truncate(k);
        scored
    }

    fn ensure_graph(&mut self) {
        if self.graph.is_some() || !self.config.should_use_ann(self.vectors.len()) {
            return;
        }
        let capacity = (self.vectors.len() * 2).max(self.config.min_vectors_for_ann);
        self.graph = Some(Graph::build(
            self.metric,
            &self.config,
            capacity,
            &self.vectors,
        ));
        self.graph_capacity = capacity;
        tracing::debug!(
            vectors = self.vectors.len(),
            capacity,
            "ann_graph_built"
        );
    }
}

impl Metric {
    /// Score two vectors already in search form.
    pub(crate) fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                dot.clamp(-1.0, 1.0)
            }
            Metric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
        }
    }

    fn sort_best_first(&self, hits: &mut [(usize, f32)]) {
        match self {
            Metric::Cosine => {
                hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
            }
            Metric::Euclidean => {
                hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_ann_config_defaults() {
        let config = AnnConfig::default();
        assert_eq!(config.m, 16);
        assert_eq!(config.ef_construction, 200);
        assert_eq!(config.ef_search, 50);
        assert!(!config.enabled);
        assert_eq!(config.min_vectors_for_ann, 1000);
    }

    #[test]
    fn test_should_use_ann() {
        let config = AnnConfig::default().with_enabled(true);
        assert!(config.should_use_ann(1000));
        assert!(!config.should_use_ann(999));

        let disabled = AnnConfig::default();
        assert!(!disabled.should_use_ann(10_000));
    }

    #[test]
    fn linear_search_orders_by_cosine() {
        let mut arena = VectorArena::new(3, Metric::Cosine, AnnConfig::default());
        arena.push("a".into(), unit(3, 0));
        arena.push("b".into(), unit(3, 1));
        arena.push("c".into(), vec![0.6, 0.8, 0.0]);

        let hits = arena.search(&[1.0, 0.0, 0.0], 3);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, 2);
        assert!((hits[1].1 - 0.6).abs() < 1e-6);
        assert_eq!(hits[2].0, 1);
    }

    #[test]
    fn linear_search_orders_by_squared_distance() {
        let mut arena = VectorArena::new(2, Metric::Euclidean, AnnConfig::default());
        arena.push("far".into(), vec![3.0, 4.0]);
        arena.push("near".into(), vec![1.0, 0.0]);

        let hits = arena.search(&[0.0, 0.0], 2);
        assert_eq!(arena.id_at(hits[0].0), Some("near"));
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert!((hits[1].1 - 25.0).abs() < 1e-4);
    }

    #[test]
    fn exact_ties_keep_insertion_order() {
        let mut arena = VectorArena::new(2, Metric::Cosine, AnnConfig::default());
        arena.push("first".into(), vec![1.0, 0.0]);
        arena.push("second".into(), vec![1.0, 0.0]);

        let hits = arena.search(&[1.0, 0.0], 1);
        assert_eq!(arena.id_at(hits[0].0), Some("first"));
    }

    #[test]
    fn remove_at_remaps_positions() {
        let mut arena = VectorArena::new(3, Metric::Cosine, AnnConfig::default());
        arena.push("a".into(), unit(3, 0));
        arena.push("b".into(), unit(3, 1));
        arena.push("c".into(), unit(3, 2));

        assert_eq!(arena.remove_at(1), Some("b".to_string()));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.position("a"), Some(0));
        assert_eq!(arena.position("c"), Some(1));
        assert_eq!(arena.position("b"), None);
        assert_eq!(arena.id_at(1), Some("c"));

        assert_eq!(arena.remove_at(5), None);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn from_parts_rejects_mismatched_lengths() {
        let result = VectorArena::from_parts(
            2,
            Metric::Cosine,
            AnnConfig::default(),
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 0.0]],
        );
        assert!(matches!(result, Err(IndexError::CorruptSnapshot(_))));
    }

    #[test]
    fn from_parts_rejects_duplicate_ids() {
        let result = VectorArena::from_parts(
            2,
            Metric::Cosine,
            AnnConfig::default(),
            vec!["a".into(), "a".into()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        );
        assert!(matches!(result, Err(IndexError::CorruptSnapshot(_))));
    }

    #[test]
    fn graph_is_built_once_threshold_is_reached() {
        let config = AnnConfig::default()
            .with_enabled(true)
            .with_min_vectors_for_ann(16);
        let mut arena = VectorArena::new(4, Metric::Cosine, config);

        for i in 0..15 {
            let angle = i as f32 * 0.1;
            arena.push(format!("id-{i}"), vec![angle.cos(), angle.sin(), 0.0, 0.0]);
        }
        assert!(!arena.has_graph());

        arena.push("id-15".into(), vec![0.0, 0.0, 1.0, 0.0]);
        assert!(arena.has_graph());

        let hits = arena.search(&[0.0, 0.0, 1.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(arena.id_at(hits[0].0), Some("id-15"));
        assert!((hits[0].1 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_query_scores_zero_on_both_paths() {
        let config = AnnConfig::default()
            .with_enabled(true)
            .with_min_vectors_for_ann(16);
        let mut graph_arena = VectorArena::new(4, Metric::Cosine, config);
        let mut scan_arena = VectorArena::new(4, Metric::Cosine, AnnConfig::default());
        for i in 0..20 {
            let angle = i as f32 * 0.3;
            let v = vec![angle.cos(), angle.sin(), 0.0, 0.0];
            graph_arena.push(format!("id-{i}"), v.clone());
            scan_arena.push(format!("id-{i}"), v);
        }
        assert!(graph_arena.has_graph());

        let zero = [0.0; 4];
        let graph_hits = graph_arena.search(&zero, 5);
        assert!(!graph_hits.is_empty());
        for (_, score) in graph_hits {
            assert_eq!(score, 0.0);
        }
        assert_eq!(scan_arena.search(&zero, 1)[0].1, 0.0);
    }

    #[test]
    fn graph_scores_match_exact_scores() {
        let config = AnnConfig::default()
            .with_enabled(true)
            .with_min_vectors_for_ann(8);
        let mut arena = VectorArena::new(3, Metric::Euclidean, config);
        for i in 0..12 {
            arena.push(format!("id-{i}"), vec![i as f32, 1.0, -1.0]);
        }
        assert!(arena.has_graph());

        let query = [2.5, 1.0, -1.0];
        for (pos, score) in arena.search(&query, 3) {
            let exact = Metric::Euclidean.score(&query, &arena.vectors()[pos]);
            assert_eq!(score, exact);
        }
    }
}
