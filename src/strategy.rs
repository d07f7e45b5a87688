//! Retrieval systems under comparison.
//!
//! Every system implements [`RetrievalStrategy`] and is registered in a
//! [`SystemRegistry`]; metric code iterates the registry and never names a
//! concrete system, so adding one touches nothing in the pipeline.
//! Registration order is preserved; it is the deterministic tie-break for
//! the combined ranking.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::Retrieval;
use crate::error::EvalError;
use crate::types::{ItemId, RankedResult, ScoredItem};

/// A named retrieval system: ranks the catalogue against a query.
pub trait RetrievalStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn rank(&self, query: &str, n: usize) -> Result<RankedResult, EvalError>;
}

/// Ordered collection of registered systems.
#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<Arc<dyn RetrievalStrategy>>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, system: Arc<dyn RetrievalStrategy>) -> Result<(), EvalError> {
        if self.get(system.name()).is_some() {
            return Err(EvalError::InvalidConfig(format!(
                "duplicate retrieval system '{}'",
                system.name()
            )));
        }
        self.systems.push(system);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RetrievalStrategy>> {
        self.systems.iter().find(|s| s.name() == name)
    }

    /// Systems in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RetrievalStrategy>> {
        self.systems.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

/// A feature-table-backed system: delegates to the engine's exact cosine
/// retrieval for one representation name.
pub struct FeatureStrategy {
    representation: String,
    engine: Arc<Retrieval>,
}

impl FeatureStrategy {
    pub fn new(representation: impl Into<String>, engine: Arc<Retrieval>) -> Self {
        Self {
            representation: representation.into(),
            engine,
        }
    }
}

impl RetrievalStrategy for FeatureStrategy {
    fn name(&self) -> &str {
        &self.representation
    }

    fn rank(&self, query: &str, n: usize) -> Result<RankedResult, EvalError> {
        self.engine.top_similar(query, &self.representation, n)
    }
}

pub const RANDOM_BASELINE_NAME: &str = "random_baseline";

/// Uniform random retrieval, the floor every real system must clear.
pub struct RandomBaseline {
    engine: Arc<Retrieval>,
}

impl RandomBaseline {
    pub fn new(engine: Arc<Retrieval>) -> Self {
        Self { engine }
    }
}

impl RetrievalStrategy for RandomBaseline {
    fn name(&self) -> &str {
        RANDOM_BASELINE_NAME
    }

    fn rank(&self, query: &str, n: usize) -> Result<RankedResult, EvalError> {
        Ok(self.engine.random_baseline(query, n))
    }
}

/// How a [`LateFusion`] system combines its members' results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// Weighted sum of similarity scores, sorted descending.
    #[default]
    Score,
    /// Weighted sum of ranks (ties share their mean rank), sorted
    /// ascending.
    Rank,
}

/// Combines two systems' ranked results over the union of items each
/// ranked, filling missing scores with 0 before combining.
pub struct LateFusion {
    name: String,
    a: Arc<dyn RetrievalStrategy>,
    b: Arc<dyn RetrievalStrategy>,
    method: FusionMethod,
    weight_a: f32,
    weight_b: f32,
}

impl LateFusion {
    pub fn new(
        name: impl Into<String>,
        a: Arc<dyn RetrievalStrategy>,
        b: Arc<dyn RetrievalStrategy>,
        method: FusionMethod,
        weight_a: f32,
        weight_b: f32,
    ) -> Self {
        Self {
            name: name.into(),
            a,
            b,
            method,
            weight_a,
            weight_b,
        }
    }

    fn union_scores(
        result_a: &RankedResult,
        result_b: &RankedResult,
    ) -> BTreeMap<ItemId, (f32, f32)> {
        // BTreeMap keeps the union in id order, so downstream stable
        // sorts break ties identically on every run.
        let mut union: BTreeMap<ItemId, (f32, f32)> = BTreeMap::new();
        for item in result_a {
            union.entry(item.id.clone()).or_insert((0.0, 0.0)).0 = item.similarity;
        }
        for item in result_b {
            union.entry(item.id.clone()).or_insert((0.0, 0.0)).1 = item.similarity;
        }
        union
    }

    fn fuse_by_score(&self, union: BTreeMap<ItemId, (f32, f32)>, n: usize) -> RankedResult {
        let mut fused: RankedResult = union
            .into_iter()
            .map(|(id, (score_a, score_b))| {
                ScoredItem::new(id, self.weight_a * score_a + self.weight_b * score_b)
            })
            .collect();
        fused.sort_by(|x, y| {
            y.similarity
                .partial_cmp(&x.similarity)
                .unwrap_or(Ordering::Equal)
        });
        fused.truncate(n);
        fused
    }

    fn fuse_by_rank(&self, union: BTreeMap<ItemId, (f32, f32)>, n: usize) -> RankedResult {
        let ids: Vec<&ItemId> = union.keys().collect();
        let scores_a: Vec<f32> = union.values().map(|(a, _)| *a).collect();
        let scores_b: Vec<f32> = union.values().map(|(_, b)| *b).collect();
        let ranks_a = mean_ranks(&scores_a);
        let ranks_b = mean_ranks(&scores_b);

        let mut fused: Vec<(ItemId, f32)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                (
                    (*id).clone(),
                    self.weight_a * ranks_a[i] + self.weight_b * ranks_b[i],
                )
            })
            .collect();
        fused.sort_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(Ordering::Equal));
        fused.truncate(n);
        fused
            .into_iter()
            // Nominal similarity, monotone in the fused rank so the
            // non-increasing invariant holds.
            .map(|(id, rank)| ScoredItem::new(id, 1.0 / rank))
            .collect()
    }
}

impl RetrievalStrategy for LateFusion {
    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self, query: &str, n: usize) -> Result<RankedResult, EvalError> {
        let result_a = self.a.rank(query, n)?;
        let result_b = self.b.rank(query, n)?;
        let union = Self::union_scores(&result_a, &result_b);
        Ok(match self.method {
            FusionMethod::Score => self.fuse_by_score(union, n),
            FusionMethod::Rank => self.fuse_by_rank(union, n),
        })
    }
}

/// 1-based descending ranks over `scores`; tied scores share the mean of
/// the positions they occupy.
fn mean_ranks(scores: &[f32]) -> Vec<f32> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&x, &y| {
        scores[y]
            .partial_cmp(&scores[x])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0.0; scores.len()];
    let mut pos = 0;
    while pos < order.len() {
        let mut end = pos;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[pos]] {
            end += 1;
        }
        let mean = (pos + 1 + end + 1) as f32 / 2.0;
        for &idx in &order[pos..=end] {
            ranks[idx] = mean;
        }
        pos = end + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrategy {
        name: String,
        result: RankedResult,
    }

    impl RetrievalStrategy for FixedStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn rank(&self, _query: &str, n: usize) -> Result<RankedResult, EvalError> {
            let mut out = self.result.clone();
            out.truncate(n);
            Ok(out)
        }
    }

    fn fixed(name: &str, items: &[(&str, f32)]) -> Arc<dyn RetrievalStrategy> {
        Arc::new(FixedStrategy {
            name: name.to_string(),
            result: items
                .iter()
                .map(|(id, s)| ScoredItem::new(*id, *s))
                .collect(),
        })
    }

    #[test]
    fn registry_preserves_order_and_rejects_duplicates() {
        let mut registry = SystemRegistry::new();
        registry.register(fixed("one", &[])).unwrap();
        registry.register(fixed("two", &[])).unwrap();
        assert_eq!(registry.names(), ["one", "two"]);
        assert!(registry.register(fixed("one", &[])).is_err());
        assert!(registry.get("two").is_some());
    }

    #[test]
    fn score_fusion_fills_missing_with_zero() {
        let a = fixed("a", &[("x", 0.8), ("y", 0.4)]);
        let b = fixed("b", &[("y", 1.0), ("z", 0.6)]);
        let fusion = LateFusion::new("f", a, b, FusionMethod::Score, 0.5, 0.5);

        let result = fusion.rank("q", 3).unwrap();
        let got: Vec<(&str, f32)> = result
            .iter()
            .map(|s| (s.id.as_str(), s.similarity))
            .collect();
        // y: 0.5·0.4 + 0.5·1.0 = 0.7; x: 0.4; z: 0.3
        assert_eq!(got, [("y", 0.7), ("x", 0.4), ("z", 0.3)]);
    }

    #[test]
    fn rank_fusion_orders_by_combined_rank() {
        let a = fixed("a", &[("x", 0.9), ("y", 0.5), ("z", 0.1)]);
        let b = fixed("b", &[("z", 0.9), ("y", 0.5), ("x", 0.1)]);
        let fusion = LateFusion::new("f", a, b, FusionMethod::Rank, 0.5, 0.5);

        let result = fusion.rank("q", 3).unwrap();
        let ids: Vec<&str> = result.iter().map(|s| s.id.as_str()).collect();
        // All three items average rank 2; id order breaks the tie.
        assert_eq!(ids, ["x", "y", "z"]);
        assert!(result[0].similarity >= result[1].similarity);
    }

    #[test]
    fn rank_fusion_respects_weights() {
        let a = fixed("a", &[("x", 0.9), ("y", 0.5)]);
        let b = fixed("b", &[("y", 0.9), ("x", 0.5)]);
        let fusion = LateFusion::new("f", a, b, FusionMethod::Rank, 1.0, 0.0);

        let result = fusion.rank("q", 2).unwrap();
        assert_eq!(result[0].id, "x");
    }

    #[test]
    fn mean_ranks_average_ties() {
        let ranks = mean_ranks(&[0.9, 0.5, 0.5, 0.1]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn fused_output_is_truncated() {
        let a = fixed("a", &[("x", 0.8), ("y", 0.4), ("z", 0.2)]);
        let b = fixed("b", &[("w", 1.0)]);
        let fusion = LateFusion::new("f", a, b, FusionMethod::Score, 0.5, 0.5);
        assert_eq!(fusion.rank("q", 2).unwrap().len(), 2);
    }
}
