//! Combined rank score across all metrics.
//!
//! Each system is ranked (1 = best) on F1@10, nDCG@10, coverage@10 and
//! diversity@10; its combined score is the mean of those four ranks, so
//! lower is better. Equal metric values keep registration order (the
//! sort is stable), which makes the final ordering reproducible.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalogue::GenreIndex;
use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::metrics::{coverage, diversity, ndcg, precision_recall};
use crate::store::StateStore;
use crate::strategy::SystemRegistry;

/// All per-system metric values at k = 10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemScores {
    pub system: String,
    pub precision_at_10: f64,
    pub recall_at_10: f64,
    pub f1_at_10: f64,
    pub ndcg_at_10: f64,
    pub coverage_at_10: f64,
    pub diversity_at_10: f64,
    /// Mean of the four metric ranks; lower is better.
    pub combined_rank: f64,
}

/// Per-system scores in registration order plus the final ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRanking {
    pub scores: Vec<SystemScores>,
    /// System names ordered best-first by combined rank (stable on ties).
    pub ordering: Vec<String>,
}

impl CombinedRanking {
    /// Scores best-first by combined rank; the same stable sort that
    /// produced `ordering`, so the two always agree.
    pub fn ranked_scores(&self) -> Vec<&SystemScores> {
        let mut by_rank: Vec<&SystemScores> = self.scores.iter().collect();
        by_rank.sort_by(|a, b| {
            a.combined_rank
                .partial_cmp(&b.combined_rank)
                .unwrap_or(Ordering::Equal)
        });
        by_rank
    }
}

/// F1 with the defined division-by-zero substitute: 0 when P + R = 0.
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    let denominator = precision + recall;
    if denominator == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / denominator
    }
}

/// Compute every metric for every registered system and fold them into
/// the combined ranking.
pub fn evaluate_all(
    registry: &SystemRegistry,
    genres: &GenreIndex,
    store: &StateStore,
    config: &EvalConfig,
) -> Result<CombinedRanking, EvalError> {
    if registry.is_empty() {
        return Err(EvalError::InvalidConfig(
            "no retrieval systems registered".to_string(),
        ));
    }

    let k = config.ndcg_n;
    let mut scores = Vec::with_capacity(registry.len());
    for system in registry.iter() {
        info!(system = system.name(), "evaluating");
        let pr = precision_recall::compute(system.as_ref(), genres, store)?;
        let precision = pr.precision(k);
        let recall = pr.recall(k);
        let ndcg_value =
            ndcg::compute(system.as_ref(), genres, store, k, config.chunk_size)?;
        let coverage_value = coverage::compute(system.as_ref(), genres, store, k)?;
        let diversity_value = diversity::compute(system.as_ref(), genres, store, k)?;

        scores.push(SystemScores {
            system: system.name().to_string(),
            precision_at_10: precision,
            recall_at_10: recall,
            f1_at_10: f1_score(precision, recall),
            ndcg_at_10: ndcg_value,
            coverage_at_10: coverage_value,
            diversity_at_10: diversity_value,
            combined_rank: 0.0,
        });
    }

    let f1_ranks = descending_ranks(&scores, |s| s.f1_at_10);
    let ndcg_ranks = descending_ranks(&scores, |s| s.ndcg_at_10);
    let coverage_ranks = descending_ranks(&scores, |s| s.coverage_at_10);
    let diversity_ranks = descending_ranks(&scores, |s| s.diversity_at_10);

    for (index, score) in scores.iter_mut().enumerate() {
        score.combined_rank = (f1_ranks[index]
            + ndcg_ranks[index]
            + coverage_ranks[index]
            + diversity_ranks[index]) as f64
            / 4.0;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .combined_rank
            .partial_cmp(&scores[b].combined_rank)
            .unwrap_or(Ordering::Equal)
    });
    let ordering = order
        .into_iter()
        .map(|index| scores[index].system.clone())
        .collect();

    Ok(CombinedRanking { scores, ordering })
}

/// 1-based rank of each system under a descending stable sort of `metric`.
fn descending_ranks<F>(scores: &[SystemScores], metric: F) -> Vec<usize>
where
    F: Fn(&SystemScores) -> f64,
{
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        metric(&scores[b])
            .partial_cmp(&metric(&scores[a]))
            .unwrap_or(Ordering::Equal)
    });
    let mut ranks = vec![0; scores.len()];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = position + 1;
    }
    ranks
}
