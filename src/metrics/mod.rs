//! Ranking-quality metrics over the registered retrieval systems.
//!
//! All computers share one shape: walk every query item the genre index
//! knows about, fold that system's ranked output against the genre data,
//! and memoize anything expensive through the [`StateStore`].

pub mod combined;
pub mod coverage;
pub mod diversity;
pub mod ndcg;
pub mod precision_recall;

pub use combined::{evaluate_all, f1_score, CombinedRanking, SystemScores};
pub use precision_recall::{PrecisionRecall, K_MAX};

use tracing::warn;

use crate::strategy::RetrievalStrategy;
use crate::types::ItemId;

/// Run one retrieval and keep only the ids. A per-item failure is logged
/// and yields an empty list so the sweep continues; an empty list counts
/// as "nothing relevant retrieved" in every metric.
pub(crate) fn ranked_ids(system: &dyn RetrievalStrategy, query: &str, n: usize) -> Vec<ItemId> {
    match system.rank(query, n) {
        Ok(result) => result.into_iter().map(|item| item.id).collect(),
        Err(err) => {
            warn!(system = system.name(), query, %err, "retrieval failed, skipping item");
            Vec::new()
        }
    }
}
