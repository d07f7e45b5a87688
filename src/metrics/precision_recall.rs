//! Precision and recall at k = 1..100, averaged over all queries.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ranked_ids;
use crate::catalogue::GenreIndex;
use crate::error::EvalError;
use crate::store::StateStore;
use crate::strategy::RetrievalStrategy;

pub const K_MAX: usize = 100;

/// Averaged precision@k / recall@k tables, index 0 holding k = 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecall {
    pub precision_at_k: Vec<f64>,
    pub recall_at_k: Vec<f64>,
}

impl PrecisionRecall {
    /// Precision at a 1-based `k`.
    pub fn precision(&self, k: usize) -> f64 {
        self.precision_at_k[k - 1]
    }

    /// Recall at a 1-based `k`.
    pub fn recall(&self, k: usize) -> f64 {
        self.recall_at_k[k - 1]
    }
}

/// Compute (or reload) the tables for one system.
pub fn compute(
    system: &dyn RetrievalStrategy,
    genres: &GenreIndex,
    store: &StateStore,
) -> Result<PrecisionRecall, EvalError> {
    let key = format!("precision_recall_{}", system.name());
    store.get_or_compute(&key, || Ok(calculate(system, genres)))
}

fn calculate(system: &dyn RetrievalStrategy, genres: &GenreIndex) -> PrecisionRecall {
    let mut precision_at_k = vec![0.0; K_MAX];
    let mut recall_at_k = vec![0.0; K_MAX];
    let queries = genres.ids();

    for (processed, query) in queries.iter().enumerate() {
        let retrieved = ranked_ids(system, query, K_MAX);
        let total_relevant = genres.relevant_count(query);

        let mut relevant_so_far = 0usize;
        for k in 1..=K_MAX {
            // A rank past the end of a short result is simply not
            // relevant.
            if let Some(id) = retrieved.get(k - 1) {
                if genres.is_relevant(query, id) {
                    relevant_so_far += 1;
                }
            }
            precision_at_k[k - 1] += relevant_so_far as f64 / k as f64;
            // Skip only the recall increment when the query has no
            // relevant items at all.
            if total_relevant > 0 {
                recall_at_k[k - 1] += relevant_so_far as f64 / total_relevant as f64;
            }
        }

        if (processed + 1) % 100 == 0 {
            debug!(
                system = system.name(),
                processed = processed + 1,
                "precision/recall progress"
            );
        }
    }

    let query_count = queries.len() as f64;
    if query_count > 0.0 {
        for value in precision_at_k.iter_mut().chain(recall_at_k.iter_mut()) {
            *value /= query_count;
        }
    }

    PrecisionRecall {
        precision_at_k,
        recall_at_k,
    }
}
