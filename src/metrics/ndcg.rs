//! nDCG@n with graded genre relevance, chunk-memoized so an interrupted
//! run resumes without redoing finished chunks.

use std::cmp::Ordering;

use tracing::debug;

use super::ranked_ids;
use crate::catalogue::GenreIndex;
use crate::error::EvalError;
use crate::store::StateStore;
use crate::strategy::RetrievalStrategy;
use crate::types::ItemId;

/// Mean nDCG@`n` for one system over every query item.
///
/// The catalogue is cut into contiguous chunks of `chunk_size` items and
/// each chunk's nDCG sum is memoized under
/// `ndcg_{n}_{system}_chunk_{index}`.
pub fn compute(
    system: &dyn RetrievalStrategy,
    genres: &GenreIndex,
    store: &StateStore,
    n: usize,
    chunk_size: usize,
) -> Result<f64, EvalError> {
    let queries = genres.ids();
    if queries.is_empty() {
        return Ok(0.0);
    }

    let chunk_size = chunk_size.max(1);
    let mut total = 0.0;
    for (chunk_index, chunk) in queries.chunks(chunk_size).enumerate() {
        let key = format!("ndcg_{}_{}_chunk_{}", n, system.name(), chunk_index);
        let chunk_sum: f64 = store.get_or_compute(&key, || Ok(compute_chunk(system, genres, chunk, n)))?;
        total += chunk_sum;
        debug!(system = system.name(), chunk_index, "nDCG chunk done");
    }
    Ok(total / queries.len() as f64)
}

fn compute_chunk(
    system: &dyn RetrievalStrategy,
    genres: &GenreIndex,
    chunk: &[ItemId],
    n: usize,
) -> f64 {
    chunk
        .iter()
        .map(|query| {
            let idcg = ideal_dcg(genres, query, n);
            if idcg == 0.0 {
                return 0.0;
            }
            let retrieved = ranked_ids(system, query, n);
            dcg(genres, query, &retrieved, n) / idcg
        })
        .sum()
}

/// DCG of a ranked list: `rel₁ + Σ_{i=2..n} relᵢ / log2(i)`. Ranks past
/// the end of a short list contribute 0.
pub(crate) fn dcg(genres: &GenreIndex, query: &str, retrieved: &[ItemId], n: usize) -> f64 {
    retrieved
        .iter()
        .take(n)
        .enumerate()
        .map(|(position, id)| {
            let relevance = genres.relevance(query, id);
            if position == 0 {
                relevance
            } else {
                relevance / ((position + 1) as f64).log2()
            }
        })
        .sum()
}

/// DCG of the ideal ordering: the whole catalogue stable-sorted by graded
/// relevance to the query, descending, truncated to `n`.
fn ideal_dcg(genres: &GenreIndex, query: &str, n: usize) -> f64 {
    let mut by_relevance: Vec<(&ItemId, f64)> = genres
        .ids()
        .iter()
        .map(|id| (id, genres.relevance(query, id)))
        .collect();
    by_relevance.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let ideal: Vec<ItemId> = by_relevance
        .into_iter()
        .take(n)
        .map(|(id, _)| id.clone())
        .collect();
    dcg(genres, query, &ideal, n)
}
