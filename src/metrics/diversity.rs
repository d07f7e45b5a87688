//! Genre diversity@n: mean Shannon entropy of the soft genre distribution
//! of each query's top-n results.

use std::collections::BTreeMap;

use super::ranked_ids;
use crate::catalogue::GenreIndex;
use crate::error::EvalError;
use crate::store::StateStore;
use crate::strategy::RetrievalStrategy;
use crate::types::ItemId;

pub fn compute(
    system: &dyn RetrievalStrategy,
    genres: &GenreIndex,
    store: &StateStore,
    n: usize,
) -> Result<f64, EvalError> {
    let key = format!("genre_diversity_{}_{}", n, system.name());
    store.get_or_compute(&key, || Ok(calculate(system, genres, n)))
}

fn calculate(system: &dyn RetrievalStrategy, genres: &GenreIndex, n: usize) -> f64 {
    let queries = genres.ids();
    if queries.is_empty() {
        return 0.0;
    }
    let total: f64 = queries
        .iter()
        .map(|query| entropy_of(genres, &ranked_ids(system, query, n)))
        .sum();
    total / queries.len() as f64
}

/// Each retrieved item spreads a unit of mass evenly over its own genres;
/// the distribution is normalized by the retrieved count and folded into
/// `-Σ p·log2(p)` over nonzero bins.
fn entropy_of(genres: &GenreIndex, retrieved: &[ItemId]) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    let mut distribution: BTreeMap<&str, f64> = BTreeMap::new();
    for id in retrieved {
        if let Some(labels) = genres.genres(id) {
            let weight = 1.0 / labels.len() as f64;
            for label in labels {
                *distribution.entry(label.as_str()).or_insert(0.0) += weight;
            }
        }
    }
    let normalizer = retrieved.len() as f64;
    distribution
        .values()
        .map(|mass| mass / normalizer)
        .filter(|p| *p > 0.0)
        .map(|p| -(p * p.log2()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Catalogue, CatalogueEntry};
    use crate::types::{RankedResult, ScoredItem};

    struct UniformStrategy {
        retrieved: Vec<String>,
    }

    impl RetrievalStrategy for UniformStrategy {
        fn name(&self) -> &str {
            "fixture"
        }

        fn rank(&self, _query: &str, n: usize) -> Result<RankedResult, EvalError> {
            Ok(self
                .retrieved
                .iter()
                .take(n)
                .enumerate()
                .map(|(i, id)| ScoredItem::new(id.clone(), 1.0 - i as f32 * 0.01))
                .collect())
        }
    }

    fn genre_index(entries: &[(&str, Option<&[&str]>)]) -> GenreIndex {
        let catalogue = Catalogue::new(
            entries
                .iter()
                .map(|(id, genres)| CatalogueEntry {
                    id: id.to_string(),
                    genres: genres.map(|g| g.iter().map(|s| s.to_string()).collect()),
                })
                .collect(),
        );
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        GenreIndex::build(&catalogue, &store).unwrap()
    }

    #[test]
    fn uniform_distinct_genres_hit_log2_of_count() {
        // Two retrieved items with one unique genre each: p = 0.5, 0.5 →
        // entropy 1 bit, the upper bound for two items.
        let genres = genre_index(&[
            ("Q", Some(&["folk"])),
            ("A", Some(&["rock"])),
            ("B", Some(&["pop"])),
        ]);
        let system = UniformStrategy {
            retrieved: vec!["A".to_string(), "B".to_string()],
        };
        let value = calculate(&system, &genres, 2);
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn concentrated_genres_score_lower_than_spread() {
        let genres = genre_index(&[
            ("Q", Some(&["folk"])),
            ("A", Some(&["rock"])),
            ("B", Some(&["rock"])),
            ("C", Some(&["pop"])),
        ]);
        let concentrated = UniformStrategy {
            retrieved: vec!["A".to_string(), "B".to_string()],
        };
        let spread = UniformStrategy {
            retrieved: vec!["A".to_string(), "C".to_string()],
        };
        assert!(calculate(&concentrated, &genres, 2) < calculate(&spread, &genres, 2));
    }

    #[test]
    fn multi_label_items_spread_soft_weight() {
        // One item with two genres: each genre gets 1/2, normalized by 1
        // retrieved item → p = 0.5 twice → entropy 1.
        let genres = genre_index(&[("Q", Some(&["folk"])), ("A", Some(&["rock", "pop"]))]);
        let system = UniformStrategy {
            retrieved: vec!["A".to_string()],
        };
        assert!((calculate(&system, &genres, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stays_within_bounds_for_top_ten() {
        let mut entries: Vec<(String, Vec<String>)> = Vec::new();
        for i in 0..10 {
            entries.push((format!("I{i}"), vec![format!("g{i}")]));
        }
        let catalogue = Catalogue::new(
            std::iter::once(CatalogueEntry {
                id: "Q".to_string(),
                genres: Some(vec!["folk".to_string()]),
            })
            .chain(entries.iter().map(|(id, genres)| CatalogueEntry {
                id: id.clone(),
                genres: Some(genres.clone()),
            }))
            .collect(),
        );
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        let genres = GenreIndex::build(&catalogue, &store).unwrap();

        let system = UniformStrategy {
            retrieved: (0..10).map(|i| format!("I{i}")).collect(),
        };
        let value = calculate(&system, &genres, 10);
        let upper = (10f64).log2();
        assert!(value > 0.0 && value <= upper + 1e-12);
        // Ten items in ten distinct buckets is exactly the bound.
        assert!((value - upper).abs() < 1e-12);
    }

    #[test]
    fn memoized_values_are_scoped_by_cutoff() {
        let genres = genre_index(&[
            ("Q", Some(&["folk"])),
            ("A", Some(&["rock"])),
            ("B", Some(&["pop"])),
        ]);
        let system = UniformStrategy {
            retrieved: vec!["A".to_string(), "B".to_string()],
        };
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        // Top 2 spreads over two genres (1 bit); top 1 is one genre.
        let pair = compute(&system, &genres, &store, 2).unwrap();
        assert!(store.contains("genre_diversity_2_fixture"));
        let single = compute(&system, &genres, &store, 1).unwrap();
        assert!(store.contains("genre_diversity_1_fixture"));
        assert!((pair - 1.0).abs() < 1e-12);
        assert_eq!(single, 0.0);
    }

    #[test]
    fn empty_retrieval_and_genreless_items_yield_zero() {
        let genres = genre_index(&[("Q", Some(&["folk"])), ("X", None)]);
        let empty = UniformStrategy { retrieved: vec![] };
        assert_eq!(calculate(&empty, &genres, 10), 0.0);

        let genreless = UniformStrategy {
            retrieved: vec!["X".to_string()],
        };
        assert_eq!(calculate(&genreless, &genres, 10), 0.0);
    }
}
