//! Genre coverage@n: the share of the catalogue's genre universe that a
//! system surfaces somewhere in its top-n results across all queries.

use std::collections::BTreeSet;

use super::ranked_ids;
use crate::catalogue::GenreIndex;
use crate::error::EvalError;
use crate::store::StateStore;
use crate::strategy::RetrievalStrategy;

pub fn compute(
    system: &dyn RetrievalStrategy,
    genres: &GenreIndex,
    store: &StateStore,
    n: usize,
) -> Result<f64, EvalError> {
    // n is part of the key so reruns with a different cutoff never serve
    // a value computed for another one.
    let key = format!("genre_coverage_{}_{}", n, system.name());
    store.get_or_compute(&key, || Ok(calculate(system, genres, n)))
}

fn calculate(system: &dyn RetrievalStrategy, genres: &GenreIndex, n: usize) -> f64 {
    let universe = genres.genre_universe();
    if universe.is_empty() {
        return 0.0;
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for query in genres.ids() {
        for id in ranked_ids(system, query, n) {
            // Retrieved items without genre data contribute nothing.
            if let Some(labels) = genres.genres(&id) {
                seen.extend(labels.iter().map(String::as_str));
            }
        }
    }
    seen.len() as f64 / universe.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Catalogue, CatalogueEntry};
    use crate::types::{RankedResult, ScoredItem};
    use std::collections::HashMap;

    struct TableStrategy {
        results: HashMap<String, Vec<String>>,
    }

    impl RetrievalStrategy for TableStrategy {
        fn name(&self) -> &str {
            "fixture"
        }

        fn rank(&self, query: &str, n: usize) -> Result<RankedResult, EvalError> {
            let ids = self.results.get(query).cloned().unwrap_or_default();
            Ok(ids
                .into_iter()
                .take(n)
                .enumerate()
                .map(|(i, id)| ScoredItem::new(id, 1.0 - i as f32 * 0.1))
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
    fn full_genre_surface_scores_one() {
        let genres = genre_index(&[
            ("A", Some(&["rock"])),
            ("B", Some(&["pop"])),
            ("C", Some(&["jazz"])),
        ]);
        // Every query retrieves the two other items, so all three genres
        // show up somewhere.
        let mut results = HashMap::new();
        results.insert("A".to_string(), vec!["B".to_string(), "C".to_string()]);
        results.insert("B".to_string(), vec!["A".to_string(), "C".to_string()]);
        results.insert("C".to_string(), vec!["A".to_string(), "B".to_string()]);
        let system = TableStrategy { results };
        assert_eq!(calculate(&system, &genres, 10), 1.0);
    }

    #[test]
    fn narrow_system_covers_a_fraction() {
        let genres = genre_index(&[
            ("A", Some(&["rock"])),
            ("B", Some(&["pop"])),
            ("C", Some(&["jazz"])),
        ]);
        // Everything retrieves only "A".
        let mut results = HashMap::new();
        for query in ["A", "B", "C"] {
            results.insert(query.to_string(), vec!["A".to_string()]);
        }
        let system = TableStrategy { results };
        assert!((calculate(&system, &genres, 10) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn memoized_values_are_scoped_by_cutoff() {
        let genres = genre_index(&[
            ("A", Some(&["rock"])),
            ("B", Some(&["pop"])),
            ("C", Some(&["jazz"])),
        ]);
        let mut results = HashMap::new();
        results.insert("A".to_string(), vec!["B".to_string(), "C".to_string()]);
        results.insert("B".to_string(), vec!["A".to_string(), "C".to_string()]);
        results.insert("C".to_string(), vec!["A".to_string(), "B".to_string()]);
        let system = TableStrategy { results };

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        let full = compute(&system, &genres, &store, 10).unwrap();
        assert!(store.contains("genre_coverage_10_fixture"));

        // A rerun with a tighter cutoff over the same state dir must
        // recompute, not serve the n = 10 record.
        let narrow = compute(&system, &genres, &store, 1).unwrap();
        assert!(store.contains("genre_coverage_1_fixture"));
        assert!(narrow < full);
    }

    #[test]
    fn genreless_retrieved_items_contribute_nothing() {
        let genres = genre_index(&[
            ("A", Some(&["rock"])),
            ("B", None),
        ]);
        let mut results = HashMap::new();
        results.insert("A".to_string(), vec!["B".to_string()]);
        let system = TableStrategy { results };
        assert_eq!(calculate(&system, &genres, 10), 0.0);
    }
}
