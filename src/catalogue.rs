//! Catalogue of items and their ground-truth genre labels.
//!
//! [`GenreIndex`] is the evaluation side's view of the catalogue: which
//! items carry genre data, how many relevant partners each one has, and
//! the binary/graded relevance between item pairs. The relevant-count pass
//! is O(N²) over the catalogue, so its output is memoized through the
//! [`StateStore`].

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::error::EvalError;
use crate::store::StateStore;
use crate::types::ItemId;

/// One catalogue row: an item id plus its genre labels, if known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub id: ItemId,
    #[serde(default, deserialize_with = "lenient_genres")]
    pub genres: Option<Vec<String>>,
}

/// A malformed genre payload on one entry is logged and treated as
/// absent; it never fails the whole catalogue load.
fn lenient_genres<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Array(items) => {
            let mut labels = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_json::Value::String(label) => labels.push(label),
                    other => {
                        warn!(payload = %other, "non-string genre label, dropping genre data");
                        return Ok(None);
                    }
                }
            }
            Ok(Some(labels))
        }
        other => {
            warn!(payload = %other, "malformed genre payload, treating as absent");
            Ok(None)
        }
    }
}

/// The authoritative item set for a run. Immutable after construction.
pub struct Catalogue {
    ids: Vec<ItemId>,
    genres: HashMap<ItemId, BTreeSet<String>>,
}

impl Catalogue {
    pub fn new(entries: Vec<CatalogueEntry>) -> Self {
        let mut ids = Vec::with_capacity(entries.len());
        let mut genres = HashMap::new();
        for entry in entries {
            match entry.genres {
                Some(labels) if !labels.is_empty() => {
                    genres.insert(entry.id.clone(), labels.into_iter().collect());
                }
                // Items without genre data stay in the catalogue but are
                // excluded from every genre-based metric.
                Some(_) | None => {
                    debug!(item = %entry.id, "catalogue entry has no genre data");
                }
            }
            ids.push(entry.id);
        }
        info!(
            items = ids.len(),
            with_genres = genres.len(),
            "catalogue loaded"
        );
        Self { ids, genres }
    }

    /// Load a catalogue from a JSON array of `{id, genres}` records.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| {
            EvalError::MissingResource(format!("no catalogue at {}", path.display()))
        })?;
        let entries: Vec<CatalogueEntry> = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| {
                EvalError::MissingResource(format!(
                    "unreadable catalogue at {}: {err}",
                    path.display()
                ))
            })?;
        Ok(Self::new(entries))
    }

    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn genres_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.genres.get(id)
    }
}

/// Memoized portion of the genre index; rebuilding this is the O(N²) part.
#[derive(Serialize, Deserialize)]
struct GenreIndexRecord {
    ids: Vec<ItemId>,
    relevant_counts: HashMap<ItemId, usize>,
}

const GENRE_INDEX_KEY: &str = "precomputed_genres";

/// Genre-derived relevance data over the catalogue.
pub struct GenreIndex {
    genre_map: HashMap<ItemId, BTreeSet<String>>,
    /// Items with genre data, in catalogue order. These are the queries
    /// every metric iterates.
    ids: Vec<ItemId>,
    relevant_counts: HashMap<ItemId, usize>,
}

impl GenreIndex {
    /// Build the index, reusing the memoized relevant-count record when
    /// one is on disk.
    pub fn build(catalogue: &Catalogue, store: &StateStore) -> Result<Self, EvalError> {
        let genre_map: HashMap<ItemId, BTreeSet<String>> = catalogue
            .ids()
            .iter()
            .filter_map(|id| {
                catalogue
                    .genres_of(id)
                    .map(|genres| (id.clone(), genres.clone()))
            })
            .collect();

        let record = store.get_or_compute(GENRE_INDEX_KEY, || {
            let ids: Vec<ItemId> = catalogue
                .ids()
                .iter()
                .filter(|id| genre_map.contains_key(id.as_str()))
                .cloned()
                .collect();
            let relevant_counts = Self::count_relevant(&ids, &genre_map);
            Ok(GenreIndexRecord {
                ids,
                relevant_counts,
            })
        })?;

        if record.ids.len() != genre_map.len() {
            warn!(
                stored = record.ids.len(),
                current = genre_map.len(),
                "memoized genre index size differs from catalogue; delete '{GENRE_INDEX_KEY}' to rebuild"
            );
        }

        Ok(Self {
            genre_map,
            ids: record.ids,
            relevant_counts: record.relevant_counts,
        })
    }

    fn count_relevant(
        ids: &[ItemId],
        genre_map: &HashMap<ItemId, BTreeSet<String>>,
    ) -> HashMap<ItemId, usize> {
        let mut counts = HashMap::with_capacity(ids.len());
        for (processed, id) in ids.iter().enumerate() {
            let count = ids
                .iter()
                .filter(|other| *other != id && shares_genre(genre_map, id, other))
                .count();
            counts.insert(id.clone(), count);
            if (processed + 1) % 100 == 0 {
                debug!(processed = processed + 1, "relevant-count progress");
            }
        }
        counts
    }

    /// Items with genre data, in catalogue order.
    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn genres(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.genre_map.get(id)
    }

    /// Number of other items sharing at least one genre with `id`.
    pub fn relevant_count(&self, id: &str) -> usize {
        self.relevant_counts.get(id).copied().unwrap_or(0)
    }

    /// Binary relevance: both items have genre data and share a label.
    pub fn is_relevant(&self, a: &str, b: &str) -> bool {
        shares_genre(&self.genre_map, a, b)
    }

    /// Graded relevance in [0, 1]: `2·|A∩B| / (|A| + |B|)`, 0 when either
    /// item lacks genre data.
    pub fn relevance(&self, a: &str, b: &str) -> f64 {
        let (Some(genres_a), Some(genres_b)) = (self.genre_map.get(a), self.genre_map.get(b))
        else {
            return 0.0;
        };
        let shared = genres_a.intersection(genres_b).count();
        2.0 * shared as f64 / (genres_a.len() + genres_b.len()) as f64
    }

    /// Every distinct genre label in the catalogue.
    pub fn genre_universe(&self) -> BTreeSet<&str> {
        self.genre_map
            .values()
            .flat_map(|genres| genres.iter().map(String::as_str))
            .collect()
    }
}

fn shares_genre(genre_map: &HashMap<ItemId, BTreeSet<String>>, a: &str, b: &str) -> bool {
    match (genre_map.get(a), genre_map.get(b)) {
        (Some(genres_a), Some(genres_b)) => genres_a.intersection(genres_b).next().is_some(),
        _ => false,
    }
}
