//! The retrieval engine: exact cosine top-N over a representation's
//! feature table, backed by the durable [`RetrievalCache`].

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::cache::RetrievalCache;
use crate::catalogue::Catalogue;
use crate::error::EvalError;
use crate::table::{FeatureTable, FeatureTableProvider};
use crate::types::{ItemId, RankedResult, ScoredItem};

/// Exact nearest-neighbor retrieval over named feature tables.
pub struct Retrieval {
    provider: Arc<dyn FeatureTableProvider>,
    cache: Arc<RetrievalCache>,
    catalogue: Arc<Catalogue>,
    default_n: usize,
    baseline_seed: Option<u64>,
}

impl Retrieval {
    pub fn new(
        provider: Arc<dyn FeatureTableProvider>,
        cache: Arc<RetrievalCache>,
        catalogue: Arc<Catalogue>,
        default_n: usize,
    ) -> Self {
        Self {
            provider,
            cache,
            catalogue,
            default_n,
            baseline_seed: None,
        }
    }

    /// Seed the random baseline for reproducible runs.
    pub fn with_baseline_seed(mut self, seed: Option<u64>) -> Self {
        self.baseline_seed = seed;
        self
    }

    pub fn default_n(&self) -> usize {
        self.default_n
    }

    pub fn cache(&self) -> &RetrievalCache {
        &self.cache
    }

    /// Top-`n` most similar items to `query` under `representation`.
    ///
    /// Served from the cache when a stored entry covers `n`; otherwise a
    /// full cosine pass over the table runs and the result is written
    /// back. Fails with `NotFound` when the query has no row in the table
    /// and propagates the provider's `MissingResource` unchanged.
    pub fn top_similar(
        &self,
        query: &str,
        representation: &str,
        n: usize,
    ) -> Result<RankedResult, EvalError> {
        if let Some(hit) = self.cache.lookup(representation, query, n) {
            return Ok(hit);
        }
        let table = self.provider.table(representation)?;
        let result = rank_by_cosine(&table, query, n)?;
        self.cache.insert(representation, query, result.clone());
        Ok(result)
    }

    /// `n` distinct catalogue items drawn uniformly at random, query
    /// excluded, each with a nominal similarity of 1. Never cached, so
    /// repeated unseeded calls stay varied.
    pub fn random_baseline(&self, query: &str, n: usize) -> RankedResult {
        let mut rng = match self.baseline_seed {
            Some(seed) => {
                // Mix the query id in so different queries still draw
                // different sets under one seed.
                let mut hasher = DefaultHasher::new();
                query.hash(&mut hasher);
                StdRng::seed_from_u64(seed ^ hasher.finish())
            }
            None => StdRng::from_entropy(),
        };
        let pool: Vec<&ItemId> = self
            .catalogue
            .ids()
            .iter()
            .filter(|id| id.as_str() != query)
            .collect();
        pool.choose_multiple(&mut rng, n.min(pool.len()))
            .map(|id| ScoredItem::new((*id).clone(), 1.0))
            .collect()
    }

    /// Force cache population for every catalogue item under every given
    /// representation. One worker per representation; each worker walks
    /// the catalogue sequentially and syncs the cache every
    /// `flush_interval` items, so an interrupted run loses at most one
    /// batch and resumes idempotently from what was flushed. Fails with
    /// `MissingResource` before any work starts when a representation
    /// has no table.
    pub fn precompute_all(
        &self,
        representations: &[String],
        threads: usize,
        flush_interval: usize,
    ) -> Result<(), EvalError> {
        // Every configured representation must resolve before any worker
        // starts. A representation with no table at all is fatal here;
        // only per-item failures are skippable inside the sweep.
        for representation in representations {
            self.provider.table(representation)?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| EvalError::InvalidConfig(format!("worker pool: {err}")))?;

        pool.scope(|scope| {
            for representation in representations {
                scope.spawn(move |_| self.precompute(representation, flush_interval));
            }
        });

        self.cache.sync_with_disk()
    }

    fn precompute(&self, representation: &str, flush_interval: usize) {
        info!(representation, "precomputing retrievals");
        let interval = flush_interval.max(1);
        for (idx, item) in self.catalogue.ids().iter().enumerate() {
            match self.top_similar(item, representation, self.default_n) {
                Ok(_) => {}
                // One bad item must not abort the sweep.
                Err(err @ EvalError::NotFound { .. }) => {
                    debug!(representation, item = %item, %err, "skipping item");
                }
                Err(err) => {
                    warn!(representation, item = %item, %err, "retrieval failed, continuing");
                }
            }
            if idx > 0 && idx % interval == 0 {
                debug!(representation, done = idx, "checkpoint flush");
                if let Err(err) = self.cache.sync_with_disk() {
                    warn!(representation, %err, "cache flush failed, continuing");
                }
            }
        }
        if let Err(err) = self.cache.sync_with_disk() {
            warn!(representation, %err, "final cache flush failed");
        }
        info!(representation, "precompute finished");
    }
}

/// Cosine similarity of the query row against every other row, sorted
/// descending (ties keep id order), truncated to `n`. The query row is
/// excluded by id, so other items tied at similarity 1.0 survive.
fn rank_by_cosine(table: &FeatureTable, query: &str, n: usize) -> Result<RankedResult, EvalError> {
    let query_vector = table.vector(query).ok_or_else(|| EvalError::NotFound {
        item: query.to_string(),
        representation: table.name().to_string(),
    })?;
    let query_norm = norm(query_vector);

    let mut scored: RankedResult = table
        .rows()
        .filter(|(id, _)| id.as_str() != query)
        .map(|(id, vector)| ScoredItem::new(id.clone(), cosine(query_vector, query_norm, vector)))
        .collect();
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    scored.truncate(n);
    Ok(scored)
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Zero-norm vectors score 0 against everything.
fn cosine(a: &[f32], a_norm: f32, b: &[f32]) -> f32 {
    let b_norm = norm(b);
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}
