//! Offline evaluation of content-based music retrieval systems.
//!
//! Two coupled halves: a retrieval engine (exact cosine top-N over named
//! feature tables, with a durable merge-on-load cache) and an evaluation
//! pipeline (precision/recall@k, nDCG@10, genre coverage@10, genre
//! diversity@10, and a rank-based combined score per system). Everything
//! expensive is memoized to disk so interrupted runs resume from their
//! last checkpoint.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use mmsr_eval::{
//!     evaluate_all, Catalogue, EvalConfig, FeatureStrategy, GenreIndex,
//!     JsonTableProvider, RandomBaseline, Retrieval, RetrievalCache,
//!     StateStore, SystemRegistry,
//! };
//!
//! # fn main() -> Result<(), mmsr_eval::EvalError> {
//! let config = EvalConfig::default();
//! let catalogue = Arc::new(Catalogue::from_json(config.data_dir.join("catalogue.json"))?);
//! let store = StateStore::new(&config.state_dir)?;
//! let genres = GenreIndex::build(&catalogue, &store)?;
//!
//! let provider = Arc::new(JsonTableProvider::new(&config.data_dir));
//! let cache = Arc::new(RetrievalCache::open(&config.retrievals_dir)?);
//! let engine = Arc::new(
//!     Retrieval::new(provider, cache, Arc::clone(&catalogue), config.n)
//!         .with_baseline_seed(config.baseline_seed),
//! );
//!
//! let mut registry = SystemRegistry::new();
//! registry.register(Arc::new(RandomBaseline::new(Arc::clone(&engine))))?;
//! registry.register(Arc::new(FeatureStrategy::new("text_tf_idf", Arc::clone(&engine))))?;
//!
//! engine.precompute_all(&["text_tf_idf".to_string()], config.threads, config.flush_interval)?;
//! let ranking = evaluate_all(&registry, &genres, &store, &config)?;
//! println!("best system: {}", ranking.ordering[0]);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalogue;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod store;
pub mod strategy;
pub mod table;
pub mod types;

pub use cache::RetrievalCache;
pub use catalogue::{Catalogue, CatalogueEntry, GenreIndex};
pub use config::{EvalConfig, FusionSpec};
pub use engine::Retrieval;
pub use error::EvalError;
pub use metrics::{evaluate_all, f1_score, CombinedRanking, PrecisionRecall, SystemScores, K_MAX};
pub use store::StateStore;
pub use strategy::{
    FeatureStrategy, FusionMethod, LateFusion, RandomBaseline, RetrievalStrategy,
    SystemRegistry, RANDOM_BASELINE_NAME,
};
pub use table::{FeatureTable, FeatureTableProvider, JsonTableProvider, MemoryTableProvider};
pub use types::{ItemId, RankedResult, ScoredItem};
