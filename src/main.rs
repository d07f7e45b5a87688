//! Batch evaluation binary: precompute every configured representation's
//! retrievals, run all metrics, print the final ranking.

use std::error::Error;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use mmsr_eval::{
    evaluate_all, Catalogue, EvalConfig, EvalError, FeatureStrategy, GenreIndex,
    JsonTableProvider, LateFusion, RandomBaseline, Retrieval, RetrievalCache, StateStore,
    SystemRegistry,
};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "eval.yaml".to_string());
    let config = EvalConfig::load(&config_path)?;
    config.validate()?;

    let catalogue = Arc::new(Catalogue::from_json(config.data_dir.join("catalogue.json"))?);
    let store = StateStore::new(&config.state_dir)?;
    let genres = GenreIndex::build(&catalogue, &store)?;

    let provider = Arc::new(JsonTableProvider::new(&config.data_dir));
    let cache = Arc::new(RetrievalCache::open(&config.retrievals_dir)?);
    let engine = Arc::new(
        Retrieval::new(provider, cache, Arc::clone(&catalogue), config.n)
            .with_baseline_seed(config.baseline_seed),
    );

    let mut registry = SystemRegistry::new();
    registry.register(Arc::new(RandomBaseline::new(Arc::clone(&engine))))?;
    for representation in &config.representations {
        registry.register(Arc::new(FeatureStrategy::new(
            representation,
            Arc::clone(&engine),
        )))?;
    }
    for fusion in &config.fusions {
        let a = registry
            .get(&fusion.a)
            .cloned()
            .ok_or_else(|| EvalError::InvalidConfig(format!("unknown system '{}'", fusion.a)))?;
        let b = registry
            .get(&fusion.b)
            .cloned()
            .ok_or_else(|| EvalError::InvalidConfig(format!("unknown system '{}'", fusion.b)))?;
        registry.register(Arc::new(LateFusion::new(
            &fusion.name,
            a,
            b,
            fusion.method,
            fusion.weight_a,
            fusion.weight_b,
        )))?;
    }

    info!(
        systems = registry.len(),
        items = catalogue.len(),
        "starting evaluation run"
    );

    engine.precompute_all(&config.representations, config.threads, config.flush_interval)?;
    let ranking = evaluate_all(&registry, &genres, &store, &config)?;

    println!(
        "{:<24} {:>8} {:>8} {:>8} {:>8} {:>10} {:>10} {:>9}",
        "system", "p@10", "r@10", "f1@10", "ndcg@10", "coverage", "diversity", "combined"
    );
    for score in ranking.ranked_scores() {
        println!(
            "{:<24} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>10.4} {:>10.4} {:>9.2}",
            score.system,
            score.precision_at_10,
            score.recall_at_10,
            score.f1_at_10,
            score.ndcg_at_10,
            score.coverage_at_10,
            score.diversity_at_10,
            score.combined_rank
        );
    }

    Ok(())
}
