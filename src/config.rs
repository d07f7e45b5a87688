//! Run configuration loaded from a YAML file.
//!
//! ```yaml
//! data_dir: datasets
//! state_dir: pickled_state
//! retrievals_dir: retrievals
//! n: 100
//! ndcg_n: 10
//! chunk_size: 1000
//! flush_interval: 1000
//! threads: 4
//! baseline_seed: 7
//! representations: [text_tf_idf, mfcc_bow]
//! fusions:
//!   - name: late_fusion
//!     a: text_tf_idf
//!     b: mfcc_bow
//!     method: score
//!     weight_a: 0.5
//!     weight_b: 0.5
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::strategy::{FusionMethod, RANDOM_BASELINE_NAME};

/// One late-fusion system built from two registered systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionSpec {
    pub name: String,
    pub a: String,
    pub b: String,
    #[serde(default)]
    pub method: FusionMethod,
    #[serde(default = "default_weight")]
    pub weight_a: f32,
    #[serde(default = "default_weight")]
    pub weight_b: f32,
}

fn default_weight() -> f32 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Feature tables (`<name>.json`) and `catalogue.json`.
    #[serde(default = "EvalConfig::default_data_dir")]
    pub data_dir: PathBuf,
    /// Memoized metric intermediates.
    #[serde(default = "EvalConfig::default_state_dir")]
    pub state_dir: PathBuf,
    /// Durable retrieval cache records.
    #[serde(default = "EvalConfig::default_retrievals_dir")]
    pub retrievals_dir: PathBuf,
    /// Engine top-N (the precision/recall walk needs 100).
    #[serde(default = "EvalConfig::default_n")]
    pub n: usize,
    /// k for nDCG, coverage, diversity and the combined score.
    #[serde(default = "EvalConfig::default_ndcg_n")]
    pub ndcg_n: usize,
    /// Items per memoized nDCG chunk.
    #[serde(default = "EvalConfig::default_chunk_size")]
    pub chunk_size: usize,
    /// Items between checkpoint flushes during precompute.
    #[serde(default = "EvalConfig::default_flush_interval")]
    pub flush_interval: usize,
    /// Precompute worker pool size.
    #[serde(default = "EvalConfig::default_threads")]
    pub threads: usize,
    /// Seed for the random baseline; unset means entropy-seeded.
    #[serde(default)]
    pub baseline_seed: Option<u64>,
    /// Representation names the provider must supply.
    #[serde(default)]
    pub representations: Vec<String>,
    /// Late-fusion systems over already-registered ones.
    #[serde(default)]
    pub fusions: Vec<FusionSpec>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            state_dir: Self::default_state_dir(),
            retrievals_dir: Self::default_retrievals_dir(),
            n: Self::default_n(),
            ndcg_n: Self::default_ndcg_n(),
            chunk_size: Self::default_chunk_size(),
            flush_interval: Self::default_flush_interval(),
            threads: Self::default_threads(),
            baseline_seed: None,
            representations: Vec::new(),
            fusions: Vec::new(),
        }
    }
}

impl EvalConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("datasets")
    }

    fn default_state_dir() -> PathBuf {
        PathBuf::from("pickled_state")
    }

    fn default_retrievals_dir() -> PathBuf {
        PathBuf::from("retrievals")
    }

    fn default_n() -> usize {
        100
    }

    fn default_ndcg_n() -> usize {
        10
    }

    fn default_chunk_size() -> usize {
        1000
    }

    fn default_flush_interval() -> usize {
        1000
    }

    fn default_threads() -> usize {
        4
    }

    /// Load and parse a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            EvalError::MissingResource(format!("config file {}: {err}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|err| EvalError::InvalidConfig(format!("{}: {err}", path.display())))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.n == 0 {
            return Err(EvalError::InvalidConfig("n must be > 0".to_string()));
        }
        let ndcg_cap = self.n.min(crate::metrics::K_MAX);
        if self.ndcg_n == 0 || self.ndcg_n > ndcg_cap {
            return Err(EvalError::InvalidConfig(format!(
                "ndcg_n must be in 1..={ndcg_cap}"
            )));
        }
        if self.chunk_size == 0 {
            return Err(EvalError::InvalidConfig(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(EvalError::InvalidConfig("threads must be > 0".to_string()));
        }
        for fusion in &self.fusions {
            for member in [&fusion.a, &fusion.b] {
                let known = member == RANDOM_BASELINE_NAME
                    || self.representations.contains(member)
                    || self.fusions.iter().any(|f| &f.name == member);
                if !known {
                    return Err(EvalError::InvalidConfig(format!(
                        "fusion '{}' references unknown system '{member}'",
                        fusion.name
                    )));
                }
            }
            for weight in [fusion.weight_a, fusion.weight_b] {
                if !(0.0..=1.0).contains(&weight) {
                    return Err(EvalError::InvalidConfig(format!(
                        "fusion '{}' weight {weight} outside [0, 1]",
                        fusion.name
                    )));
                }
            }
        }
        Ok(())
    }
}
