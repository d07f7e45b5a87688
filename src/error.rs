use thiserror::Error;

/// Errors produced by the retrieval engine and the evaluation pipeline.
///
/// Propagation policy: `NotFound` aborts a single retrieval, never a
/// full-catalogue sweep; `MissingResource` is fatal at startup; `Serde`
/// covers corrupt durable records, which call sites log and skip.
/// Division-by-zero conditions (zero relevant items, zero IDCG, empty
/// top-k) are substituted with 0 and never surface here.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("item '{item}' not found in representation '{representation}'")]
    NotFound { item: String, representation: String },

    #[error("missing resource: {0}")]
    MissingResource(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Serde(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for EvalError {
    fn from(value: serde_json::Error) -> Self {
        EvalError::Serde(value.to_string())
    }
}

impl From<serde_yaml::Error> for EvalError {
    fn from(value: serde_yaml::Error) -> Self {
        EvalError::Serde(value.to_string())
    }
}
