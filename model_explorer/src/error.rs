use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop the explorer from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{param} must be positive, got {value}")]
    NonPositive { param: &'static str, value: usize },

    #[error("heads * head_width must equal channels: {heads} * {head_width} != {channels}")]
    HeadSplit {
        heads: usize,
        head_width: usize,
        channels: usize,
    },

    #[error("invalid value for {var}: {raw:?}")]
    InvalidEnv { var: &'static str, raw: String },

    #[error("unknown phase {0:?}")]
    UnknownPhase(String),

    #[error("failed to read weights file {path}: {source}")]
    WeightsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse weights file {path}: {source}")]
    WeightsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected {expected} input tokens, got {actual}")]
    TokenCount { expected: usize, actual: usize },

    #[error("token {token} at position {position} is outside the vocabulary of {vocab}")]
    TokenOutOfVocab {
        token: usize,
        position: usize,
        vocab: usize,
    },
}
