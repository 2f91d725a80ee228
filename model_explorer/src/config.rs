//! Env parsing and defaults.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::layout::ModelShape;
use crate::particles::DEFAULT_CAPACITY;
use crate::walkthrough::Phase;

const SHAPE_ENV_VARS: [&str; 7] = [
    "LLMVIZ_VOCAB",
    "LLMVIZ_SEQ_LEN",
    "LLMVIZ_CHANNELS",
    "LLMVIZ_HEADS",
    "LLMVIZ_HEAD_WIDTH",
    "LLMVIZ_LAYERS",
    "LLMVIZ_MLP_MULT",
];

/// Everything the explorer reads from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplorerConfig {
    pub shape: ModelShape,
    /// JSON file with tokens and tensors; synthetic weights are used when unset.
    pub weights: Option<PathBuf>,
    pub particles: usize,
    pub start_phase: Phase,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            shape: ModelShape::default(),
            weights: None,
            particles: DEFAULT_CAPACITY,
            start_phase: Phase::Intro,
        }
    }
}

/// Reads `LLMVIZ_*` variables over the defaults. Unset or empty variables keep the default;
/// anything unparsable is an error naming the variable.
pub fn explorer_config() -> Result<ExplorerConfig, ConfigError> {
    let defaults = ExplorerConfig::default();
    let d = defaults.shape;
    let [vocab, seq_len, channels, heads, head_width, layers, mlp_mult] = SHAPE_ENV_VARS;

    let shape = ModelShape {
        vocab: env_or(vocab, d.vocab)?,
        seq_len: env_or(seq_len, d.seq_len)?,
        channels: env_or(channels, d.channels)?,
        heads: env_or(heads, d.heads)?,
        head_width: env_or(head_width, d.head_width)?,
        layers: env_or(layers, d.layers)?,
        mlp_mult: env_or(mlp_mult, d.mlp_mult)?,
    };

    let weights = env_raw("LLMVIZ_WEIGHTS").map(PathBuf::from);
    let particles = env_or("LLMVIZ_PARTICLES", defaults.particles)?;
    let start_phase = match env_raw("LLMVIZ_START_PHASE") {
        Some(raw) => raw.parse::<Phase>()?,
        None => defaults.start_phase,
    };

    Ok(ExplorerConfig {
        shape,
        weights,
        particles,
        start_phase,
    })
}

fn env_raw(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env_raw(var) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    struct EnvGuard {
        snapshot: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn capture(keys: &[&'static str]) -> Self {
            let snapshot = keys
                .iter()
                .map(|&key| (key, std::env::var(key).ok()))
                .collect();
            Self { snapshot }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.snapshot {
                match value {
                    Some(val) => std::env::set_var(key, val),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    const ENV_KEYS: [&str; 10] = [
        "LLMVIZ_VOCAB",
        "LLMVIZ_SEQ_LEN",
        "LLMVIZ_CHANNELS",
        "LLMVIZ_HEADS",
        "LLMVIZ_HEAD_WIDTH",
        "LLMVIZ_LAYERS",
        "LLMVIZ_MLP_MULT",
        "LLMVIZ_WEIGHTS",
        "LLMVIZ_PARTICLES",
        "LLMVIZ_START_PHASE",
    ];

    fn clear_all() -> EnvGuard {
        let guard = EnvGuard::capture(&ENV_KEYS);
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        guard
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let _lock = lock_env();
        let _guard = clear_all();

        let config = explorer_config().unwrap();

        assert_eq!(config, ExplorerConfig::default());
        assert_eq!(config.shape.channels, 48);
        assert_eq!(config.particles, 500);
    }

    #[test]
    fn env_overrides_shape_and_phase() {
        let _lock = lock_env();
        let _guard = clear_all();

        std::env::set_var("LLMVIZ_LAYERS", "2");
        std::env::set_var("LLMVIZ_SEQ_LEN", " 8 ");
        std::env::set_var("LLMVIZ_START_PHASE", "self-attention");
        std::env::set_var("LLMVIZ_WEIGHTS", "weights.json");

        let config = explorer_config().unwrap();

        assert_eq!(config.shape.layers, 2);
        assert_eq!(config.shape.seq_len, 8);
        assert_eq!(config.start_phase, Phase::SelfAttention);
        assert_eq!(config.weights, Some(PathBuf::from("weights.json")));
    }

    #[test]
    fn unparsable_value_names_the_variable() {
        let _lock = lock_env();
        let _guard = clear_all();

        std::env::set_var("LLMVIZ_HEADS", "three");

        let err = explorer_config().unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnv { var: "LLMVIZ_HEADS", .. }));
        assert!(err.to_string().contains("LLMVIZ_HEADS"));
    }

    #[test]
    fn empty_value_keeps_the_default() {
        let _lock = lock_env();
        let _guard = clear_all();

        std::env::set_var("LLMVIZ_PARTICLES", "");

        assert_eq!(explorer_config().unwrap().particles, DEFAULT_CAPACITY);
    }

    #[test]
    fn unknown_start_phase_is_rejected() {
        let _lock = lock_env();
        let _guard = clear_all();

        std::env::set_var("LLMVIZ_START_PHASE", "decoder");

        assert!(matches!(
            explorer_config(),
            Err(ConfigError::UnknownPhase(_))
        ));
    }
}
