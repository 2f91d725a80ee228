use std::collections::BTreeMap;
use std::path::Path;

use bevy::log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::{Axis, Block, CellIdx, ModelLayout};

/// "C B A B B C" in a three-letter vocabulary.
pub const EXAMPLE_TOKENS: [usize; 6] = [2, 1, 0, 1, 1, 2];

/// Leaf data for previews: the input tokens plus one flat tensor per stored block,
/// row-major by (y, x) and keyed by block name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub tokens: Vec<usize>,
    #[serde(default)]
    tensors: BTreeMap<String, Vec<f32>>,
}

impl ModelWeights {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::WeightsIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::WeightsFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deterministic stand-in weights, scaled so activations stay in a readable range.
    pub fn synthetic(layout: &ModelLayout, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let vocab = layout.shape.vocab;
        let tokens = (0..layout.shape.seq_len)
            .map(|t| EXAMPLE_TOKENS[t % EXAMPLE_TOKENS.len()] % vocab)
            .collect();

        let mut tensors = BTreeMap::new();
        for blk in layout.weights() {
            if blk.id == layout.embedding.tokens {
                continue;
            }
            let n = blk.cell_count();
            let values: Vec<f32> = if blk.name.ends_with(".gamma") {
                (0..n).map(|_| 1.0 + rng.random_range(-0.1..0.1)).collect()
            } else if blk.name.ends_with(".beta") || blk.name.ends_with("_bias") {
                (0..n).map(|_| rng.random_range(-0.05..0.05)).collect()
            } else {
                let fan_in = blk.extent(Axis::X).max(1) as f32;
                let scale = if blk.id == layout.embedding.tok_embed
                    || blk.id == layout.embedding.pos_embed
                {
                    0.5
                } else {
                    1.0 / fan_in.sqrt()
                };
                (0..n).map(|_| rng.random_range(-1.0..1.0) * scale).collect()
            };
            tensors.insert(blk.name.clone(), values);
        }

        Self { tokens, tensors }
    }

    /// Checks tokens against the layout and drops tensors whose length doesn't match their block.
    pub fn validate(&mut self, layout: &ModelLayout) -> Result<(), ConfigError> {
        let shape = layout.shape;
        if self.tokens.len() != shape.seq_len {
            return Err(ConfigError::TokenCount {
                expected: shape.seq_len,
                actual: self.tokens.len(),
            });
        }
        if let Some((position, &token)) = self
            .tokens
            .iter()
            .enumerate()
            .find(|&(_, &t)| t >= shape.vocab)
        {
            return Err(ConfigError::TokenOutOfVocab {
                token,
                position,
                vocab: shape.vocab,
            });
        }

        self.tensors.retain(|name, values| match layout.find(name) {
            Some(id) => {
                let expected = layout.block(id).cell_count();
                if values.len() != expected {
                    warn!(
                        "weights: {name} has {} values, expected {expected}; previews disabled",
                        values.len()
                    );
                    return false;
                }
                true
            }
            None => {
                debug!("weights: ignoring unknown tensor {name}");
                false
            }
        });

        for blk in layout.weights() {
            if blk.id != layout.embedding.tokens && !self.tensors.contains_key(&blk.name) {
                warn!("weights: no tensor for {}", blk.name);
            }
        }
        Ok(())
    }

    pub fn set_tensor(&mut self, name: impl Into<String>, values: Vec<f32>) {
        self.tensors.insert(name.into(), values);
    }

    pub fn tensor(&self, name: &str) -> Option<&[f32]> {
        self.tensors.get(name).map(Vec::as_slice)
    }

    /// Stored value of a leaf cell. Token cells hold the token index.
    pub fn stored(&self, block: &Block, cell: CellIdx) -> Option<f32> {
        if block.name == "tokens" {
            return self.tokens.get(cell.x).map(|&t| t as f32);
        }
        let idx = cell.y * block.extent(Axis::X) + cell.x;
        self.tensors.get(&block.name)?.get(idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{build_layout, ModelShape};

    #[test]
    fn synthetic_weights_are_deterministic_and_complete() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let a = ModelWeights::synthetic(&layout, 42);
        let b = ModelWeights::synthetic(&layout, 42);
        assert_eq!(a, b);
        assert_eq!(a.tokens, EXAMPLE_TOKENS.to_vec());

        let mut checked = a.clone();
        checked.validate(&layout).unwrap();
        assert_eq!(checked, a);
    }

    #[test]
    fn stored_reads_row_major() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut weights = ModelWeights::synthetic(&layout, 1);
        let pos = layout.block(layout.embedding.pos_embed);
        let values: Vec<f32> = (0..pos.cell_count()).map(|i| i as f32).collect();
        weights.set_tensor("pos_embed", values);
        assert_eq!(weights.stored(pos, CellIdx::new(3, 2)), Some(15.0));
    }

    #[test]
    fn token_outside_vocab_is_rejected() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut weights = ModelWeights::synthetic(&layout, 1);
        weights.tokens[4] = 9;
        assert!(matches!(
            weights.validate(&layout),
            Err(ConfigError::TokenOutOfVocab {
                token: 9,
                position: 4,
                ..
            })
        ));
    }

    #[test]
    fn wrong_length_tensor_is_dropped() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut weights = ModelWeights::synthetic(&layout, 1);
        weights.set_tensor("lm_head", vec![0.0; 3]);
        weights.validate(&layout).unwrap();
        assert!(weights.tensor("lm_head").is_none());
        assert!(weights.tensor("tok_embed").is_some());
    }

    #[test]
    fn load_round_trips_through_json() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let weights = ModelWeights::synthetic(&layout, 3);
        let path = std::env::temp_dir().join(format!("llmviz-weights-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&weights).unwrap()).unwrap();

        let loaded = ModelWeights::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.tokens, weights.tokens);
        assert_eq!(loaded.tensor("lm_head"), weights.tensor("lm_head"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ModelWeights::load(Path::new("/nonexistent/weights.json")).unwrap_err();
        assert!(matches!(err, ConfigError::WeightsIo { .. }));
        assert!(err.to_string().contains("/nonexistent/weights.json"));
    }
}
