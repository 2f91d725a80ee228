use crate::error::ConfigError;

/// Hyperparameters of the visualized transformer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelShape {
    pub vocab: usize,
    pub seq_len: usize,
    pub channels: usize,
    pub heads: usize,
    pub head_width: usize,
    pub layers: usize,
    pub mlp_mult: usize,
}

impl Default for ModelShape {
    fn default() -> Self {
        Self {
            vocab: 3,
            seq_len: 6,
            channels: 48,
            heads: 3,
            head_width: 16,
            layers: 3,
            mlp_mult: 4,
        }
    }
}

impl ModelShape {
    pub fn mlp_width(&self) -> usize {
        self.channels * self.mlp_mult
    }

    /// Rejects zero dimensions and head splits that don't cover the channel width.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [
            ("vocab", self.vocab),
            ("seq_len", self.seq_len),
            ("channels", self.channels),
            ("heads", self.heads),
            ("head_width", self.head_width),
            ("layers", self.layers),
            ("mlp_mult", self.mlp_mult),
        ];
        for (param, value) in dims {
            if value == 0 {
                return Err(ConfigError::NonPositive { param, value });
            }
        }
        if self.heads * self.head_width != self.channels {
            return Err(ConfigError::HeadSplit {
                heads: self.heads,
                head_width: self.head_width,
                channels: self.channels,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shape_is_valid() {
        assert!(ModelShape::default().validate().is_ok());
        assert_eq!(ModelShape::default().mlp_width(), 192);
    }

    #[test]
    fn zero_dimension_names_the_parameter() {
        let shape = ModelShape {
            layers: 0,
            ..ModelShape::default()
        };
        let err = shape.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NonPositive {
                param: "layers",
                ..
            }
        ));
        assert!(err.to_string().contains("layers"));
    }

    #[test]
    fn head_split_must_cover_channels() {
        let shape = ModelShape {
            head_width: 15,
            ..ModelShape::default()
        };
        assert!(matches!(
            shape.validate(),
            Err(ConfigError::HeadSplit { heads: 3, .. })
        ));
    }
}
