use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;

/// One chapter of the walkthrough.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intro,
    Prelim,
    Embedding,
    LayerNorm,
    SelfAttention,
    Softmax,
    Projection,
    Mlp,
    Transformer,
    Output,
    Training,
}

impl Phase {
    /// Narrative order.
    pub const ALL: [Phase; 11] = [
        Phase::Intro,
        Phase::Prelim,
        Phase::Embedding,
        Phase::LayerNorm,
        Phase::SelfAttention,
        Phase::Softmax,
        Phase::Projection,
        Phase::Mlp,
        Phase::Transformer,
        Phase::Output,
        Phase::Training,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Phase> {
        Phase::ALL.get(index).copied()
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::Intro => "Introduction",
            Phase::Prelim => "Preliminaries",
            Phase::Embedding => "Embedding",
            Phase::LayerNorm => "Layer Norm",
            Phase::SelfAttention => "Self Attention",
            Phase::Softmax => "Softmax",
            Phase::Projection => "Projection",
            Phase::Mlp => "MLP",
            Phase::Transformer => "Transformer",
            Phase::Output => "Output",
            Phase::Training => "Training",
        }
    }

    /// Stable identifier used in configuration and snapshots.
    pub fn key(self) -> &'static str {
        match self {
            Phase::Intro => "intro",
            Phase::Prelim => "prelim",
            Phase::Embedding => "embedding",
            Phase::LayerNorm => "layer_norm",
            Phase::SelfAttention => "self_attention",
            Phase::Softmax => "softmax",
            Phase::Projection => "projection",
            Phase::Mlp => "mlp",
            Phase::Transformer => "transformer",
            Phase::Output => "output",
            Phase::Training => "training",
        }
    }

    pub fn group(self) -> PhaseGroupId {
        match self {
            Phase::Intro | Phase::Prelim => PhaseGroupId::Intro,
            Phase::Training => PhaseGroupId::Training,
            _ => PhaseGroupId::DetailedInput,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Phase::ALL
            .into_iter()
            .find(|p| p.key() == wanted)
            .ok_or_else(|| ConfigError::UnknownPhase(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseGroupId {
    Intro,
    DetailedInput,
    Training,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhaseGroup {
    pub id: PhaseGroupId,
    pub title: &'static str,
    pub phases: Vec<Phase>,
}

pub fn phase_groups() -> Vec<PhaseGroup> {
    let group = |id, title| PhaseGroup {
        id,
        title,
        phases: Phase::ALL.into_iter().filter(|p| p.group() == id).collect(),
    };
    vec![
        group(PhaseGroupId::Intro, "Introduction"),
        group(PhaseGroupId::DetailedInput, "Detailed Input"),
        group(PhaseGroupId::Training, "Training"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_order() {
        for (i, p) in Phase::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
            assert_eq!(Phase::from_index(i), Some(*p));
        }
        assert_eq!(Phase::from_index(Phase::ALL.len()), None);
    }

    #[test]
    fn parses_keys_loosely() {
        assert_eq!("layer_norm".parse::<Phase>().unwrap(), Phase::LayerNorm);
        assert_eq!("Self-Attention".parse::<Phase>().unwrap(), Phase::SelfAttention);
        assert!(matches!(
            "decoder".parse::<Phase>(),
            Err(ConfigError::UnknownPhase(s)) if s == "decoder"
        ));
    }

    #[test]
    fn groups_cover_every_phase_once() {
        let flat: Vec<Phase> = phase_groups().into_iter().flat_map(|g| g.phases).collect();
        assert_eq!(flat, Phase::ALL.to_vec());
    }
}
