//! One handler per phase.

mod attention;
mod common;
mod embedding;
mod intro;
mod layer_norm;
mod mlp;
mod projection;
mod training;
mod transformer;

use super::engine::PhaseHandler;

pub(crate) fn all() -> Vec<Box<dyn PhaseHandler>> {
    vec![
        Box::new(intro::IntroPhase),
        Box::new(intro::PrelimPhase),
        Box::new(embedding::EmbeddingPhase),
        Box::new(layer_norm::LayerNormPhase),
        Box::new(attention::SelfAttentionPhase),
        Box::new(attention::SoftmaxPhase),
        Box::new(projection::ProjectionPhase),
        Box::new(mlp::MlpPhase),
        Box::new(transformer::TransformerPhase),
        Box::new(transformer::OutputPhase),
        Box::new(training::TrainingPhase),
    ]
}
