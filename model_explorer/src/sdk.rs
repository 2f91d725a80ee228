//! SDK entry points and builder for composing the walkthrough app.

use bevy::input::InputPlugin;
use bevy::prelude::*;

use crate::config::{self, ExplorerConfig};
use crate::data::ModelWeights;
use crate::error::ConfigError;
use crate::layout::{build_layout, ModelShape};
use crate::particles::ParticleFlowSystem;
use crate::render::render_plugin;
use crate::scene::{scene_plugin, SceneModel};
use crate::ui::{hud_plugin, inspector_plugin, minimap_plugin, timeline_plugin};
use crate::walkthrough::{walkthrough_plugin, Phase, Walkthrough};

const DEFAULT_SEED: u64 = 0x5eed;

/// Builder for constructing the explorer app with customizable plugins.
pub struct ModelExplorerBuilder {
    config: Option<ExplorerConfig>,
    shape: Option<ModelShape>,
    weights: Option<ModelWeights>,
    particles: Option<usize>,
    start_phase: Option<Phase>,
    autoplay: bool,
    seed: u64,
    window_title: String,
    window_resolution: (f32, f32),
    clear_color: Color,
    headless: bool,
    enable_hud: bool,
    enable_timeline: bool,
    enable_minimap: bool,
    enable_inspector: bool,
}

impl Default for ModelExplorerBuilder {
    fn default() -> Self {
        Self {
            config: None,
            shape: None,
            weights: None,
            particles: None,
            start_phase: None,
            autoplay: false,
            seed: DEFAULT_SEED,
            window_title: "LLM Visualization".to_string(),
            window_resolution: (1280.0, 720.0),
            clear_color: Color::srgb(0.05, 0.05, 0.08),
            headless: false,
            enable_hud: true,
            enable_timeline: true,
            enable_minimap: true,
            enable_inspector: true,
        }
    }
}

impl ModelExplorerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit configuration instead of reading the environment.
    pub fn config(mut self, config: ExplorerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from `LLMVIZ_*` environment variables.
    pub fn env_config(mut self) -> Result<Self, ConfigError> {
        self.config = Some(config::explorer_config()?);
        Ok(self)
    }

    pub fn shape(mut self, shape: ModelShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// In-memory weights; takes precedence over any weights file in the configuration.
    pub fn weights(mut self, weights: ModelWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn particles(mut self, capacity: usize) -> Self {
        self.particles = Some(capacity);
        self
    }

    pub fn start_phase(mut self, phase: Phase) -> Self {
        self.start_phase = Some(phase);
        self
    }

    /// Play through phases without stopping at their ends.
    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    /// Seed for synthetic weights and particle jitter.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn window_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = title.into();
        self
    }

    pub fn window_resolution(mut self, width: f32, height: f32) -> Self {
        self.window_resolution = (width, height);
        self
    }

    pub fn clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    /// No window, renderer or UI: just the frame loop. For tests and tooling.
    pub fn headless(mut self) -> Self {
        self.headless = true;
        self
    }

    pub fn disable_hud(mut self) -> Self {
        self.enable_hud = false;
        self
    }

    pub fn disable_timeline(mut self) -> Self {
        self.enable_timeline = false;
        self
    }

    pub fn disable_minimap(mut self) -> Self {
        self.enable_minimap = false;
        self
    }

    pub fn disable_inspector(mut self) -> Self {
        self.enable_inspector = false;
        self
    }

    /// Lays out the model and loads (or synthesizes) its weights.
    pub fn build_model(&self) -> Result<SceneModel, ConfigError> {
        let config = self.config.clone().unwrap_or_default();
        let shape = self.shape.unwrap_or(config.shape);
        let layout = build_layout(&shape)?;

        let mut weights = match (&self.weights, &config.weights) {
            (Some(weights), _) => weights.clone(),
            (None, Some(path)) => {
                info!("weights: loading {}", path.display());
                ModelWeights::load(path)?
            }
            (None, None) => ModelWeights::synthetic(&layout, self.seed),
        };
        weights.validate(&layout)?;

        info!(
            "layout: {} blocks, {} parameters (T={} C={} heads={} layers={})",
            layout.len(),
            layout.parameter_count(),
            shape.seq_len,
            shape.channels,
            shape.heads,
            shape.layers,
        );
        Ok(SceneModel::new(layout, weights))
    }

    /// Build the Bevy app with the selected configuration and plugins.
    pub fn build(self) -> Result<App, ConfigError> {
        let model = self.build_model()?;
        let config = self.config.clone().unwrap_or_default();
        let capacity = self.particles.unwrap_or(config.particles);
        let start = self.start_phase.unwrap_or(config.start_phase);

        let mut walkthrough = Walkthrough::new(start);
        walkthrough.autoplay = self.autoplay;
        if self.autoplay {
            walkthrough.toggle();
        }

        let mut app = App::new();
        if self.headless {
            app.add_plugins((MinimalPlugins, InputPlugin));
        } else {
            app.add_plugins(DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: self.window_title,
                    resolution: self.window_resolution.into(),
                    ..default()
                }),
                ..default()
            }))
            .insert_resource(ClearColor(self.clear_color));
        }

        app.insert_resource(model)
            .insert_resource(walkthrough)
            .insert_resource(ParticleFlowSystem::new(capacity, self.seed))
            .add_plugins((walkthrough_plugin, scene_plugin));

        if self.headless {
            return Ok(app);
        }

        app.add_plugins(render_plugin);
        if self.enable_hud {
            app.add_plugins(hud_plugin);
        }
        if self.enable_timeline {
            app.add_plugins(timeline_plugin);
        }
        if self.enable_minimap {
            app.add_plugins(minimap_plugin);
        }
        if self.enable_inspector {
            app.add_plugins(inspector_plugin);
        }

        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_shape_fails_before_the_app_exists() {
        let shape = ModelShape {
            heads: 4,
            ..ModelShape::default()
        };
        let result = ModelExplorerBuilder::new().shape(shape).headless().build();
        assert!(matches!(result, Err(ConfigError::HeadSplit { .. })));
    }

    #[test]
    fn synthetic_weights_are_seeded() {
        let a = ModelExplorerBuilder::new().seed(3).build_model().unwrap();
        let b = ModelExplorerBuilder::new().seed(3).build_model().unwrap();
        let c = ModelExplorerBuilder::new().seed(4).build_model().unwrap();
        assert_eq!(a.weights, b.weights);
        assert_ne!(a.weights, c.weights);
    }

    #[test]
    fn weights_with_the_wrong_token_count_are_rejected() {
        let model = ModelExplorerBuilder::new().build_model().unwrap();
        let mut weights = model.weights.clone();
        weights.tokens.pop();
        let result = ModelExplorerBuilder::new().weights(weights).build_model();
        assert!(matches!(result, Err(ConfigError::TokenCount { .. })));
    }

    #[test]
    fn headless_app_enters_the_start_phase() {
        let mut app = ModelExplorerBuilder::new()
            .start_phase(Phase::Softmax)
            .particles(64)
            .headless()
            .build()
            .unwrap();
        app.update();

        let walkthrough = app.world().resource::<Walkthrough>();
        assert_eq!(walkthrough.phase(), Phase::Softmax);
        assert!(walkthrough.phase_length() > 0.0);
        assert_eq!(app.world().resource::<ParticleFlowSystem>().capacity(), 64);
    }
}
