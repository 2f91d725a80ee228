use bevy::log::{debug, info};
use bevy::prelude::Resource;

use super::overlay::FrameOverlay;
use super::phase::Phase;
use super::phases;
use super::timeline::{PhaseScript, Windows};
use crate::layout::{DependencyResolver, ModelLayout};

/// Read-only inputs a handler sees for one frame.
pub struct PhaseFrame<'a> {
    pub layout: &'a ModelLayout,
    pub resolver: DependencyResolver<'a>,
    pub windows: Windows<'a>,
    pub time: f32,
}

/// One phase of the walkthrough. `script` runs once on entry; `render` runs every frame and
/// must depend only on the frame it is given.
pub trait PhaseHandler: Send + Sync {
    fn phase(&self) -> Phase;

    fn script(&self, layout: &ModelLayout) -> PhaseScript;

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay);
}

/// Phase-indexed table of handlers.
pub struct PhaseRegistry {
    handlers: Vec<Option<Box<dyn PhaseHandler>>>,
}

impl Default for PhaseRegistry {
    fn default() -> Self {
        Self {
            handlers: Phase::ALL.iter().map(|_| None).collect(),
        }
    }
}

impl PhaseRegistry {
    /// Every built-in phase.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        for handler in phases::all() {
            registry.register(handler);
        }
        registry
    }

    /// Replaces any handler already registered for the same phase.
    pub fn register(&mut self, handler: Box<dyn PhaseHandler>) {
        let i = handler.phase().index();
        self.handlers[i] = Some(handler);
    }

    pub fn get(&self, phase: Phase) -> Option<&dyn PhaseHandler> {
        self.handlers.get(phase.index())?.as_deref()
    }
}

#[derive(Resource)]
pub struct WalkthroughEngine {
    registry: PhaseRegistry,
    phase: Phase,
    script: PhaseScript,
    /// Walkthrough epoch the current script was built for.
    entered: Option<u64>,
}

impl Default for WalkthroughEngine {
    fn default() -> Self {
        Self::new(PhaseRegistry::standard())
    }
}

impl WalkthroughEngine {
    pub fn new(registry: PhaseRegistry) -> Self {
        Self {
            registry,
            phase: Phase::Intro,
            script: PhaseScript::empty(),
            entered: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn script(&self) -> &PhaseScript {
        &self.script
    }

    /// Whether the current script was built for this walkthrough epoch.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.entered == Some(epoch)
    }

    /// Builds the script for `phase`. Nothing from the previous phase survives.
    pub fn enter(&mut self, phase: Phase, epoch: u64, layout: &ModelLayout) -> &PhaseScript {
        self.phase = phase;
        self.entered = Some(epoch);
        self.script = match self.registry.get(phase) {
            Some(handler) => {
                let script = handler.script(layout);
                debug_assert_eq!(
                    script.window_names(),
                    handler.script(layout).window_names(),
                    "{phase:?} script is not deterministic"
                );
                script
            }
            None => PhaseScript::empty(),
        };
        info!(
            "walkthrough: entering {} ({} windows, {:.1}s)",
            phase.title(),
            self.script.windows().len(),
            self.script.length()
        );
        debug!("walkthrough: windows {:?}", self.script.window_names());
        &self.script
    }

    /// The overlay for `time` seconds into the current phase.
    pub fn render(&self, layout: &ModelLayout, tokens: &[usize], time: f32) -> FrameOverlay {
        let windows = self.script.evaluate(time);
        let camera = self.script.camera(&windows);
        let mut overlay = FrameOverlay::new(layout, camera);
        if let Some(handler) = self.registry.get(self.phase) {
            let frame = PhaseFrame {
                layout,
                resolver: DependencyResolver::new(layout, tokens),
                windows,
                time,
            };
            handler.render(&frame, &mut overlay);
        }
        overlay
    }
}
