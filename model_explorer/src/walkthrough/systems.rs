use bevy::log::debug;
use bevy::prelude::*;

use super::engine::WalkthroughEngine;
use super::input::keyboard_input;
use super::overlay::FrameOverlay;
use super::state::{Advance, Walkthrough};
use super::Phase;
use crate::data::{ChromeFeed, WalkthroughSnapshot};
use crate::particles::ParticleFlowSystem;
use crate::scene::SceneModel;

/// Per-frame order: input, then time, then the overlay, then particles, then drawing.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSet {
    Input,
    Advance,
    Compose,
    Simulate,
    Render,
}

/// Sent whenever a new phase script has been entered.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkthroughChanged {
    pub phase: Phase,
}

/// Overlay composed this frame, read by the renderer and the UI.
#[derive(Resource, Default)]
pub struct CurrentFrame {
    pub overlay: Option<FrameOverlay>,
}

pub fn walkthrough_plugin(app: &mut App) {
    app.init_resource::<Walkthrough>()
        .init_resource::<WalkthroughEngine>()
        .init_resource::<ParticleFlowSystem>()
        .init_resource::<ChromeFeed>()
        .init_resource::<CurrentFrame>()
        .add_event::<WalkthroughChanged>()
        .configure_sets(
            Update,
            (
                FrameSet::Input,
                FrameSet::Advance,
                FrameSet::Compose,
                FrameSet::Simulate,
                FrameSet::Render,
            )
                .chain(),
        )
        .add_systems(Startup, attach_particles)
        .add_systems(Update, keyboard_input.in_set(FrameSet::Input))
        .add_systems(Update, advance_walkthrough.in_set(FrameSet::Advance))
        .add_systems(
            Update,
            (compose_frame, publish_snapshot).in_set(FrameSet::Compose),
        )
        .add_systems(Update, simulate_particles.in_set(FrameSet::Simulate));
}

fn attach_particles(model: Res<SceneModel>, mut particles: ResMut<ParticleFlowSystem>) {
    particles.set_layout(&model.layout);
}

/// Rebuilds per-phase state when the walkthrough moved to a new phase (or restarted).
fn sync_phase(
    model: &SceneModel,
    walkthrough: &mut Walkthrough,
    engine: &mut WalkthroughEngine,
    particles: &mut ParticleFlowSystem,
    changed: &mut EventWriter<WalkthroughChanged>,
) {
    if engine.is_current(walkthrough.epoch()) {
        return;
    }
    let phase = walkthrough.phase();
    let length = engine.enter(phase, walkthrough.epoch(), &model.layout).length();
    walkthrough.set_phase_length(length);
    particles.reset();
    changed.send(WalkthroughChanged { phase });
}

fn advance_walkthrough(
    time: Res<Time>,
    model: Res<SceneModel>,
    mut walkthrough: ResMut<Walkthrough>,
    mut engine: ResMut<WalkthroughEngine>,
    mut particles: ResMut<ParticleFlowSystem>,
    mut changed: EventWriter<WalkthroughChanged>,
) {
    sync_phase(&model, &mut walkthrough, &mut engine, &mut particles, &mut changed);

    let outcome = walkthrough.advance(time.delta_secs(), engine.script());
    match outcome {
        Advance::Breakpoint(at) => debug!("walkthrough: paused at breakpoint {at:.2}s"),
        Advance::Finished if walkthrough.autoplay => {
            if walkthrough.next() {
                sync_phase(&model, &mut walkthrough, &mut engine, &mut particles, &mut changed);
            }
        }
        _ => {}
    }
}

fn compose_frame(
    model: Res<SceneModel>,
    walkthrough: Res<Walkthrough>,
    engine: Res<WalkthroughEngine>,
    mut particles: ResMut<ParticleFlowSystem>,
    mut current: ResMut<CurrentFrame>,
) {
    let overlay = engine.render(&model.layout, &model.weights.tokens, walkthrough.time());
    particles.clear_paths();
    for flow in &overlay.flows {
        particles.add_path(flow.from, flow.to, flow.color, flow.count);
    }
    current.overlay = Some(overlay);
}

/// Particles keep moving while the walkthrough is paused.
fn simulate_particles(
    time: Res<Time>,
    walkthrough: Res<Walkthrough>,
    mut particles: ResMut<ParticleFlowSystem>,
) {
    particles.update(time.delta_secs() * walkthrough.speed());
}

fn publish_snapshot(
    walkthrough: Res<Walkthrough>,
    mut feed: ResMut<ChromeFeed>,
    mut last: Local<Option<WalkthroughSnapshot>>,
) {
    let snapshot = walkthrough.snapshot();
    if last.as_ref() != Some(&snapshot) {
        feed.publish(snapshot);
        *last = Some(snapshot);
    }
}
