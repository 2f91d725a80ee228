use bevy::prelude::*;
use model_explorer::data::{ChromeFeed, EXAMPLE_TOKENS};
use model_explorer::layout::{build_layout, ModelShape};
use model_explorer::scene::SceneModel;
use model_explorer::walkthrough::{
    Advance, CurrentFrame, FrameSet, Phase, Walkthrough, WalkthroughChanged, WalkthroughEngine,
};
use model_explorer::ModelExplorerBuilder;

#[test]
fn scrubbing_back_reproduces_the_frame() {
    let layout = build_layout(&ModelShape::default()).unwrap();
    let mut engine = WalkthroughEngine::default();

    for (epoch, phase) in Phase::ALL.into_iter().enumerate() {
        let length = engine.enter(phase, epoch as u64, &layout).length();
        let mut walkthrough = Walkthrough::new(phase);
        walkthrough.set_phase_length(length);

        walkthrough.scrub(length * 0.3);
        let at_x = engine.render(&layout, &EXAMPLE_TOKENS, walkthrough.time());
        walkthrough.scrub(length * 0.8);
        let at_y = engine.render(&layout, &EXAMPLE_TOKENS, walkthrough.time());
        walkthrough.scrub(length * 0.3);
        let again = engine.render(&layout, &EXAMPLE_TOKENS, walkthrough.time());

        assert_eq!(at_x, again, "{phase:?} differs after scrubbing back");
        assert_eq!(at_y, engine.render(&layout, &EXAMPLE_TOKENS, length * 0.8));
    }
}

#[test]
fn playing_stops_at_every_breakpoint_then_finishes() {
    let layout = build_layout(&ModelShape::default()).unwrap();
    let mut engine = WalkthroughEngine::default();
    let script = engine.enter(Phase::Embedding, 0, &layout).clone();
    assert!(!script.breakpoints().is_empty());

    let mut walkthrough = Walkthrough::new(Phase::Embedding);
    walkthrough.set_phase_length(script.length());
    walkthrough.toggle();

    let mut stops = Vec::new();
    for _ in 0..100_000 {
        match walkthrough.advance(1.0 / 60.0, &script) {
            Advance::Breakpoint(at) => {
                stops.push(at);
                walkthrough.toggle();
            }
            Advance::Finished => break,
            Advance::Playing => {}
            Advance::Paused => panic!("paused without a breakpoint"),
        }
    }

    assert_eq!(stops, script.breakpoints());
    assert_eq!(walkthrough.time(), script.length());
    assert!(!walkthrough.running());
}

#[test]
fn headless_app_publishes_snapshots_and_transitions() {
    let mut app = ModelExplorerBuilder::new()
        .start_phase(Phase::LayerNorm)
        .headless()
        .build()
        .unwrap();
    let rx = app.world_mut().resource_mut::<ChromeFeed>().subscribe();

    app.update();
    app.update();

    let snapshot = rx.try_iter().last().expect("snapshot published");
    assert_eq!(snapshot.phase, Phase::LayerNorm);
    assert!(snapshot.phase_length > 0.0);
    assert!(app.world().resource::<CurrentFrame>().overlay.is_some());

    app.world_mut().resource_mut::<Walkthrough>().next();
    app.update();

    let changed: Vec<Phase> = app
        .world_mut()
        .resource_mut::<Events<WalkthroughChanged>>()
        .drain()
        .map(|e| e.phase)
        .collect();
    assert_eq!(changed.last(), Some(&Phase::SelfAttention));
    assert_eq!(
        rx.try_iter().last().map(|s| s.phase),
        Some(Phase::SelfAttention)
    );
}

#[test]
fn restart_rebuilds_the_current_phase() {
    let mut app = ModelExplorerBuilder::new()
        .start_phase(Phase::Mlp)
        .headless()
        .build()
        .unwrap();
    app.update();
    app.world_mut()
        .resource_mut::<Events<WalkthroughChanged>>()
        .clear();

    {
        let mut walkthrough = app.world_mut().resource_mut::<Walkthrough>();
        let half = walkthrough.phase_length() * 0.5;
        walkthrough.scrub(half);
        walkthrough.restart();
    }
    app.update();

    let walkthrough = app.world().resource::<Walkthrough>();
    assert_eq!(walkthrough.phase(), Phase::Mlp);
    assert_eq!(walkthrough.time(), 0.0);
    let events = app.world().resource::<Events<WalkthroughChanged>>();
    assert_eq!(events.len(), 1);
}

#[derive(Resource, Default)]
struct PendingJump(Option<Phase>);

fn jump_from_input(mut pending: ResMut<PendingJump>, mut walkthrough: ResMut<Walkthrough>) {
    if let Some(phase) = pending.0.take() {
        walkthrough.jump_to(phase);
    }
}

#[test]
fn input_jump_is_applied_before_the_frame_is_composed() {
    let mut app = ModelExplorerBuilder::new()
        .start_phase(Phase::Embedding)
        .headless()
        .build()
        .unwrap();
    app.init_resource::<PendingJump>()
        .add_systems(Update, jump_from_input.in_set(FrameSet::Input));
    let rx = app.world_mut().resource_mut::<ChromeFeed>().subscribe();
    app.update();
    app.update();

    app.world_mut().resource_mut::<PendingJump>().0 = Some(Phase::Mlp);
    app.update();

    let world = app.world();
    let walkthrough = world.resource::<Walkthrough>();
    let engine = world.resource::<WalkthroughEngine>();
    let model = world.resource::<SceneModel>();
    assert_eq!(engine.phase(), Phase::Mlp);
    assert_eq!(walkthrough.phase_length(), engine.script().length());

    let expected = engine.render(&model.layout, &model.weights.tokens, walkthrough.time());
    let composed = world.resource::<CurrentFrame>().overlay.clone();
    assert_eq!(composed, Some(expected));

    let snapshot = rx.try_iter().last().expect("snapshot published");
    assert_eq!(snapshot.phase, Phase::Mlp);
    assert_eq!(snapshot.phase_length, engine.script().length());
}
