//! The model being walked through, plus the camera and lights that look at it.

use bevy::prelude::*;

use crate::camera::CameraState;
use crate::data::ModelWeights;
use crate::layout::ModelLayout;
use crate::walkthrough::{CurrentFrame, FrameSet};

/// Immutable layout and the weights/tokens whose values it shows.
#[derive(Resource, Debug)]
pub struct SceneModel {
    pub layout: ModelLayout,
    pub weights: ModelWeights,
}

impl SceneModel {
    pub fn new(layout: ModelLayout, weights: ModelWeights) -> Self {
        Self { layout, weights }
    }
}

pub fn scene_plugin(app: &mut App) {
    app.add_systems(Startup, setup_scene)
        .add_systems(Update, apply_camera.in_set(FrameSet::Render));
}

pub fn setup_scene(mut commands: Commands, model: Res<SceneModel>) {
    commands.spawn((Camera3d::default(), CameraState::overview(&model.layout).transform()));
    commands.spawn((
        DirectionalLight::default(),
        Transform::from_xyz(4., 8., 4.).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 400.0,
    });
}

/// Moves the camera to wherever the current phase wants it.
fn apply_camera(frame: Res<CurrentFrame>, mut cameras: Query<&mut Transform, With<Camera3d>>) {
    let Some(overlay) = frame.overlay.as_ref() else {
        return;
    };
    let target = overlay.camera.transform();
    for mut transform in &mut cameras {
        *transform = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{build_layout, ModelShape};
    use crate::walkthrough::{Phase, WalkthroughEngine};

    fn model() -> SceneModel {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let weights = ModelWeights::synthetic(&layout, 7);
        SceneModel::new(layout, weights)
    }

    #[test]
    fn setup_scene_spawns_camera_and_light() {
        let mut app = App::new();
        app.insert_resource(model());
        app.add_systems(Startup, setup_scene);

        app.update();

        let world = app.world_mut();
        let camera_count = world.query::<&Camera3d>().iter(world).count();
        let light_count = world.query::<&DirectionalLight>().iter(world).count();

        assert_eq!(camera_count, 1);
        assert!(light_count >= 1);
        assert!(app.world().get_resource::<AmbientLight>().is_some());
    }

    #[test]
    fn overview_looks_at_the_model_center() {
        let model = model();
        let cam = CameraState::overview(&model.layout);
        assert!(cam.target.distance(model.layout.center()) < 1e-3);
        assert!(cam.eye().distance(cam.target) > 0.0);
    }

    #[test]
    fn startup_camera_matches_the_embedding_entry_shot() {
        let model = model();
        let mut engine = WalkthroughEngine::default();
        let entry = engine
            .enter(Phase::Embedding, 0, &model.layout)
            .initial_camera()
            .transform();

        let mut app = App::new();
        app.insert_resource(model);
        app.add_systems(Startup, setup_scene);
        app.update();

        let world = app.world_mut();
        let transform = world
            .query_filtered::<&Transform, With<Camera3d>>()
            .single(world);
        assert!(transform.translation.distance(entry.translation) < 1e-4);
        assert!(transform.rotation.angle_between(entry.rotation) < 1e-4);
    }
}
