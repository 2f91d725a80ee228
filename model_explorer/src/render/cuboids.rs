//! Keeps one entity per batch instance alive across frames and restyles it in place.
//!
//! All slots share one unit cube mesh, and materials are cached by quantized colour and shading
//! so equal-looking cuboids share a handle and batch into the same draw.

use std::collections::HashMap;

use bevy::prelude::*;

use super::batch::{CuboidBatch, InstanceKind};
use super::RenderSettings;
use crate::scene::SceneModel;
use crate::walkthrough::CurrentFrame;

#[derive(Component, Debug, Clone, Copy)]
pub struct CuboidSlot(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MaterialKey {
    rgba: [u8; 4],
    unlit: bool,
}

impl MaterialKey {
    fn new(color: LinearRgba, unlit: bool) -> Self {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            rgba: [q(color.red), q(color.green), q(color.blue), q(color.alpha)],
            unlit,
        }
    }

    fn material(&self) -> StandardMaterial {
        let [r, g, b, a] = self.rgba.map(|c| c as f32 / 255.0);
        StandardMaterial {
            base_color: LinearRgba::new(r, g, b, a).into(),
            alpha_mode: AlphaMode::Blend,
            unlit: self.unlit,
            ..default()
        }
    }
}

struct Slot {
    entity: Entity,
    key: MaterialKey,
}

#[derive(Resource, Default)]
pub(crate) struct CuboidPool {
    mesh: Option<Handle<Mesh>>,
    materials: HashMap<MaterialKey, Handle<StandardMaterial>>,
    slots: Vec<Slot>,
}

impl CuboidPool {
    fn mesh(&mut self, meshes: &mut Assets<Mesh>) -> Handle<Mesh> {
        self.mesh
            .get_or_insert_with(|| meshes.add(Cuboid::new(1.0, 1.0, 1.0)))
            .clone()
    }

    fn material(
        &mut self,
        materials: &mut Assets<StandardMaterial>,
        key: MaterialKey,
    ) -> Handle<StandardMaterial> {
        self.materials
            .entry(key)
            .or_insert_with(|| materials.add(key.material()))
            .clone()
    }
}

pub(crate) fn build_batch(
    model: Res<SceneModel>,
    frame: Res<CurrentFrame>,
    settings: Res<RenderSettings>,
    mut batch: ResMut<CuboidBatch>,
) {
    if let Some(overlay) = frame.overlay.as_ref() {
        batch.rebuild(&model.layout, overlay, &settings.cuboid);
    }
}

pub(crate) fn sync_cuboids(
    mut commands: Commands,
    batch: Res<CuboidBatch>,
    mut pool: ResMut<CuboidPool>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut slots: Query<
        (
            &mut Transform,
            &mut Visibility,
            &mut MeshMaterial3d<StandardMaterial>,
        ),
        With<CuboidSlot>,
    >,
) {
    let mesh = pool.mesh(&mut meshes);

    for (i, inst) in batch.instances().iter().enumerate() {
        let transform = Transform::from_translation(inst.center()).with_scale(inst.size);
        let key = MaterialKey::new(inst.color, inst.kind == InstanceKind::Highlight);

        let Some(slot) = pool.slots.get(i) else {
            let material = pool.material(&mut materials, key);
            let entity = commands
                .spawn((
                    Mesh3d(mesh.clone()),
                    MeshMaterial3d(material),
                    transform,
                    CuboidSlot(i),
                ))
                .id();
            pool.slots.push(Slot { entity, key });
            continue;
        };
        let (entity, current_key) = (slot.entity, slot.key);

        let Ok((mut current, mut visibility, mut handle)) = slots.get_mut(entity) else {
            continue;
        };
        *current = transform;
        *visibility = Visibility::Inherited;
        if current_key != key {
            handle.0 = pool.material(&mut materials, key);
            pool.slots[i].key = key;
        }
    }

    for slot in pool.slots.iter().skip(batch.len()) {
        if let Ok((_, mut visibility, _)) = slots.get_mut(slot.entity) {
            *visibility = Visibility::Hidden;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::RunSystemOnce;
    use crate::data::ModelWeights;
    use crate::layout::{build_layout, ModelShape};
    use crate::render::CuboidInstance;
    use crate::walkthrough::{walkthrough_plugin, FrameSet};

    fn app() -> App {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let weights = ModelWeights::synthetic(&layout, 1);

        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_resource::<ButtonInput<KeyCode>>()
            .init_asset::<Mesh>()
            .init_asset::<StandardMaterial>()
            .insert_resource(SceneModel::new(layout, weights))
            .init_resource::<RenderSettings>()
            .init_resource::<CuboidBatch>()
            .init_resource::<CuboidPool>()
            .add_plugins(walkthrough_plugin)
            .add_systems(
                Update,
                (build_batch, sync_cuboids).chain().in_set(FrameSet::Render),
            );
        app
    }

    fn slot_material(app: &mut App, index: usize) -> StandardMaterial {
        let world = app.world_mut();
        let handle = world
            .query::<(&CuboidSlot, &MeshMaterial3d<StandardMaterial>)>()
            .iter(world)
            .find(|(slot, _)| slot.0 == index)
            .map(|(_, m)| m.0.clone())
            .unwrap();
        world
            .resource::<Assets<StandardMaterial>>()
            .get(&handle)
            .cloned()
            .unwrap()
    }

    #[test]
    fn pool_spawns_one_entity_per_instance_and_shares_materials() {
        let mut app = app();
        app.update();
        app.update();

        let world = app.world_mut();
        let spawned = world.query::<&CuboidSlot>().iter(world).count();
        let batch = app.world().resource::<CuboidBatch>().len();
        assert!(batch > 0);
        assert!(spawned >= batch);

        let cached = app.world().resource::<CuboidPool>().materials.len();
        assert!(cached < batch);
        assert_eq!(
            app.world().resource::<Assets<StandardMaterial>>().len(),
            cached
        );
    }

    #[test]
    fn equal_colours_share_a_handle_per_shading() {
        let mut pool = CuboidPool::default();
        let mut materials = Assets::<StandardMaterial>::default();
        let lit = MaterialKey::new(LinearRgba::rgb(0.2, 0.4, 0.8), false);
        let unlit = MaterialKey { unlit: true, ..lit };

        let again = MaterialKey::new(LinearRgba::rgb(0.2, 0.4, 0.8), false);

        let a = pool.material(&mut materials, lit);
        let b = pool.material(&mut materials, again);
        let c = pool.material(&mut materials, unlit);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!materials.get(&a).unwrap().unlit);
        assert!(materials.get(&c).unwrap().unlit);
    }

    #[test]
    fn slot_switching_from_highlight_to_block_becomes_lit() {
        let mut app = app();
        app.update();
        let block = app.world().resource::<CuboidBatch>().instances()[0];
        assert!(matches!(block.kind, InstanceKind::Block { .. }));
        let highlight = CuboidInstance {
            kind: InstanceKind::Highlight,
            ..block
        };

        let run = |app: &mut App, inst: CuboidInstance| {
            app.insert_resource(CuboidBatch::from_instances(vec![inst]));
            app.world_mut().run_system_once(sync_cuboids).unwrap();
        };

        run(&mut app, highlight);
        assert!(slot_material(&mut app, 0).unlit);
        run(&mut app, block);
        assert!(!slot_material(&mut app, 0).unlit);
    }
}
