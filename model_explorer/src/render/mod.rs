//! Draws the composed frame: block cuboids with their highlights, then flow particles.

mod batch;
mod cuboids;
pub mod palette;
mod particles;

use bevy::asset::embedded_asset;
use bevy::prelude::*;

use crate::walkthrough::FrameSet;

pub use batch::{CuboidBatch, CuboidInstance, HoverTarget, InstanceKind};
pub(crate) use batch::ray_aabb_intersect;
pub use cuboids::CuboidSlot;
pub use particles::{ParticleBuffers, ParticleMaterial, ParticleSprites, ATTRIBUTE_PARTICLE_SIZE};

#[derive(Clone, Debug)]
pub struct CuboidSettings {
    /// Shrinks every block on each side so neighbours stay visually apart.
    pub gap: f32,
    /// Highlight boxes grow by this much on each side so they wrap the cells they mark.
    pub highlight_pad: f32,
    pub highlight_alpha: f32,
}

#[derive(Resource, Clone, Debug)]
pub struct RenderSettings {
    pub cuboid: CuboidSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            cuboid: CuboidSettings {
                gap: 0.02,
                highlight_pad: 0.05,
                highlight_alpha: 0.6,
            },
        }
    }
}

impl Default for CuboidSettings {
    fn default() -> Self {
        RenderSettings::default().cuboid
    }
}

pub fn render_plugin(app: &mut App) {
    embedded_asset!(app, "flow_particle.wgsl");

    app.add_plugins(MaterialPlugin::<ParticleMaterial>::default())
        .init_resource::<RenderSettings>()
        .init_resource::<CuboidBatch>()
        .init_resource::<cuboids::CuboidPool>()
        .init_resource::<ParticleBuffers>()
        .init_resource::<HoverTarget>()
        .add_systems(Startup, particles::spawn_particle_sprites)
        .add_systems(
            Update,
            (
                (cuboids::build_batch, cuboids::sync_cuboids).chain(),
                (particles::fill_particle_buffers, particles::upload_particles).chain(),
            )
                .in_set(FrameSet::Render),
        );
}
