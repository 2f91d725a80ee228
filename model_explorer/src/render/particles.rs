//! Particle sprites: one camera-facing quad per live particle, additively blended.
//!
//! The simulation is copied into fixed-size CPU arrays every frame and only the filled prefix
//! is expanded into the vertex buffer.

use bevy::color::ColorToComponents;
use bevy::pbr::{MaterialPipeline, MaterialPipelineKey};
use bevy::prelude::*;
use bevy::render::mesh::{
    Indices, MeshVertexAttribute, MeshVertexBufferLayoutRef, PrimitiveTopology,
};
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{
    AsBindGroup, RenderPipelineDescriptor, ShaderRef, SpecializedMeshPipelineError, VertexFormat,
};
use bevy::render::view::NoFrustumCulling;

use crate::particles::ParticleFlowSystem;

pub(crate) const SHADER_PATH: &str = "embedded://model_explorer/render/flow_particle.wgsl";

pub const ATTRIBUTE_PARTICLE_SIZE: MeshVertexAttribute =
    MeshVertexAttribute::new("ParticleSize", 988_540_917, VertexFormat::Float32);

const CORNERS: [[f32; 2]; 4] = [[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5], [-0.5, 0.5]];

#[derive(Asset, TypePath, AsBindGroup, Clone, Debug)]
pub struct ParticleMaterial {
    #[uniform(0)]
    pub tint: LinearRgba,
}

impl Default for ParticleMaterial {
    fn default() -> Self {
        Self {
            tint: LinearRgba::WHITE,
        }
    }
}

impl Material for ParticleMaterial {
    fn vertex_shader() -> ShaderRef {
        SHADER_PATH.into()
    }

    fn fragment_shader() -> ShaderRef {
        SHADER_PATH.into()
    }

    fn alpha_mode(&self) -> AlphaMode {
        AlphaMode::Add
    }

    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        layout: &MeshVertexBufferLayoutRef,
        _key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        let vertex_layout = layout.0.get_layout(&[
            Mesh::ATTRIBUTE_POSITION.at_shader_location(0),
            Mesh::ATTRIBUTE_UV_0.at_shader_location(1),
            Mesh::ATTRIBUTE_COLOR.at_shader_location(2),
            ATTRIBUTE_PARTICLE_SIZE.at_shader_location(3),
        ])?;
        descriptor.vertex.buffers = vec![vertex_layout];
        descriptor.primitive.cull_mode = None;
        if let Some(depth) = descriptor.depth_stencil.as_mut() {
            depth.depth_write_enabled = false;
        }
        Ok(())
    }
}

/// CPU staging for the particle pass, sized to the pool capacity.
#[derive(Resource, Debug)]
pub struct ParticleBuffers {
    centers: Vec<Vec3>,
    colors: Vec<[f32; 4]>,
    sizes: Vec<f32>,
    count: usize,
}

impl Default for ParticleBuffers {
    fn default() -> Self {
        Self::with_capacity(crate::particles::DEFAULT_CAPACITY)
    }
}

impl ParticleBuffers {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            centers: vec![Vec3::ZERO; capacity],
            colors: vec![[0.0; 4]; capacity],
            sizes: vec![0.0; capacity],
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.centers.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Copies every live particle into the front of the arrays.
    pub fn fill(&mut self, system: &ParticleFlowSystem) {
        if self.capacity() < system.capacity() {
            *self = Self::with_capacity(system.capacity());
        }
        self.count = 0;
        for p in system.alive() {
            let i = self.count;
            self.centers[i] = p.position();
            let mut color = p.color;
            color.alpha *= p.alpha();
            self.colors[i] = color.to_f32_array();
            self.sizes[i] = p.size;
            self.count += 1;
        }
    }

    pub fn center(&self, i: usize) -> Option<Vec3> {
        self.centers[..self.count].get(i).copied()
    }

    /// Expands the filled prefix into quads; slots past `count` are never read. With nothing
    /// alive a single zero-sized quad keeps the vertex buffer non-empty.
    pub fn write_mesh(&self, mesh: &mut Mesh) {
        let n = self.count.max(1);
        let mut positions = Vec::with_capacity(n * 4);
        let mut corners = Vec::with_capacity(n * 4);
        let mut colors = Vec::with_capacity(n * 4);
        let mut sizes = Vec::with_capacity(n * 4);
        let mut indices = Vec::with_capacity(n * 6);

        for i in 0..n {
            let base = (i * 4) as u32;
            let (center, color, size) = if i < self.count {
                (self.centers[i], self.colors[i], self.sizes[i])
            } else {
                (Vec3::ZERO, [0.0; 4], 0.0)
            };
            for corner in CORNERS {
                positions.push(center.to_array());
                corners.push(corner);
                colors.push(color);
                sizes.push(size);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, corners);
        mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
        mesh.insert_attribute(ATTRIBUTE_PARTICLE_SIZE, sizes);
        mesh.insert_indices(Indices::U32(indices));
    }
}

#[derive(Component)]
pub struct ParticleSprites;

pub(crate) fn spawn_particle_sprites(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ParticleMaterial>>,
    buffers: Res<ParticleBuffers>,
) {
    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
    );
    buffers.write_mesh(&mut mesh);
    commands.spawn((
        Mesh3d(meshes.add(mesh)),
        MeshMaterial3d(materials.add(ParticleMaterial::default())),
        Transform::IDENTITY,
        Visibility::Hidden,
        NoFrustumCulling,
        ParticleSprites,
    ));
}

pub(crate) fn fill_particle_buffers(
    system: Res<ParticleFlowSystem>,
    mut buffers: ResMut<ParticleBuffers>,
) {
    buffers.fill(&system);
}

pub(crate) fn upload_particles(
    buffers: Res<ParticleBuffers>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut sprites: Query<(&Mesh3d, &mut Visibility), With<ParticleSprites>>,
) {
    for (handle, mut visibility) in &mut sprites {
        if buffers.count() == 0 {
            *visibility = Visibility::Hidden;
            continue;
        }
        if let Some(mesh) = meshes.get_mut(&handle.0) {
            buffers.write_mesh(mesh);
        }
        *visibility = Visibility::Inherited;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{build_layout, ModelShape};
    use crate::render::palette;

    fn running_system() -> ParticleFlowSystem {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut system = ParticleFlowSystem::new(64, 3);
        system.set_layout(&layout);
        system.add_path(
            layout.embedding.tok_embed,
            layout.embedding.residual,
            palette::FLOW,
            8,
        );
        for _ in 0..20 {
            system.update(0.1);
        }
        system
    }

    #[test]
    fn fill_copies_only_live_particles() {
        let system = running_system();
        let mut buffers = ParticleBuffers::with_capacity(64);
        buffers.fill(&system);
        assert_eq!(buffers.count(), system.alive_count());
        assert!(buffers.count() > 0);
        assert!(buffers.center(buffers.count()).is_none());
        let first = system.alive().next().unwrap();
        assert_eq!(buffers.center(0), Some(first.position()));
    }

    #[test]
    fn mesh_has_four_vertices_per_particle() {
        let system = running_system();
        let mut buffers = ParticleBuffers::with_capacity(64);
        buffers.fill(&system);

        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        buffers.write_mesh(&mut mesh);
        assert_eq!(mesh.count_vertices(), buffers.count() * 4);
        assert_eq!(mesh.indices().map(|i| i.len()), Some(buffers.count() * 6));
    }

    #[test]
    fn empty_buffers_still_write_a_quad() {
        let buffers = ParticleBuffers::with_capacity(4);
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        buffers.write_mesh(&mut mesh);
        assert_eq!(mesh.count_vertices(), 4);
    }

    #[test]
    fn buffers_grow_to_the_pool_capacity() {
        let system = ParticleFlowSystem::new(900, 0);
        let mut buffers = ParticleBuffers::default();
        buffers.fill(&system);
        assert_eq!(buffers.capacity(), 900);
        assert_eq!(buffers.count(), 0);
    }
}
