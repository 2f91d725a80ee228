//! Pooled particles that travel along curved paths between blocks to show data flow.

use std::collections::HashMap;

use bevy::color::LinearRgba;
use bevy::math::Vec3;
use bevy::prelude::Resource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::layout::{BlockId, ModelLayout, CELL_SIZE};

pub const DEFAULT_CAPACITY: usize = 500;
/// Seconds of simulated time between spawn rounds.
pub const SPAWN_INTERVAL: f32 = 0.1;
const FADE: f32 = 0.1;
const LIFT: f32 = CELL_SIZE * 3.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowPath {
    pub from: BlockId,
    pub to: BlockId,
    pub color: LinearRgba,
    /// Upper bound on this path's particles alive at once.
    pub count: usize,
}

impl FlowPath {
    pub fn new(from: BlockId, to: BlockId, color: LinearRgba, count: usize) -> Self {
        Self {
            from,
            to,
            color,
            count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub start: Vec3,
    pub end: Vec3,
    pub progress: f32,
    pub speed: f32,
    pub color: LinearRgba,
    pub size: f32,
    pub alive: bool,
    route: (BlockId, BlockId),
}

impl Particle {
    fn dead() -> Self {
        Self {
            start: Vec3::ZERO,
            end: Vec3::ZERO,
            progress: 0.0,
            speed: 0.0,
            color: LinearRgba::NONE,
            size: 0.0,
            alive: false,
            route: (BlockId(0), BlockId(0)),
        }
    }

    /// Point on a quadratic Bézier whose control point is the midpoint lifted toward the viewer.
    pub fn position(&self) -> Vec3 {
        let t = self.progress.clamp(0.0, 1.0);
        let mut control = (self.start + self.end) * 0.5;
        control.z = self.start.z.max(self.end.z) + LIFT;
        let u = 1.0 - t;
        u * u * self.start + 2.0 * u * t * control + t * t * self.end
    }

    /// Fades in over the first tenth of the trip and out over the last.
    pub fn alpha(&self) -> f32 {
        let t = self.progress.clamp(0.0, 1.0);
        if t < FADE {
            t / FADE
        } else if t > 1.0 - FADE {
            (1.0 - t) / FADE
        } else {
            1.0
        }
    }
}

#[derive(Resource)]
pub struct ParticleFlowSystem {
    particles: Vec<Particle>,
    free: Vec<usize>,
    alive: Vec<usize>,
    paths: Vec<FlowPath>,
    per_route: HashMap<(BlockId, BlockId), usize>,
    centers: Vec<Vec3>,
    spawn_timer: f32,
    seed: u64,
    rng: StdRng,
}

impl Default for ParticleFlowSystem {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, 0)
    }
}

impl ParticleFlowSystem {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            particles: vec![Particle::dead(); capacity],
            free: (0..capacity).rev().collect(),
            alive: Vec::with_capacity(capacity),
            paths: Vec::new(),
            per_route: HashMap::new(),
            centers: Vec::new(),
            spawn_timer: 0.0,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn paths(&self) -> &[FlowPath] {
        &self.paths
    }

    /// Caches block centers used as path endpoints.
    pub fn set_layout(&mut self, layout: &ModelLayout) {
        self.centers = layout.blocks().iter().map(|b| b.center()).collect();
    }

    pub fn add_path(&mut self, from: BlockId, to: BlockId, color: LinearRgba, count: usize) {
        self.paths.push(FlowPath::new(from, to, color, count));
    }

    pub fn clear_paths(&mut self) {
        self.paths.clear();
    }

    /// Alive particles, densely packed.
    pub fn alive(&self) -> impl Iterator<Item = &Particle> {
        self.alive.iter().map(|&i| &self.particles[i])
    }

    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);

        self.spawn_timer += dt;
        if self.spawn_timer > SPAWN_INTERVAL {
            self.spawn_timer = 0.0;
            for p in 0..self.paths.len() {
                let path = self.paths[p];
                let route = (path.from, path.to);
                if self.per_route.get(&route).copied().unwrap_or(0) >= path.count {
                    continue;
                }
                if !self.spawn(&path) {
                    break;
                }
            }
        }

        // Particles spawned above move in the same step.
        let mut i = 0;
        while i < self.alive.len() {
            let idx = self.alive[i];
            let p = &mut self.particles[idx];
            p.progress += dt * p.speed;
            if p.progress >= 1.0 {
                p.alive = false;
                let route = p.route;
                if let Some(n) = self.per_route.get_mut(&route) {
                    *n = n.saturating_sub(1);
                }
                self.free.push(idx);
                self.alive.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn spawn(&mut self, path: &FlowPath) -> bool {
        let (Some(&from), Some(&to)) = (
            self.centers.get(path.from.index()),
            self.centers.get(path.to.index()),
        ) else {
            return true;
        };
        let Some(idx) = self.free.pop() else {
            return false;
        };

        let mut jitter = |c: Vec3| {
            c + Vec3::new(
                self.rng.random_range(-CELL_SIZE..=CELL_SIZE),
                self.rng.random_range(-CELL_SIZE..=CELL_SIZE),
                0.0,
            )
        };
        let start = jitter(from);
        let end = jitter(to);
        let speed = 0.3 + self.rng.random::<f32>() * 0.3;
        let size = 2.0 + self.rng.random::<f32>() * 2.0;
        let route = (path.from, path.to);

        self.particles[idx] = Particle {
            start,
            end,
            progress: 0.0,
            speed,
            color: path.color,
            size,
            alive: true,
            route,
        };
        self.alive.push(idx);
        *self.per_route.entry(route).or_default() += 1;
        true
    }

    /// Kills every particle and forgets paths; the RNG restarts from its seed.
    pub fn reset(&mut self) {
        for p in &mut self.particles {
            p.alive = false;
        }
        let capacity = self.particles.len();
        self.free = (0..capacity).rev().collect();
        self.alive.clear();
        self.paths.clear();
        self.per_route.clear();
        self.spawn_timer = 0.0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
