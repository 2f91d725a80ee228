//! Orbit camera state: a target point seen from a yaw/pitch direction at a zoom distance.

use bevy::prelude::*;

use crate::layout::ModelLayout;

/// Scene units between eye and target at zoom 1.
pub const ZOOM_DISTANCE: f32 = 40.0;
const MAX_PITCH: f32 = 89.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub target: Vec3,
    /// Degrees around +Y, 0 looks down -Z.
    pub yaw: f32,
    /// Degrees above the horizon.
    pub pitch: f32,
    /// Distance multiplier; larger is farther away.
    pub zoom: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            yaw: 0.0,
            pitch: 20.0,
            zoom: 1.0,
        }
    }
}

impl CameraState {
    pub fn new(target: Vec3, yaw: f32, pitch: f32, zoom: f32) -> Self {
        Self {
            target,
            yaw,
            pitch,
            zoom,
        }
    }

    /// Looks at the middle of a box from `yaw`/`pitch`, far enough away to see all of it.
    pub fn framing(min: Vec3, max: Vec3, yaw: f32, pitch: f32) -> Self {
        Self::new((min + max) * 0.5, yaw, pitch, zoom_to_fit((max - min).max_element()))
    }

    /// Whole model from slightly above and to the left.
    pub fn overview(layout: &ModelLayout) -> Self {
        Self::framing(layout.bounds_min, layout.bounds_max, -20.0, 15.0)
    }

    pub fn lerp(&self, to: &CameraState, t: f32) -> CameraState {
        let t = t.clamp(0.0, 1.0);
        CameraState {
            target: self.target.lerp(to.target, t),
            yaw: self.yaw + (to.yaw - self.yaw) * t,
            pitch: self.pitch + (to.pitch - self.pitch) * t,
            zoom: self.zoom + (to.zoom - self.zoom) * t,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.clamp(-MAX_PITCH, MAX_PITCH).to_radians();
        let dir = Vec3::new(yaw.sin() * pitch.cos(), pitch.sin(), yaw.cos() * pitch.cos());
        self.target + dir * self.zoom.max(0.01) * ZOOM_DISTANCE
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.eye()).looking_at(self.target, Vec3::Y)
    }
}

/// Zoom at which an object `extent` units across fills most of the view.
pub fn zoom_to_fit(extent: f32) -> f32 {
    (extent * 1.3 / ZOOM_DISTANCE).clamp(0.2, 12.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Easing {
    Linear,
    #[default]
    Smooth,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Smooth => t * t * (3.0 - 2.0 * t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_hits_endpoints() {
        let a = CameraState::new(Vec3::ZERO, 0.0, 10.0, 1.0);
        let b = CameraState::new(Vec3::new(4.0, -2.0, 0.0), 90.0, 30.0, 2.0);
        assert_eq!(a.lerp(&b, 0.0), a);
        assert_eq!(a.lerp(&b, 1.0), b);
        assert_eq!(a.lerp(&b, 0.5).yaw, 45.0);
    }

    #[test]
    fn smoothstep_is_symmetric() {
        assert_eq!(Easing::Smooth.apply(0.0), 0.0);
        assert_eq!(Easing::Smooth.apply(1.0), 1.0);
        assert_eq!(Easing::Smooth.apply(0.5), 0.5);
        assert!(Easing::Smooth.apply(0.1) < Easing::Linear.apply(0.1));
    }

    #[test]
    fn eye_sits_at_zoom_distance() {
        let cam = CameraState::new(Vec3::new(1.0, 2.0, 3.0), 30.0, 45.0, 0.5);
        let d = cam.eye().distance(cam.target);
        assert!((d - ZOOM_DISTANCE * 0.5).abs() < 1e-3);
        let forward = cam.transform().forward();
        assert!((cam.eye() + *forward * d - cam.target).length() < 1e-3);
    }
}
