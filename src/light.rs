use glam::{Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::gpu::LightUniform;

/// The single point light shared by every draw in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    /// Linear RGB intensity.
    pub color: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::splat(2.0),
            color: Vec3::ONE,
        }
    }
}

impl Light {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }

    /// Swings the light around the world Y axis. Height is left untouched
    /// and the horizontal radius is restored after each step so repeated
    /// small orbits do not spiral inwards.
    pub fn orbit(&mut self, degrees: f32) {
        let radius = Vec2::new(self.position.x, self.position.z).length();
        let rotated = Mat3::from_rotation_y(degrees.to_radians()) * self.position;
        let horizontal = Vec2::new(rotated.x, rotated.z).normalize_or_zero() * radius;
        self.position = Vec3::new(horizontal.x, self.position.y, horizontal.y);
    }

    pub fn to_uniform(&self) -> LightUniform {
        LightUniform::new(self.position, self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_preserves_height_and_radius() {
        let mut light = Light::default();
        let radius = light.position.length();
        for _ in 0..90 {
            light.orbit(1.0);
        }
        assert!((light.position.length() - radius).abs() < 1e-4);
        assert_eq!(light.position.y, 2.0);
        // A quarter turn about +Y maps +X onto -Z.
        assert!((light.position - Vec3::new(2.0, 2.0, -2.0)).length() < 1e-3);
    }

    #[test]
    fn long_orbits_keep_their_radius() {
        let mut light = Light::new(Vec3::new(2.0, 2.0, 2.0), Vec3::ONE);
        let radius = light.position.length();
        for _ in 0..36_000 {
            light.orbit(1.0);
        }
        assert_eq!(light.position.y, 2.0);
        assert!((light.position.length() - radius).abs() < 1e-3);
        // A hundred full turns land back where they started.
        assert!((light.position - Vec3::splat(2.0)).length() < 0.05);
    }

    #[test]
    fn orbit_leaves_axis_light_in_place() {
        let mut light = Light::new(Vec3::new(0.0, 3.0, 0.0), Vec3::ONE);
        light.orbit(45.0);
        assert_eq!(light.position, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn uniform_round_trips_position_and_color() {
        let light = Light::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 0.25, 1.0));
        let uniform = light.to_uniform();
        assert_eq!(uniform.position(), light.position);
        assert_eq!(uniform.color(), light.color);
    }
}
