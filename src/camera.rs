use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::gpu::CameraUniform;

const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// First-person camera described by a position and yaw/pitch in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
}

impl Default for Camera {
    /// Above and behind the origin, looking down -Z and slightly downward.
    fn default() -> Self {
        Self::from_degrees(Vec3::new(0.0, 5.0, 10.0), -90.0, -20.0)
    }
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: pitch.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2),
        }
    }

    pub fn from_degrees(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self::new(position, yaw.to_radians(), pitch.to_radians())
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Turns the camera, keeping the pitch just short of straight up/down so
    /// the view basis never degenerates.
    pub fn rotate(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.yaw += yaw_delta;
        self.pitch = (self.pitch + pitch_delta).clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2);
    }

    pub fn forward(&self) -> Vec3 {
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        Vec3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }
}

/// Perspective projection with wgpu's 0..1 depth range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    aspect: f32,
    fovy: f32,
    z_near: f32,
    z_far: f32,
}

impl Projection {
    pub fn new(width: u32, height: u32, fovy: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            aspect: aspect_ratio(width, height),
            fovy,
            z_near,
            z_far,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect, self.z_near, self.z_far)
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera, projection: &Projection) -> Self {
        Self::new(camera.position, projection.matrix() * camera.view_matrix())
    }
}
