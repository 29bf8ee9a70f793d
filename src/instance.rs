use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::gpu::{InstanceRaw, UnlitInstanceRaw};

/// One drawn copy of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub position: Vec3,
    #[serde(default = "default_rotation")]
    pub rotation: Quat,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: default_rotation(),
            scale: default_scale(),
        }
    }
}

fn default_rotation() -> Quat {
    Quat::IDENTITY
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

impl Instance {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn normal_matrix(&self) -> Mat3 {
        normal_matrix(self.model_matrix())
    }

    /// Packs the instance for the normal-mapped pipeline.
    pub fn to_raw(&self) -> InstanceRaw {
        let model = self.model_matrix();
        InstanceRaw::from_matrices(model, normal_matrix(model))
    }

    /// Packs the instance for the unlit pipeline.
    pub fn to_unlit_raw(&self) -> UnlitInstanceRaw {
        UnlitInstanceRaw::from_matrix(self.model_matrix())
    }
}

/// Inverse-transpose of the upper 3x3, so normals stay perpendicular to
/// surfaces under non-uniform scale.
pub fn normal_matrix(model: Mat4) -> Mat3 {
    Mat3::from_mat4(model).inverse().transpose()
}

/// Upper bound on the number of instances one scene may hold.
pub const MAX_INSTANCES: usize = 1 << 20;

/// Lays out `per_row * per_row` instances on the XZ plane, centred on the
/// origin. Every instance except one sitting exactly on the origin is
/// tilted 45 degrees about its own position vector.
pub fn grid(per_row: u32, spacing: f32) -> Vec<Instance> {
    let half = per_row as f32 / 2.0;
    (0..per_row)
        .flat_map(|z| {
            (0..per_row).map(move |x| {
                let position = Vec3::new(
                    spacing * (x as f32 - half),
                    0.0,
                    spacing * (z as f32 - half),
                );
                let rotation = if position == Vec3::ZERO {
                    Quat::IDENTITY
                } else {
                    Quat::from_axis_angle(position.normalize(), 45f32.to_radians())
                };
                Instance::new(position, rotation)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_matrix_keeps_normals_perpendicular_under_squash() {
        let instance = Instance {
            scale: Vec3::new(4.0, 1.0, 1.0),
            rotation: Quat::from_rotation_z(0.3),
            ..Instance::default()
        };
        let model = Mat3::from_mat4(instance.model_matrix());
        // Surface with tangent along (1, 1, 0) and normal (1, -1, 0).
        let tangent = model * Vec3::new(1.0, 1.0, 0.0);
        let normal = instance.normal_matrix() * Vec3::new(1.0, -1.0, 0.0);
        assert!(tangent.dot(normal).abs() < 1e-4);

        let naive = model * Vec3::new(1.0, -1.0, 0.0);
        assert!(tangent.dot(naive).abs() > 1.0);
    }

    #[test]
    fn packed_instance_matches_host_matrices() {
        let instance = Instance::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_x(1.0));
        let raw = instance.to_raw();
        assert_eq!(raw.model_matrix(), instance.model_matrix());
        assert_eq!(raw.normal_matrix(), instance.normal_matrix());
        assert_eq!(
            instance.to_unlit_raw().model_matrix(),
            instance.model_matrix()
        );
    }

    #[test]
    fn grid_is_centred_and_tilted() {
        let instances = grid(10, 3.0);
        assert_eq!(instances.len(), 100);
        assert_eq!(instances[0].position, Vec3::new(-15.0, 0.0, -15.0));

        let origin = instances
            .iter()
            .find(|i| i.position == Vec3::ZERO)
            .expect("even grid has an origin instance");
        assert_eq!(origin.rotation, Quat::IDENTITY);

        let (axis, angle) = instances[1].rotation.to_axis_angle();
        assert!((angle - 45f32.to_radians()).abs() < 1e-5);
        assert!(axis.dot(instances[1].position.normalize()) > 0.999);
    }
}
