//! Host-side mirrors of the structures the WGSL programs consume.
//!
//! Every type in this module is `#[repr(C)]` plain-old-data so it can be
//! handed to `bytemuck` and copied straight into a uniform or vertex
//! buffer. Matrices are stored column-major, matching both glam and WGSL.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};

/// Describes how a POD type is laid out inside a vertex buffer.
pub trait VertexBufferFormat: Pod {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute];
    const STEP_MODE: wgpu::VertexStepMode;

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: Self::STEP_MODE,
            attributes: Self::ATTRIBUTES,
        }
    }
}

/// Camera block bound at group 1, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_projection: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new(view_position: Vec3, view_projection: Mat4) -> Self {
        Self {
            view_position: view_position.extend(1.0).into(),
            view_projection: view_projection.to_cols_array_2d(),
        }
    }

    pub fn view_position(&self) -> Vec4 {
        Vec4::from_array(self.view_position)
    }

    pub fn view_projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_projection)
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Mat4::IDENTITY)
    }
}

/// Light block bound at group 2, binding 0.
///
/// WGSL aligns `vec3<f32>` to 16 bytes, so each field carries a trailing
/// padding word.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    position: [f32; 3],
    _padding_0: u32,
    color: [f32; 3],
    _padding_1: u32,
}

impl LightUniform {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position: position.into(),
            _padding_0: 0,
            color: color.into(),
            _padding_1: 0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn color(&self) -> Vec3 {
        Vec3::from_array(self.color)
    }
}

/// Vertex consumed by the normal-mapped pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl VertexBufferFormat for ModelVertex {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x2,
        2 => Float32x3,
        3 => Float32x3,
        4 => Float32x3,
    ];
    const STEP_MODE: wgpu::VertexStepMode = wgpu::VertexStepMode::Vertex;
}

/// Vertex consumed by the unlit pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UnlitVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl From<&ModelVertex> for UnlitVertex {
    fn from(vertex: &ModelVertex) -> Self {
        Self {
            position: vertex.position,
            tex_coords: vertex.tex_coords,
        }
    }
}

impl VertexBufferFormat for UnlitVertex {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x2,
    ];
    const STEP_MODE: wgpu::VertexStepMode = wgpu::VertexStepMode::Vertex;
}

/// Per-instance stream for the normal-mapped pipeline: a model matrix as
/// four column attributes followed by the normal matrix as three.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

impl InstanceRaw {
    /// Packs matrices computed on the host. `normal` must already be the
    /// inverse-transpose of `model`'s upper 3x3; it is not checked.
    pub fn from_matrices(model: Mat4, normal: Mat3) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_cols_array_2d(&self.normal)
    }
}

impl VertexBufferFormat for InstanceRaw {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
        9 => Float32x3,
        10 => Float32x3,
        11 => Float32x3,
    ];
    const STEP_MODE: wgpu::VertexStepMode = wgpu::VertexStepMode::Instance;
}

/// Per-instance stream for the unlit pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UnlitInstanceRaw {
    model: [[f32; 4]; 4],
}

impl UnlitInstanceRaw {
    pub fn from_matrix(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

impl VertexBufferFormat for UnlitInstanceRaw {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
    ];
    const STEP_MODE: wgpu::VertexStepMode = wgpu::VertexStepMode::Instance;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    fn locations(attributes: &[wgpu::VertexAttribute]) -> Vec<u32> {
        attributes.iter().map(|a| a.shader_location).collect()
    }

    #[test]
    fn uniform_sizes_match_wgsl() {
        assert_eq!(size_of::<CameraUniform>(), 80);
        assert_eq!(size_of::<LightUniform>(), 32);
        assert_eq!(offset_of!(LightUniform, color), 16);
        assert_eq!(offset_of!(CameraUniform, view_projection), 16);
    }

    #[test]
    fn vertex_strides_cover_every_attribute() {
        assert_eq!(size_of::<ModelVertex>(), 56);
        assert_eq!(size_of::<UnlitVertex>(), 20);
        assert_eq!(size_of::<InstanceRaw>(), 100);
        assert_eq!(size_of::<UnlitInstanceRaw>(), 64);

        let last = ModelVertex::ATTRIBUTES.last().unwrap();
        assert_eq!(
            last.offset + last.format.size(),
            size_of::<ModelVertex>() as u64
        );
        let last = InstanceRaw::ATTRIBUTES.last().unwrap();
        assert_eq!(
            last.offset + last.format.size(),
            size_of::<InstanceRaw>() as u64
        );
    }

    #[test]
    fn attribute_locations_follow_binding_contract() {
        assert_eq!(locations(ModelVertex::ATTRIBUTES), vec![0, 1, 2, 3, 4]);
        assert_eq!(locations(UnlitVertex::ATTRIBUTES), vec![0, 1]);
        assert_eq!(
            locations(InstanceRaw::ATTRIBUTES),
            vec![5, 6, 7, 8, 9, 10, 11]
        );
        assert_eq!(locations(UnlitInstanceRaw::ATTRIBUTES), vec![5, 6, 7, 8]);
        assert_eq!(
            InstanceRaw::layout().step_mode,
            wgpu::VertexStepMode::Instance
        );
    }

    #[test]
    fn instance_matrices_unpack_unchanged() {
        let model = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 2.0, 3.0),
            glam::Quat::from_rotation_y(0.7),
            Vec3::new(4.0, -1.0, 0.5),
        );
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let raw = InstanceRaw::from_matrices(model, normal);
        assert_eq!(raw.model_matrix(), model);
        assert_eq!(raw.normal_matrix(), normal);

        // Column 3 carries the translation, straight into location 8.
        let bytes: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&raw));
        assert_eq!(&bytes[12..15], &[4.0, -1.0, 0.5]);
    }

    #[test]
    fn camera_position_is_homogeneous() {
        let uniform = CameraUniform::new(Vec3::new(1.0, 2.0, 3.0), Mat4::IDENTITY);
        assert_eq!(uniform.view_position(), Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(uniform.view_projection(), Mat4::IDENTITY);
    }
}
