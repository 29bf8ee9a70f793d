//! CPU reference implementation of the shader stages.
//!
//! Each function here mirrors one block of WGSL in [`crate::shaders`]
//! operation for operation, so the lighting math can be checked without a
//! GPU. Nothing is clamped: over-bright results are left for whatever tone
//! mapping sits downstream.

use glam::{Mat3, Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::gpu::{
    CameraUniform, InstanceRaw, LightUniform, ModelVertex, UnlitInstanceRaw, UnlitVertex,
};

/// Fraction of the light colour applied everywhere.
pub const AMBIENT_STRENGTH: f32 = 0.1;
/// Blinn-Phong specular exponent.
pub const SHININESS: f32 = 32.0;
/// Size of the light marker relative to the mesh it reuses.
pub const LIGHT_MARKER_SCALE: f32 = 0.25;

/// World-space tangent basis of a single vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentFrame {
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
}

impl TangentFrame {
    /// Moves the model-space basis into world space and re-normalizes each
    /// axis. A skewed input basis stays skewed.
    pub fn from_vertex(
        normal_matrix: Mat3,
        normal: Vec3,
        tangent: Vec3,
        bitangent: Vec3,
    ) -> Self {
        Self {
            tangent: (normal_matrix * tangent).normalize(),
            bitangent: (normal_matrix * bitangent).normalize(),
            normal: (normal_matrix * normal).normalize(),
        }
    }

    /// Matrix whose columns are the world-space tangent, bitangent and normal.
    pub fn tangent_to_world(&self) -> Mat3 {
        Mat3::from_cols(self.tangent, self.bitangent, self.normal)
    }

    pub fn world_to_tangent(&self) -> Mat3 {
        self.tangent_to_world().transpose()
    }

    pub fn to_tangent(&self, world: Vec3) -> Vec3 {
        self.world_to_tangent() * world
    }

    pub fn from_tangent(&self, tangent: Vec3) -> Vec3 {
        self.tangent_to_world() * tangent
    }
}

/// Interpolants written by the normal-mapped vertex stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexOutput {
    pub clip_position: Vec4,
    pub tex_coords: Vec2,
    pub tangent_position: Vec3,
    pub tangent_light_position: Vec3,
    pub tangent_view_position: Vec3,
}

/// Interpolants written by the unlit vertex stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnlitVertexOutput {
    pub clip_position: Vec4,
    pub tex_coords: Vec2,
}

pub fn vertex_stage(
    vertex: &ModelVertex,
    instance: &InstanceRaw,
    camera: &CameraUniform,
    light: &LightUniform,
) -> VertexOutput {
    let model_matrix = instance.model_matrix();
    let frame = TangentFrame::from_vertex(
        instance.normal_matrix(),
        Vec3::from_array(vertex.normal),
        Vec3::from_array(vertex.tangent),
        Vec3::from_array(vertex.bitangent),
    );
    let tangent_matrix = frame.world_to_tangent();
    let world_position = model_matrix * Vec3::from_array(vertex.position).extend(1.0);

    VertexOutput {
        clip_position: camera.view_projection() * world_position,
        tex_coords: Vec2::from_array(vertex.tex_coords),
        tangent_position: tangent_matrix * world_position.xyz(),
        tangent_light_position: tangent_matrix * light.position(),
        tangent_view_position: tangent_matrix * camera.view_position().xyz(),
    }
}

pub fn unlit_vertex_stage(
    vertex: &UnlitVertex,
    instance: &UnlitInstanceRaw,
    camera: &CameraUniform,
) -> UnlitVertexOutput {
    let world_position =
        instance.model_matrix() * Vec3::from_array(vertex.position).extend(1.0);
    UnlitVertexOutput {
        clip_position: camera.view_projection() * world_position,
        tex_coords: Vec2::from_array(vertex.tex_coords),
    }
}

/// Maps a normal-map texel from `[0, 1]` to `[-1, 1]` per channel.
pub fn unpack_normal(sample: Vec4) -> Vec3 {
    sample.xyz() * 2.0 - Vec3::ONE
}

/// The three Blinn-Phong contributions, already scaled by the light colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingTerms {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

impl LightingTerms {
    pub fn total(&self) -> Vec3 {
        self.ambient + self.diffuse + self.specular
    }
}

pub fn blinn_phong(
    normal: Vec3,
    light_dir: Vec3,
    view_dir: Vec3,
    light_color: Vec3,
) -> LightingTerms {
    let ambient = light_color * AMBIENT_STRENGTH;

    let diffuse_strength = normal.dot(light_dir).max(0.0);
    let diffuse = light_color * diffuse_strength;

    // Opposed view and light directions have no half vector; treat that as
    // no highlight rather than propagating NaN.
    let half_dir = (view_dir + light_dir).normalize_or_zero();
    let specular_strength = normal.dot(half_dir).max(0.0).powf(SHININESS);
    let specular = light_color * specular_strength;

    LightingTerms {
        ambient,
        diffuse,
        specular,
    }
}

/// Lighting evaluation for already-computed tangent-space directions.
pub fn shade_lit(
    diffuse_sample: Vec4,
    normal_sample: Vec4,
    light_dir: Vec3,
    view_dir: Vec3,
    light_color: Vec3,
) -> Vec4 {
    let normal = unpack_normal(normal_sample);
    let terms = blinn_phong(normal, light_dir, view_dir, light_color);
    (terms.total() * diffuse_sample.xyz()).extend(diffuse_sample.w)
}

pub fn fragment_stage(
    input: &VertexOutput,
    diffuse_sample: Vec4,
    normal_sample: Vec4,
    light: &LightUniform,
) -> Vec4 {
    let light_dir = (input.tangent_light_position - input.tangent_position).normalize();
    let view_dir = (input.tangent_view_position - input.tangent_position).normalize();
    shade_lit(diffuse_sample, normal_sample, light_dir, view_dir, light.color())
}

pub fn shade_unlit(diffuse_sample: Vec4, light_color: Vec3) -> Vec4 {
    (diffuse_sample.xyz() * (light_color * AMBIENT_STRENGTH)).extend(diffuse_sample.w)
}

/// Clip position of a light marker vertex: the mesh shrunk and moved onto
/// the light. The marker is filled with the light colour.
pub fn light_marker_stage(
    position: Vec3,
    camera: &CameraUniform,
    light: &LightUniform,
) -> Vec4 {
    let world_position = position * LIGHT_MARKER_SCALE + light.position();
    camera.view_projection() * world_position.extend(1.0)
}
