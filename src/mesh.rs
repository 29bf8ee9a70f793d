//! Mesh preparation: tangent generation and the built-in primitives.
//!
//! The shaders trust that every vertex carries a near-orthonormal
//! tangent/bitangent/normal triple. This module is where that holds.

use glam::{Vec2, Vec3};

use crate::gpu::{ModelVertex, UnlitVertex};

/// Indexed triangle list ready for upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn unlit_vertices(&self) -> Vec<UnlitVertex> {
        self.vertices.iter().map(UnlitVertex::from).collect()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Derives per-vertex tangents and bitangents from position and UV deltas.
///
/// Every triangle contributes one tangent/bitangent pair to each of its
/// corners and the sums are averaged per vertex. Triangles with a
/// degenerate UV mapping contribute nothing. The bitangent is flipped so
/// that right-handed normal maps read correctly with wgpu's top-left UV
/// origin. Results are not normalized; see [`orthonormalize`].
pub fn compute_tangents(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut tangents = vec![Vec3::ZERO; vertices.len()];
    let mut bitangents = vec![Vec3::ZERO; vertices.len()];
    let mut triangles_included = vec![0u32; vertices.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);

        let delta_pos1 = Vec3::from(v1.position) - Vec3::from(v0.position);
        let delta_pos2 = Vec3::from(v2.position) - Vec3::from(v0.position);
        let delta_uv1 = Vec2::from(v1.tex_coords) - Vec2::from(v0.tex_coords);
        let delta_uv2 = Vec2::from(v2.tex_coords) - Vec2::from(v0.tex_coords);

        // delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        // delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let determinant = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if determinant.abs() <= f32::EPSILON {
            continue;
        }
        let r = 1.0 / determinant;
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for index in [i0, i1, i2] {
            tangents[index] += tangent;
            bitangents[index] += bitangent;
            triangles_included[index] += 1;
        }
    }

    for (i, vertex) in vertices.iter_mut().enumerate() {
        let count = triangles_included[i];
        if count == 0 {
            continue;
        }
        let denom = 1.0 / count as f32;
        vertex.tangent = (tangents[i] * denom).into();
        vertex.bitangent = (bitangents[i] * denom).into();
    }
}

/// Gram-Schmidt the tangent against the normal and rebuild the bitangent,
/// keeping the handedness the bitangent had before.
pub fn orthonormalize(vertex: &mut ModelVertex) {
    let normal = Vec3::from(vertex.normal).normalize_or_zero();
    let tangent = Vec3::from(vertex.tangent);
    let tangent = (tangent - normal * normal.dot(tangent)).normalize_or_zero();

    let rebuilt = normal.cross(tangent);
    let handedness = if rebuilt.dot(Vec3::from(vertex.bitangent)) < 0.0 {
        -1.0
    } else {
        1.0
    };

    vertex.normal = normal.into();
    vertex.tangent = tangent.into();
    vertex.bitangent = (rebuilt * handedness).into();
}

/// Unit quad in the XY plane facing +Z, spanning -1..1.
pub fn quad() -> MeshData {
    let corners = [
        ([-1.0, -1.0, 0.0], [0.0, 1.0]),
        ([1.0, -1.0, 0.0], [1.0, 1.0]),
        ([1.0, 1.0, 0.0], [1.0, 0.0]),
        ([-1.0, 1.0, 0.0], [0.0, 0.0]),
    ];
    let mut vertices: Vec<ModelVertex> = corners
        .iter()
        .map(|&(position, tex_coords)| ModelVertex {
            position,
            tex_coords,
            normal: [0.0, 0.0, 1.0],
            ..ModelVertex::default()
        })
        .collect();
    let indices = vec![0, 1, 2, 0, 2, 3];
    prepare(&mut vertices, &indices);
    MeshData {
        name: "quad".to_string(),
        vertices,
        indices,
    }
}

/// Unit cube centred on the origin, four vertices per face.
pub fn cube() -> MeshData {
    // (normal, tangent); the bitangent follows from normal x tangent.
    const FACES: [(Vec3, Vec3); 6] = [
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
        (Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
    ];
    const CORNERS: [(f32, f32); 4] = [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent) in FACES {
        let bitangent = normal.cross(tangent);
        let base = vertices.len() as u32;
        for (u, v) in CORNERS {
            let position =
                0.5 * (normal + (2.0 * u - 1.0) * tangent + (1.0 - 2.0 * v) * bitangent);
            vertices.push(ModelVertex {
                position: position.into(),
                tex_coords: [u, v],
                normal: normal.into(),
                ..ModelVertex::default()
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    prepare(&mut vertices, &indices);
    MeshData {
        name: "cube".to_string(),
        vertices,
        indices,
    }
}

fn prepare(vertices: &mut [ModelVertex], indices: &[u32]) {
    compute_tangents(vertices, indices);
    vertices.iter_mut().for_each(orthonormalize);
}
