//! WGSL sources for both shading variants.
//!
//! Binding contract shared with [`crate::pipeline`]:
//!
//! * group 0 – material: diffuse texture/sampler at 0/1, normal
//!   texture/sampler at 2/3 (standard only)
//! * group 1 – camera uniform
//! * group 2 – light uniform
//!
//! Vertex locations 0-4 carry the mesh, 5-11 the packed instance matrices.
//!
//! The light marker program binds only the camera (group 0) and light
//! (group 1) and reads nothing but the vertex position.

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

pub const STANDARD_SHADER: &str = r#"
struct Camera {
    view_position: vec4<f32>,
    view_projection: mat4x4<f32>,
}

struct Light {
    position: vec3<f32>,
    color: vec3<f32>,
}

@group(0) @binding(0)
var t_diffuse: texture_2d<f32>;
@group(0) @binding(1)
var s_diffuse: sampler;
@group(0) @binding(2)
var t_normal: texture_2d<f32>;
@group(0) @binding(3)
var s_normal: sampler;

@group(1) @binding(0)
var<uniform> camera: Camera;

@group(2) @binding(0)
var<uniform> light: Light;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coords: vec2<f32>,
    @location(2) normal: vec3<f32>,
    @location(3) tangent: vec3<f32>,
    @location(4) bitangent: vec3<f32>,
}

struct InstanceInput {
    @location(5) model_matrix_0: vec4<f32>,
    @location(6) model_matrix_1: vec4<f32>,
    @location(7) model_matrix_2: vec4<f32>,
    @location(8) model_matrix_3: vec4<f32>,
    @location(9) normal_matrix_0: vec3<f32>,
    @location(10) normal_matrix_1: vec3<f32>,
    @location(11) normal_matrix_2: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
    @location(1) tangent_position: vec3<f32>,
    @location(2) tangent_light_position: vec3<f32>,
    @location(3) tangent_view_position: vec3<f32>,
}

@vertex
fn vs_main(model: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model_matrix = mat4x4<f32>(
        instance.model_matrix_0,
        instance.model_matrix_1,
        instance.model_matrix_2,
        instance.model_matrix_3,
    );
    let normal_matrix = mat3x3<f32>(
        instance.normal_matrix_0,
        instance.normal_matrix_1,
        instance.normal_matrix_2,
    );

    let world_normal = normalize(normal_matrix * model.normal);
    let world_tangent = normalize(normal_matrix * model.tangent);
    let world_bitangent = normalize(normal_matrix * model.bitangent);
    let tangent_matrix = transpose(mat3x3<f32>(
        world_tangent,
        world_bitangent,
        world_normal,
    ));

    let world_position = model_matrix * vec4<f32>(model.position, 1.0);

    var out: VertexOutput;
    out.clip_position = camera.view_projection * world_position;
    out.tex_coords = model.tex_coords;
    out.tangent_position = tangent_matrix * world_position.xyz;
    out.tangent_light_position = tangent_matrix * light.position;
    out.tangent_view_position = tangent_matrix * camera.view_position.xyz;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let object_color = textureSample(t_diffuse, s_diffuse, input.tex_coords);
    let object_normal = textureSample(t_normal, s_normal, input.tex_coords);
    let tangent_normal = object_normal.xyz * 2.0 - 1.0;

    let ambient_color = light.color * 0.1;

    let light_dir = normalize(input.tangent_light_position - input.tangent_position);
    let view_dir = normalize(input.tangent_view_position - input.tangent_position);
    let half_dir = normalize(view_dir + light_dir);

    let diffuse_strength = max(dot(tangent_normal, light_dir), 0.0);
    let diffuse_color = light.color * diffuse_strength;

    let specular_strength = pow(max(dot(tangent_normal, half_dir), 0.0), 32.0);
    let specular_color = specular_strength * light.color;

    let result = (ambient_color + diffuse_color + specular_color) * object_color.rgb;
    return vec4<f32>(result, object_color.a);
}
"#;

pub const UNLIT_SHADER: &str = r#"
struct Camera {
    view_position: vec4<f32>,
    view_projection: mat4x4<f32>,
}

struct Light {
    position: vec3<f32>,
    color: vec3<f32>,
}

@group(0) @binding(0)
var t_diffuse: texture_2d<f32>;
@group(0) @binding(1)
var s_diffuse: sampler;

@group(1) @binding(0)
var<uniform> camera: Camera;

@group(2) @binding(0)
var<uniform> light: Light;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct InstanceInput {
    @location(5) model_matrix_0: vec4<f32>,
    @location(6) model_matrix_1: vec4<f32>,
    @location(7) model_matrix_2: vec4<f32>,
    @location(8) model_matrix_3: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(model: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model_matrix = mat4x4<f32>(
        instance.model_matrix_0,
        instance.model_matrix_1,
        instance.model_matrix_2,
        instance.model_matrix_3,
    );

    var out: VertexOutput;
    out.clip_position = camera.view_projection * model_matrix * vec4<f32>(model.position, 1.0);
    out.tex_coords = model.tex_coords;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let object_color = textureSample(t_diffuse, s_diffuse, input.tex_coords);
    let ambient_color = light.color * 0.1;
    return vec4<f32>(object_color.rgb * ambient_color, object_color.a);
}
"#;

pub const LIGHT_MARKER_SHADER: &str = r#"
struct Camera {
    view_position: vec4<f32>,
    view_projection: mat4x4<f32>,
}

struct Light {
    position: vec3<f32>,
    color: vec3<f32>,
}

@group(0) @binding(0)
var<uniform> camera: Camera;

@group(1) @binding(0)
var<uniform> light: Light;

struct VertexInput {
    @location(0) position: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(model: VertexInput) -> VertexOutput {
    let scale = 0.25;
    var out: VertexOutput;
    out.clip_position = camera.view_projection * vec4<f32>(model.position * scale + light.position, 1.0);
    out.color = light.color;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(input.color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{
        InstanceRaw, ModelVertex, UnlitInstanceRaw, UnlitVertex, VertexBufferFormat,
    };

    fn validated(source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source).expect("WGSL parses");
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .expect("module validates");
        module
    }

    fn bindings(module: &naga::Module) -> Vec<(u32, u32, String)> {
        let mut found: Vec<_> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| {
                let binding = var.binding.as_ref()?;
                Some((binding.group, binding.binding, var.name.clone()?))
            })
            .collect();
        found.sort();
        found
    }

    fn vertex_locations(module: &naga::Module) -> Vec<u32> {
        let entry = module
            .entry_points
            .iter()
            .find(|entry| entry.stage == naga::ShaderStage::Vertex)
            .expect("vertex entry point");
        let mut locations = Vec::new();
        for argument in &entry.function.arguments {
            if let naga::TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                for member in members {
                    if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                        locations.push(*location);
                    }
                }
            }
        }
        locations.sort();
        locations
    }

    fn layout_locations(attributes: &[&[wgpu::VertexAttribute]]) -> Vec<u32> {
        let mut locations: Vec<u32> = attributes
            .iter()
            .flat_map(|set| set.iter().map(|a| a.shader_location))
            .collect();
        locations.sort();
        locations
    }

    fn entry_names(module: &naga::Module) -> Vec<&str> {
        module
            .entry_points
            .iter()
            .map(|entry| entry.name.as_str())
            .collect()
    }

    #[test]
    fn standard_shader_matches_binding_contract() {
        let module = validated(STANDARD_SHADER);
        assert_eq!(
            bindings(&module),
            vec![
                (0, 0, "t_diffuse".to_string()),
                (0, 1, "s_diffuse".to_string()),
                (0, 2, "t_normal".to_string()),
                (0, 3, "s_normal".to_string()),
                (1, 0, "camera".to_string()),
                (2, 0, "light".to_string()),
            ]
        );
        assert_eq!(entry_names(&module), vec![VERTEX_ENTRY, FRAGMENT_ENTRY]);
        assert_eq!(
            vertex_locations(&module),
            layout_locations(&[ModelVertex::ATTRIBUTES, InstanceRaw::ATTRIBUTES])
        );
    }

    #[test]
    fn unlit_shader_matches_binding_contract() {
        let module = validated(UNLIT_SHADER);
        assert_eq!(
            bindings(&module),
            vec![
                (0, 0, "t_diffuse".to_string()),
                (0, 1, "s_diffuse".to_string()),
                (1, 0, "camera".to_string()),
                (2, 0, "light".to_string()),
            ]
        );
        assert_eq!(entry_names(&module), vec![VERTEX_ENTRY, FRAGMENT_ENTRY]);
        assert_eq!(
            vertex_locations(&module),
            layout_locations(&[UnlitVertex::ATTRIBUTES, UnlitInstanceRaw::ATTRIBUTES])
        );
    }

    #[test]
    fn light_marker_shader_binds_camera_and_light_only() {
        let module = validated(LIGHT_MARKER_SHADER);
        assert_eq!(
            bindings(&module),
            vec![(0, 0, "camera".to_string()), (1, 0, "light".to_string())]
        );
        assert_eq!(entry_names(&module), vec![VERTEX_ENTRY, FRAGMENT_ENTRY]);
        assert_eq!(vertex_locations(&module), vec![0]);
        // Both mesh layouts put the position at location 0.
        for attributes in [ModelVertex::ATTRIBUTES, UnlitVertex::ATTRIBUTES] {
            assert_eq!(attributes[0].shader_location, 0);
            assert_eq!(attributes[0].format, wgpu::VertexFormat::Float32x3);
        }
    }

    #[test]
    fn uniform_blocks_match_host_sizes() {
        for source in [STANDARD_SHADER, UNLIT_SHADER, LIGHT_MARKER_SHADER] {
            let module = validated(source);
            let size_of = |name: &str| {
                module
                    .types
                    .iter()
                    .find(|(_, ty)| ty.name.as_deref() == Some(name))
                    .map(|(_, ty)| ty.inner.size(module.to_ctx()))
                    .expect("type declared")
            };
            assert_eq!(
                size_of("Camera") as usize,
                std::mem::size_of::<crate::gpu::CameraUniform>()
            );
            assert_eq!(
                size_of("Light") as usize,
                std::mem::size_of::<crate::gpu::LightUniform>()
            );
        }
    }
}
