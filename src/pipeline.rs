use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::gpu::{
    CameraUniform, InstanceRaw, LightUniform, ModelVertex, UnlitInstanceRaw, UnlitVertex,
    VertexBufferFormat,
};
use crate::shaders::{
    FRAGMENT_ENTRY, LIGHT_MARKER_SHADER, STANDARD_SHADER, UNLIT_SHADER, VERTEX_ENTRY,
};

/// Which of the two shader programs a batch is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadingVariant {
    /// Normal-mapped Blinn-Phong.
    #[default]
    Standard,
    /// Diffuse texture scaled by the ambient term only.
    Unlit,
}

impl ShadingVariant {
    pub fn shader_source(self) -> &'static str {
        match self {
            ShadingVariant::Standard => STANDARD_SHADER,
            ShadingVariant::Unlit => UNLIT_SHADER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShadingVariant::Standard => "standard",
            ShadingVariant::Unlit => "unlit",
        }
    }

    /// Mesh stream in slot 0, instance stream in slot 1.
    pub fn vertex_layouts(self) -> [wgpu::VertexBufferLayout<'static>; 2] {
        match self {
            ShadingVariant::Standard => [ModelVertex::layout(), InstanceRaw::layout()],
            ShadingVariant::Unlit => [UnlitVertex::layout(), UnlitInstanceRaw::layout()],
        }
    }

    pub fn samples_normal_map(self) -> bool {
        matches!(self, ShadingVariant::Standard)
    }
}

impl fmt::Display for ShadingVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShadingVariant {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(ShadingVariant::Standard),
            "unlit" => Ok(ShadingVariant::Unlit),
            other => Err(anyhow!(
                "unknown shading variant `{other}` (expected `standard` or `unlit`)"
            )),
        }
    }
}

/// Group 0 entries: a filterable 2D texture plus sampler per map.
pub fn material_layout_entries(variant: ShadingVariant) -> Vec<wgpu::BindGroupLayoutEntry> {
    let maps = if variant.samples_normal_map() { 2 } else { 1 };
    (0..maps)
        .flat_map(|map| {
            [
                wgpu::BindGroupLayoutEntry {
                    binding: map * 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: map * 2 + 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ]
        })
        .collect()
}

fn uniform_layout_entry<T>() -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

/// The three bind group layouts a shading pipeline is built against.
#[derive(Debug)]
pub struct BindGroupLayouts {
    pub material: wgpu::BindGroupLayout,
    pub camera: wgpu::BindGroupLayout,
    pub light: wgpu::BindGroupLayout,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device, variant: ShadingVariant) -> Self {
        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{variant}-material-bind-layout")),
            entries: &material_layout_entries(variant),
        });
        let camera = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera-bind-layout"),
            entries: &[uniform_layout_entry::<CameraUniform>()],
        });
        let light = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("light-bind-layout"),
            entries: &[uniform_layout_entry::<LightUniform>()],
        });
        Self {
            material,
            camera,
            light,
        }
    }
}

pub struct PipelineOptions<'a> {
    pub label: Option<&'a str>,
    pub layout: &'a wgpu::PipelineLayout,
    pub shader: &'a wgpu::ShaderModule,
    pub vertex_layouts: &'a [wgpu::VertexBufferLayout<'a>],
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub topology: Option<wgpu::PrimitiveTopology>,
}

/// Builds a back-face-culled, depth-tested pipeline that writes colour
/// without blending.
pub fn create_render_pipeline(
    device: &wgpu::Device,
    PipelineOptions {
        label,
        layout,
        shader,
        vertex_layouts,
        color_format,
        depth_format,
        topology,
    }: PipelineOptions<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label,
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(VERTEX_ENTRY),
            compilation_options: Default::default(),
            buffers: vertex_layouts,
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(FRAGMENT_ENTRY),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: topology.unwrap_or(wgpu::PrimitiveTopology::TriangleList),
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// A compiled pipeline for one shading variant together with its layouts.
#[derive(Debug)]
pub struct ShadingPipeline {
    pub variant: ShadingVariant,
    pub layouts: BindGroupLayouts,
    pub pipeline: wgpu::RenderPipeline,
}

impl ShadingPipeline {
    pub fn new(
        device: &wgpu::Device,
        variant: ShadingVariant,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{variant}-shader")),
            source: wgpu::ShaderSource::Wgsl(variant.shader_source().into()),
        });
        let layouts = BindGroupLayouts::new(device, variant);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{variant}-pipeline-layout")),
            bind_group_layouts: &[&layouts.material, &layouts.camera, &layouts.light],
            push_constant_ranges: &[],
        });
        let vertex_layouts = variant.vertex_layouts();
        let pipeline = create_render_pipeline(
            device,
            PipelineOptions {
                label: Some(&format!("{variant}-pipeline")),
                layout: &layout,
                shader: &shader,
                vertex_layouts: &vertex_layouts,
                color_format,
                depth_format,
                topology: None,
            },
        );
        Self {
            variant,
            layouts,
            pipeline,
        }
    }
}

/// Draws the scene mesh shrunk onto the light's position in the light's
/// colour. Shares the camera and light layouts of a [`ShadingPipeline`] but
/// binds them as groups 0 and 1.
#[derive(Debug)]
pub struct LightMarkerPipeline {
    pub pipeline: wgpu::RenderPipeline,
}

impl LightMarkerPipeline {
    pub fn new(
        device: &wgpu::Device,
        shading: &ShadingPipeline,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("light-marker-shader"),
            source: wgpu::ShaderSource::Wgsl(LIGHT_MARKER_SHADER.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("light-marker-pipeline-layout"),
            bind_group_layouts: &[&shading.layouts.camera, &shading.layouts.light],
            push_constant_ranges: &[],
        });
        let [mesh_layout, _] = shading.variant.vertex_layouts();
        let pipeline = create_render_pipeline(
            device,
            PipelineOptions {
                label: Some("light-marker-pipeline"),
                layout: &layout,
                shader: &shader,
                vertex_layouts: &[mesh_layout],
                color_format,
                depth_format,
                topology: None,
            },
        );
        Self { pipeline }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_material_binds_two_maps() {
        let entries = material_layout_entries(ShadingVariant::Standard);
        let bindings: Vec<u32> = entries.iter().map(|e| e.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert!(matches!(entries[2].ty, wgpu::BindingType::Texture { .. }));
        assert!(matches!(entries[3].ty, wgpu::BindingType::Sampler(_)));
    }

    #[test]
    fn unlit_material_binds_diffuse_only() {
        let entries = material_layout_entries(ShadingVariant::Unlit);
        let bindings: Vec<u32> = entries.iter().map(|e| e.binding).collect();
        assert_eq!(bindings, vec![0, 1]);
    }

    #[test]
    fn uniform_entries_declare_host_sizes() {
        let entry = uniform_layout_entry::<LightUniform>();
        match entry.ty {
            wgpu::BindingType::Buffer {
                min_binding_size, ..
            } => assert_eq!(min_binding_size.map(|size| size.get()), Some(32)),
            other => panic!("unexpected binding type {other:?}"),
        }
    }

    #[test]
    fn vertex_layouts_step_per_vertex_then_per_instance() {
        for variant in [ShadingVariant::Standard, ShadingVariant::Unlit] {
            let [mesh, instance] = variant.vertex_layouts();
            assert_eq!(mesh.step_mode, wgpu::VertexStepMode::Vertex);
            assert_eq!(instance.step_mode, wgpu::VertexStepMode::Instance);
        }
        let [mesh, _] = ShadingVariant::Unlit.vertex_layouts();
        assert_eq!(mesh.array_stride, 20);
    }

    #[test]
    fn variant_parses_from_text() {
        assert_eq!(
            " Unlit ".parse::<ShadingVariant>().unwrap(),
            ShadingVariant::Unlit
        );
        assert_eq!(
            "standard".parse::<ShadingVariant>().unwrap(),
            ShadingVariant::Standard
        );
        assert!("phong".parse::<ShadingVariant>().is_err());
    }
}
