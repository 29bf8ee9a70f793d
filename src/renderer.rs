use std::ops::Range;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;
use wgpu::util::DeviceExt;

use crate::camera::{Camera, Projection};
use crate::error::RenderError;
use crate::gpu::{CameraUniform, LightUniform};
use crate::instance::{Instance, MAX_INSTANCES};
use crate::light::Light;
use crate::mesh::MeshData;
use crate::pipeline::{BindGroupLayouts, LightMarkerPipeline, ShadingPipeline, ShadingVariant};
use crate::preview::check_target_size;
use crate::scene::Scene;
use crate::texture::{TexelImage, Texture};

/// Device and queue acquired without a presentation surface.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn headless() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let adapter_info = adapter.get_info();
        info!(
            "using adapter \"{}\" ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tangent-shading-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }
}

/// Vertex and index buffers for one mesh, laid out for a single variant.
pub struct GpuMesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub element_count: u32,
    pub material: usize,
}

impl GpuMesh {
    pub fn from_mesh(
        device: &wgpu::Device,
        mesh: &MeshData,
        variant: ShadingVariant,
        material: usize,
    ) -> Self {
        let unlit;
        let contents: &[u8] = match variant {
            ShadingVariant::Standard => bytemuck::cast_slice(&mesh.vertices),
            ShadingVariant::Unlit => {
                unlit = mesh.unlit_vertices();
                bytemuck::cast_slice(&unlit)
            }
        };
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-vertices", mesh.name)),
            contents,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-indices", mesh.name)),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        debug!(
            "uploaded mesh {} ({} vertices, {} triangles)",
            mesh.name,
            mesh.vertices.len(),
            mesh.triangle_count()
        );
        Self {
            name: mesh.name.clone(),
            vertex_buffer,
            index_buffer,
            element_count: mesh.indices.len() as u32,
            material,
        }
    }
}

/// Textures plus the group 0 bind group that exposes them.
pub struct Material {
    pub name: String,
    pub diffuse: Texture,
    pub normal: Option<Texture>,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    /// The normal map is required by the standard variant and ignored by
    /// the unlit one.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &BindGroupLayouts,
        variant: ShadingVariant,
        name: &str,
        diffuse: &TexelImage,
        normal: Option<&TexelImage>,
    ) -> Result<Self, RenderError> {
        let diffuse = Texture::from_image(device, queue, diffuse, &format!("{name}-diffuse"));
        let normal = match (variant.samples_normal_map(), normal) {
            (true, Some(image)) => Some(Texture::from_image(
                device,
                queue,
                image,
                &format!("{name}-normal"),
            )),
            (true, None) => return Err(RenderError::MissingNormalMap(name.to_string())),
            (false, _) => None,
        };

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&diffuse.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&diffuse.sampler),
            },
        ];
        if let Some(normal) = &normal {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&normal.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&normal.sampler),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{name}-material-bind-group")),
            layout: &layouts.material,
            entries: &entries,
        });

        Ok(Self {
            name: name.to_string(),
            diffuse,
            normal,
            bind_group,
        })
    }
}

pub struct Model {
    pub meshes: Vec<GpuMesh>,
    pub materials: Vec<Material>,
}

/// Per-instance vertex stream bound to slot 1.
pub struct InstanceBuffer {
    pub buffer: wgpu::Buffer,
    pub count: u32,
}

impl InstanceBuffer {
    pub fn new(
        device: &wgpu::Device,
        instances: &[Instance],
        variant: ShadingVariant,
    ) -> Result<Self, RenderError> {
        if instances.is_empty() {
            return Err(RenderError::EmptyInstances);
        }
        if instances.len() > MAX_INSTANCES {
            return Err(RenderError::TooManyInstances {
                count: instances.len(),
                max: MAX_INSTANCES,
            });
        }
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("instance-buffer"),
            contents: &pack_instances(instances, variant),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        Ok(Self {
            buffer,
            count: instances.len() as u32,
        })
    }

    pub fn range(&self) -> Range<u32> {
        0..self.count
    }
}

/// Raw bytes of the per-instance stream in the layout `variant` expects.
pub fn pack_instances(instances: &[Instance], variant: ShadingVariant) -> Vec<u8> {
    match variant {
        ShadingVariant::Standard => {
            let raw: Vec<_> = instances.iter().map(Instance::to_raw).collect();
            bytemuck::cast_slice(&raw).to_vec()
        }
        ShadingVariant::Unlit => {
            let raw: Vec<_> = instances.iter().map(Instance::to_unlit_raw).collect();
            bytemuck::cast_slice(&raw).to_vec()
        }
    }
}

/// Camera and light uniform buffers with their bind groups (groups 1 and 2).
pub struct FrameUniforms {
    camera_buffer: wgpu::Buffer,
    light_buffer: wgpu::Buffer,
    pub camera_bind_group: wgpu::BindGroup,
    pub light_bind_group: wgpu::BindGroup,
}

impl FrameUniforms {
    pub fn new(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        camera: &CameraUniform,
        light: &LightUniform,
    ) -> Self {
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera-uniform"),
            contents: bytemuck::bytes_of(camera),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("light-uniform"),
            contents: bytemuck::bytes_of(light),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera-bind-group"),
            layout: &layouts.camera,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });
        let light_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light-bind-group"),
            layout: &layouts.light,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: light_buffer.as_entire_binding(),
            }],
        });
        Self {
            camera_buffer,
            light_buffer,
            camera_bind_group,
            light_bind_group,
        }
    }

    pub fn apply(&self, queue: &wgpu::Queue, pending: PendingUniforms) {
        if let Some(camera) = pending.camera {
            queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera));
        }
        if let Some(light) = pending.light {
            queue.write_buffer(&self.light_buffer, 0, bytemuck::bytes_of(&light));
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingUniforms {
    pub camera: Option<CameraUniform>,
    pub light: Option<LightUniform>,
}

impl PendingUniforms {
    pub fn is_empty(&self) -> bool {
        self.camera.is_none() && self.light.is_none()
    }
}

/// Shared handle for staging uniform updates from any thread. Staged values
/// reach the GPU when the next frame starts; the latest write wins.
#[derive(Debug, Clone, Default)]
pub struct FrameState {
    pending: Arc<RwLock<PendingUniforms>>,
}

impl FrameState {
    pub fn set_camera(&self, camera: CameraUniform) {
        self.pending.write().camera = Some(camera);
    }

    pub fn set_light(&self, light: LightUniform) {
        self.pending.write().light = Some(light);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.read().is_empty()
    }

    pub fn take(&self) -> PendingUniforms {
        std::mem::take(&mut *self.pending.write())
    }
}

pub trait DrawModel<'a> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a GpuMesh,
        material: &'a Material,
        instances: Range<u32>,
        uniforms: &'a FrameUniforms,
    );

    fn set_instance_buffer(&mut self, instances: &'a InstanceBuffer);

    /// Binds `instances` to slot 1 and issues one instanced draw per mesh.
    fn draw_model_instanced(
        &mut self,
        model: &'a Model,
        instances: &'a InstanceBuffer,
        uniforms: &'a FrameUniforms,
    ) {
        self.set_instance_buffer(instances);
        for mesh in &model.meshes {
            let Some(material) = model.materials.get(mesh.material) else {
                warn!("mesh {} references missing material {}", mesh.name, mesh.material);
                continue;
            };
            self.draw_mesh_instanced(mesh, material, instances.range(), uniforms);
        }
    }
}

impl<'a> DrawModel<'a> for wgpu::RenderPass<'a> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a GpuMesh,
        material: &'a Material,
        instances: Range<u32>,
        uniforms: &'a FrameUniforms,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.set_bind_group(1, &uniforms.camera_bind_group, &[]);
        self.set_bind_group(2, &uniforms.light_bind_group, &[]);
        self.draw_indexed(0..mesh.element_count, 0, instances);
    }

    fn set_instance_buffer(&mut self, instances: &'a InstanceBuffer) {
        self.set_vertex_buffer(1, instances.buffer.slice(..));
    }
}

/// Draws light markers. Camera goes in group 0, light in group 1.
pub trait DrawLight<'a> {
    fn draw_light_mesh(&mut self, mesh: &'a GpuMesh, uniforms: &'a FrameUniforms);

    fn draw_light_model(&mut self, model: &'a Model, uniforms: &'a FrameUniforms) {
        for mesh in &model.meshes {
            self.draw_light_mesh(mesh, uniforms);
        }
    }
}

impl<'a> DrawLight<'a> for wgpu::RenderPass<'a> {
    fn draw_light_mesh(&mut self, mesh: &'a GpuMesh, uniforms: &'a FrameUniforms) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &uniforms.camera_bind_group, &[]);
        self.set_bind_group(1, &uniforms.light_bind_group, &[]);
        self.draw_indexed(0..mesh.element_count, 0, 0..1);
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

struct ColorTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl ColorTarget {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("color-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.2,
    b: 0.3,
    a: 1.0,
};

/// Draws one scene's instances into an offscreen colour target.
pub struct Renderer {
    context: GpuContext,
    pipeline: ShadingPipeline,
    light_marker: LightMarkerPipeline,
    show_light_marker: bool,
    target: ColorTarget,
    depth: DepthBuffer,
    uniforms: FrameUniforms,
    frame_state: FrameState,
    model: Model,
    instances: InstanceBuffer,
    camera: Camera,
    projection: Projection,
    light: Light,
}

impl Renderer {
    pub fn new(context: GpuContext, scene: &Scene, width: u32, height: u32) -> Result<Self> {
        check_target_size(width, height)?;
        let device = &context.device;
        let variant = scene.variant;

        let pipeline = ShadingPipeline::new(
            device,
            variant,
            ColorTarget::FORMAT,
            Some(DepthBuffer::FORMAT),
        );
        let light_marker = LightMarkerPipeline::new(
            device,
            &pipeline,
            ColorTarget::FORMAT,
            Some(DepthBuffer::FORMAT),
        );
        let target = ColorTarget::create(device, width, height);
        let depth = DepthBuffer::create(device, width, height);

        let normal_image = scene.material.normal_image()?;
        let material = Material::new(
            device,
            &context.queue,
            &pipeline.layouts,
            variant,
            &scene.material.name,
            &scene.material.diffuse_image(),
            Some(&normal_image),
        )?;
        let mesh = GpuMesh::from_mesh(device, &scene.mesh_data(), variant, 0);
        let model = Model {
            meshes: vec![mesh],
            materials: vec![material],
        };
        let instances = InstanceBuffer::new(device, &scene.instances, variant)
            .context("failed to upload scene instances")?;

        let projection = scene.projection(width, height);
        let uniforms = FrameUniforms::new(
            device,
            &pipeline.layouts,
            &CameraUniform::from_camera(&scene.camera, &projection),
            &scene.light.to_uniform(),
        );
        info!(
            "renderer ready: {variant} variant, {} instance(s), {width}x{height}",
            instances.count
        );

        Ok(Self {
            pipeline,
            light_marker,
            show_light_marker: true,
            target,
            depth,
            uniforms,
            frame_state: FrameState::default(),
            model,
            instances,
            camera: scene.camera,
            projection,
            light: scene.light,
            context,
        })
    }

    /// Handle for staging camera and light updates.
    pub fn frame_state(&self) -> FrameState {
        self.frame_state.clone()
    }

    pub fn variant(&self) -> ShadingVariant {
        self.pipeline.variant
    }

    pub fn size(&self) -> (u32, u32) {
        (self.target.texture.width(), self.target.texture.height())
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.count
    }

    /// Ignores sizes a target cannot have.
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Err(err) = check_target_size(width, height) {
            warn!("ignoring resize: {err}");
            return;
        }
        self.target = ColorTarget::create(&self.context.device, width, height);
        self.depth = DepthBuffer::create(&self.context.device, width, height);
        self.projection.resize(width, height);
        self.frame_state
            .set_camera(CameraUniform::from_camera(&self.camera, &self.projection));
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.frame_state
            .set_camera(CameraUniform::from_camera(&self.camera, &self.projection));
    }

    /// Swings the light about the world Y axis and stages the new uniform.
    pub fn orbit_light(&mut self, degrees: f32) {
        self.light.orbit(degrees);
        self.frame_state.set_light(self.light.to_uniform());
    }

    /// Whether the light is drawn as a small marker before the scene.
    pub fn set_light_marker(&mut self, visible: bool) {
        self.show_light_marker = visible;
    }

    pub fn set_instances(&mut self, instances: &[Instance]) -> Result<(), RenderError> {
        self.instances = InstanceBuffer::new(&self.context.device, instances, self.variant())?;
        debug!("replaced instance buffer ({} instances)", instances.len());
        Ok(())
    }

    /// Flushes staged uniforms, then records and submits one pass.
    pub fn render_frame(&mut self) -> wgpu::SubmissionIndex {
        let pending = self.frame_state.take();
        if !pending.is_empty() {
            debug!("flushing staged uniforms");
        }
        self.uniforms.apply(&self.context.queue, pending);

        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shading-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if self.show_light_marker {
                pass.set_pipeline(&self.light_marker.pipeline);
                pass.draw_light_model(&self.model, &self.uniforms);
            }
            pass.set_pipeline(&self.pipeline.pipeline);
            pass.draw_model_instanced(&self.model, &self.instances, &self.uniforms);
        }
        self.context.queue.submit(std::iter::once(encoder.finish()))
    }

    /// Copies the colour target back as sRGB-encoded RGBA8, row-major from
    /// the top-left corner. Blocks until the copy has landed.
    pub fn read_pixels(&self) -> Result<Vec<[u8; 4]>, RenderError> {
        let device = &self.context.device;
        let (width, height) = self.size();
        let row_bytes = width * 4;
        let padded_row_bytes = padded_bytes_per_row(width);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-buffer"),
            size: u64::from(padded_row_bytes) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback-encoder"),
        });
        encoder.copy_texture_to_buffer(
            self.target.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            self.target.texture.size(),
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        loop {
            device.poll(wgpu::PollType::Poll)?;
            match receiver.try_recv() {
                Ok(result) => break result?,
                Err(TryRecvError::Empty) => std::thread::yield_now(),
                Err(TryRecvError::Disconnected) => {
                    return Err(RenderError::Readback(wgpu::BufferAsyncError))
                }
            }
        }

        let pixels = {
            let mapped = slice.get_mapped_range();
            mapped
                .chunks_exact(padded_row_bytes as usize)
                .flat_map(|row| row[..row_bytes as usize].chunks_exact(4))
                .map(|texel| [texel[0], texel[1], texel[2], texel[3]])
                .collect()
        };
        buffer.unmap();
        debug!("read back {width}x{height} target");
        Ok(pixels)
    }
}

/// Row pitch for texture-to-buffer copies of an RGBA8 target.
fn padded_bytes_per_row(width: u32) -> u32 {
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(alignment) * alignment
}
