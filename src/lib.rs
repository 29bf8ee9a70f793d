//! Tangent-space normal-mapped lighting and instanced rendering on wgpu.
//!
//! The crate ships two WGSL programs (normal-mapped Blinn-Phong and an
//! unlit ambient fallback) together with the host types that feed them:
//! uniform and vertex layouts, per-instance matrix packing, mesh
//! preparation and the wgpu plumbing that binds it all. Every shader stage
//! also has a CPU counterpart in [`shading`], which the software
//! [`preview`] uses and which keeps the lighting math testable without a
//! GPU.

pub mod camera;
pub mod error;
pub mod gpu;
pub mod instance;
pub mod light;
pub mod mesh;
pub mod pipeline;
pub mod preview;
pub mod renderer;
pub mod scene;
pub mod shaders;
pub mod shading;
pub mod texture;

pub use camera::{Camera, Projection};
pub use error::RenderError;
pub use gpu::{
    CameraUniform, InstanceRaw, LightUniform, ModelVertex, UnlitInstanceRaw, UnlitVertex,
};
pub use instance::Instance;
pub use light::Light;
pub use mesh::MeshData;
pub use pipeline::{LightMarkerPipeline, ShadingPipeline, ShadingVariant};
pub use preview::PreviewImage;
pub use renderer::{DrawLight, DrawModel, FrameState, GpuContext, Renderer};
pub use scene::Scene;
