use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No suitable GPU adapter found: {0}")]
    AdapterNotFound(#[from] wgpu::RequestAdapterError),

    #[error("Failed to request device: {0}")]
    DeviceRequestFailed(#[from] wgpu::RequestDeviceError),

    #[error("Texture {width}x{height} needs {expected} texels, got {actual}")]
    TexelCountMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Render target {width}x{height} has zero area")]
    ZeroSizedTarget { width: u32, height: u32 },

    #[error("Render target {width}x{height} exceeds the {max}x{max} limit")]
    TargetTooLarge { width: u32, height: u32, max: u32 },

    #[error("Instance buffer needs at least one instance")]
    EmptyInstances,

    #[error("{count} instances exceed the limit of {max}")]
    TooManyInstances { count: usize, max: usize },

    #[error("Failed to read back the render target: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("Material `{0}` has no normal map but the standard variant samples one")]
    MissingNormalMap(String),
}
