use glam::{Vec2, Vec4};
use log::debug;

use crate::error::RenderError;

/// What a texture holds, which decides how its bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// sRGB-encoded base colour.
    Diffuse,
    /// Linear tangent-space normals packed into `[0, 1]`.
    Normal,
}

impl TextureKind {
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            TextureKind::Diffuse => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureKind::Normal => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// RGBA8 texels resident in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct TexelImage {
    width: u32,
    height: u32,
    kind: TextureKind,
    texels: Vec<[u8; 4]>,
}

impl TexelImage {
    pub fn new(
        width: u32,
        height: u32,
        kind: TextureKind,
        texels: Vec<[u8; 4]>,
    ) -> Result<Self, RenderError> {
        let expected = width as usize * height as usize;
        if width == 0 || height == 0 || texels.len() != expected {
            return Err(RenderError::TexelCountMismatch {
                width,
                height,
                expected,
                actual: texels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            kind,
            texels,
        })
    }

    pub fn from_fn(
        width: u32,
        height: u32,
        kind: TextureKind,
        mut texel: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Result<Self, RenderError> {
        let texels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| texel(x, y))
            .collect();
        Self::new(width, height, kind, texels)
    }

    pub fn solid(kind: TextureKind, rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            kind,
            texels: vec![rgba],
        }
    }

    /// A normal map whose every texel points straight out of the surface.
    pub fn flat_normal() -> Self {
        Self::solid(TextureKind::Normal, [128, 128, 255, 255])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// Nearest-neighbour lookup with clamp-to-edge addressing. Diffuse
    /// texels are decoded from sRGB the way the sampler on an `*Srgb`
    /// format would.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let x = texel_index(uv.x, self.width);
        let y = texel_index(uv.y, self.height);
        let [r, g, b, a] = self.texels[(y * self.width + x) as usize];
        let unorm = Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0;
        match self.kind {
            TextureKind::Diffuse => Vec4::new(
                srgb_to_linear(unorm.x),
                srgb_to_linear(unorm.y),
                srgb_to_linear(unorm.z),
                unorm.w,
            ),
            TextureKind::Normal => unorm,
        }
    }
}

fn texel_index(coordinate: f32, extent: u32) -> u32 {
    let scaled = (coordinate.clamp(0.0, 1.0) * extent as f32).floor() as u32;
    scaled.min(extent - 1)
}

pub fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// GPU texture with a view and sampler ready for binding.
#[derive(Debug)]
pub struct Texture {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &TexelImage,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: image.kind.format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
        debug!(
            "uploaded {label} ({}x{}, {:?})",
            image.width, image.height, image.kind
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&sampler_descriptor(label));

        Self {
            _texture: texture,
            view,
            sampler,
        }
    }
}

/// Clamp-to-edge, nearest-neighbour sampling, matching [`TexelImage::sample`].
pub fn sampler_descriptor(label: &str) -> wgpu::SamplerDescriptor<'_> {
    wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_texel_count() {
        let err = TexelImage::new(2, 2, TextureKind::Diffuse, vec![[0; 4]; 3]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::TexelCountMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
        assert!(TexelImage::new(0, 4, TextureKind::Normal, vec![]).is_err());
    }

    #[test]
    fn sampling_clamps_to_edges() {
        let image = TexelImage::from_fn(2, 1, TextureKind::Normal, |x, _| {
            if x == 0 {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        })
        .unwrap();
        assert_eq!(
            image.sample(Vec2::new(-3.0, 0.5)),
            Vec4::new(0.0, 0.0, 0.0, 1.0)
        );
        assert_eq!(image.sample(Vec2::new(1.0, 0.5)), Vec4::ONE);
        assert_eq!(image.sample(Vec2::new(0.75, 7.0)), Vec4::ONE);
    }

    #[test]
    fn diffuse_is_decoded_from_srgb() {
        let image = TexelImage::solid(TextureKind::Diffuse, [255, 188, 0, 128]);
        let texel = image.sample(Vec2::ZERO);
        assert!((texel.x - 1.0).abs() < 1e-6);
        assert!((texel.y - 0.5).abs() < 0.01);
        assert_eq!(texel.z, 0.0);
        assert!((texel.w - 128.0 / 255.0).abs() < 1e-6);

        let normal = TexelImage::solid(TextureKind::Normal, [188, 0, 0, 255]);
        assert!((normal.sample(Vec2::ZERO).x - 188.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn srgb_curve_round_trips() {
        for value in [0.0, 0.002, 0.2, 0.5, 0.9, 1.0] {
            assert!((linear_to_srgb(srgb_to_linear(value)) - value).abs() < 1e-5);
        }
    }

    #[test]
    fn flat_normal_unpacks_close_to_plus_z() {
        let texel = TexelImage::flat_normal().sample(Vec2::splat(0.5));
        let normal = texel.truncate() * 2.0 - glam::Vec3::ONE;
        assert!((normal - glam::Vec3::Z).length() < 0.01);
        assert_eq!(TexelImage::flat_normal().as_bytes(), &[128, 128, 255, 255]);
    }

    #[test]
    fn gpu_sampler_filters_like_cpu_sampling() {
        let descriptor = sampler_descriptor("normal");
        assert_eq!(descriptor.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(descriptor.min_filter, wgpu::FilterMode::Nearest);
        assert_eq!(descriptor.address_mode_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(descriptor.address_mode_v, wgpu::AddressMode::ClampToEdge);
    }
}
