//! Software rendition of one instance of a scene, using the CPU shader
//! stages over a quad that fills the image.

use std::path::Path;

use anyhow::{Context, Result};
use glam::{Vec2, Vec3, Vec4};
use log::debug;

use crate::error::RenderError;
use crate::gpu::{CameraUniform, ModelVertex, UnlitVertex};
use crate::mesh;
use crate::pipeline::ShadingVariant;
use crate::scene::Scene;
use crate::shading;
use crate::texture::linear_to_srgb;

/// Largest width or height accepted for a preview or render target. Matches
/// wgpu's default `max_texture_dimension_2d`.
pub const MAX_TARGET_EXTENT: u32 = 8192;

/// Rejects empty targets and targets larger than [`MAX_TARGET_EXTENT`].
pub fn check_target_size(width: u32, height: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::ZeroSizedTarget { width, height });
    }
    if width > MAX_TARGET_EXTENT || height > MAX_TARGET_EXTENT {
        return Err(RenderError::TargetTooLarge {
            width,
            height,
            max: MAX_TARGET_EXTENT,
        });
    }
    Ok(())
}

/// RGBA8 pixels, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 4]>,
    /// Unclamped linear colour of the centre pixel.
    pub center_color: Vec4,
}

impl PreviewImage {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        image::save_buffer(
            path,
            self.as_bytes(),
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| format!("failed to write preview to {}", path.display()))
    }
}

/// Shades a `width` x `height` image of the scene's first instance.
pub fn render(scene: &Scene, width: u32, height: u32) -> Result<PreviewImage> {
    check_target_size(width, height)?;

    let instance = scene.instances.first().copied().unwrap_or_default();
    let raw = instance.to_raw();
    let unlit_raw = instance.to_unlit_raw();
    let camera = CameraUniform::from_camera(&scene.camera, &scene.projection(width, height));
    let light = scene.light.to_uniform();
    let diffuse = scene.material.diffuse_image();
    let normal = scene.material.normal_image()?;
    // The quad's basis is the same at every corner.
    let basis = mesh::quad().vertices[0];

    let shade = |uv: Vec2| -> Vec4 {
        let vertex = ModelVertex {
            position: Vec3::new(-1.0 + 2.0 * uv.x, 1.0 - 2.0 * uv.y, 0.0).into(),
            tex_coords: uv.into(),
            ..basis
        };
        match scene.variant {
            ShadingVariant::Standard => {
                let out = shading::vertex_stage(&vertex, &raw, &camera, &light);
                let diffuse_sample = diffuse.sample(out.tex_coords);
                let normal_sample = normal.sample(out.tex_coords);
                shading::fragment_stage(&out, diffuse_sample, normal_sample, &light)
            }
            ShadingVariant::Unlit => {
                let unlit = UnlitVertex::from(&vertex);
                let out = shading::unlit_vertex_stage(&unlit, &unlit_raw, &camera);
                shading::shade_unlit(diffuse.sample(out.tex_coords), light.color())
            }
        }
    };
    let pixel_uv = |x: u32, y: u32| {
        Vec2::new(
            (x as f32 + 0.5) / width as f32,
            (y as f32 + 0.5) / height as f32,
        )
    };

    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| encode(shade(pixel_uv(x, y))))
        .collect();
    let center_color = shade(pixel_uv(width / 2, height / 2));
    debug!("shaded {width}x{height} preview ({} variant)", scene.variant);

    Ok(PreviewImage {
        width,
        height,
        pixels,
        center_color,
    })
}

/// Clamps to `[0, 1]` and sRGB-encodes colour; alpha stays linear.
fn encode(color: Vec4) -> [u8; 4] {
    let to_byte = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    let srgb = |value: f32| to_byte(linear_to_srgb(value.clamp(0.0, 1.0)));
    [srgb(color.x), srgb(color.y), srgb(color.z), to_byte(color.w)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(xml: &str) -> Scene {
        Scene::from_xml(xml).unwrap()
    }

    #[test]
    fn unlit_preview_is_uniform_ambient() {
        let scene = scene("<scene><variant>unlit</variant></scene>");
        let image = render(&scene, 8, 6).unwrap();
        assert_eq!(image.pixels.len(), 48);
        let first = image.pixels[0];
        assert!(image.pixels.iter().all(|pixel| *pixel == first));
        assert!((image.center_color - Vec4::new(0.1, 0.1, 0.1, 1.0)).length() < 1e-4);
        // sRGB encoding of 0.1 linear.
        assert_eq!(first, [89, 89, 89, 255]);
    }

    #[test]
    fn lit_pixels_never_fall_below_ambient() {
        let scene = scene(
            r#"<scene>
                <light><position>0 0 3</position></light>
                <material><bumps>3</bumps></material>
            </scene>"#,
        );
        let image = render(&scene, 16, 16).unwrap();
        assert!(image.pixels.iter().all(|pixel| pixel[0] >= 88));
        assert!(image.center_color.x > 0.1);
    }

    #[test]
    fn facing_light_saturates_flat_quad() {
        // Light and camera straight in front of the quad: ambient, full
        // diffuse and full specular at the centre.
        let scene = scene(
            r#"<scene>
                <camera><position>0 0 5</position><pitch>0</pitch></camera>
                <light><position>0 0 5</position></light>
            </scene>"#,
        );
        let image = render(&scene, 9, 9).unwrap();
        let center = image.center_color;
        assert!((center.x - 2.1).abs() < 0.01, "got {center}");
        assert_eq!(image.pixel(4, 4), Some([255, 255, 255, 255]));
        assert_eq!(image.pixel(9, 0), None);
    }

    #[test]
    fn zero_sized_preview_is_rejected() {
        let err = render(&Scene::default(), 0, 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::ZeroSizedTarget { width: 0, .. })
        ));
    }

    #[test]
    fn oversized_preview_is_rejected() {
        let err = render(&Scene::default(), MAX_TARGET_EXTENT + 1, 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::TargetTooLarge { max: MAX_TARGET_EXTENT, .. })
        ));
        assert!(check_target_size(MAX_TARGET_EXTENT, MAX_TARGET_EXTENT).is_ok());
    }

    #[test]
    fn preview_saves_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let image = render(&Scene::default(), 4, 4).unwrap();
        image.save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
}
