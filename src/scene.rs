use std::f32::consts::TAU;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use glam::{EulerRot, Quat, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, Projection};
use crate::instance::{self, Instance};
use crate::light::Light;
use crate::mesh::{self, MeshData};
use crate::pipeline::ShadingVariant;
use crate::texture::{TexelImage, TextureKind};

/// Side length of the generated normal map.
pub const NORMAL_MAP_SIZE: u32 = 64;

/// Everything needed to light and draw one batch of instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub camera: Camera,
    pub lens: Lens,
    pub light: Light,
    pub material: MaterialDesc,
    pub variant: ShadingVariant,
    pub mesh: MeshKind,
    pub instances: Vec<Instance>,
}

impl Scene {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scene {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("failed to parse scene {}", path.display()))
    }

    /// Parses a `<scene>` document. Every section is optional; a scene
    /// without any instances gets a single one at the origin.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("expected <scene> root, found <{}>", root.tag_name().name());
        }

        let mut scene = Scene::default();
        if let Some(text) = optional_text(&root, "variant") {
            scene.variant = text.parse()?;
        }
        if let Some(text) = optional_text(&root, "mesh") {
            scene.mesh = text.parse()?;
        }

        for node in root.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "camera" => {
                    let (camera, lens) = parse_camera(&node).context("invalid <camera>")?;
                    scene.camera = camera;
                    scene.lens = lens;
                }
                "light" => scene.light = parse_light(&node).context("invalid <light>")?,
                "material" => {
                    scene.material = parse_material(&node).context("invalid <material>")?
                }
                "instance" => scene
                    .instances
                    .push(parse_instance(&node).context("invalid <instance>")?),
                "instance-grid" => scene
                    .instances
                    .extend(parse_grid(&node).context("invalid <instance-grid>")?),
                _ => {}
            }
        }

        if scene.instances.len() > instance::MAX_INSTANCES {
            bail!(
                "scene has {} instances, more than the limit of {}",
                scene.instances.len(),
                instance::MAX_INSTANCES
            );
        }
        if scene.instances.is_empty() {
            scene.instances.push(Instance::default());
        }
        Ok(scene)
    }

    pub fn projection(&self, width: u32, height: u32) -> Projection {
        Projection::new(
            width,
            height,
            self.lens.fovy.to_radians(),
            self.lens.z_near,
            self.lens.z_far,
        )
    }

    pub fn mesh_data(&self) -> MeshData {
        match self.mesh {
            MeshKind::Cube => mesh::cube(),
            MeshKind::Quad => mesh::quad(),
        }
    }
}

/// Perspective settings, `fovy` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lens {
    pub fovy: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for Lens {
    fn default() -> Self {
        Self {
            fovy: 45.0,
            z_near: 0.1,
            z_far: 100.0,
        }
    }
}

/// Built-in meshes a scene can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshKind {
    #[default]
    Cube,
    Quad,
}

impl std::str::FromStr for MeshKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cube" => Ok(MeshKind::Cube),
            "quad" => Ok(MeshKind::Quad),
            other => Err(anyhow!("unknown mesh `{other}` (expected `cube` or `quad`)")),
        }
    }
}

/// Procedural material: a flat base colour plus optional sinusoidal ridges
/// running along V in the normal map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDesc {
    pub name: String,
    /// sRGB-encoded RGBA.
    pub color: [u8; 4],
    #[serde(default)]
    pub bumps: u32,
    #[serde(default = "default_bump_depth")]
    pub bump_depth: f32,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            color: [255, 255, 255, 255],
            bumps: 0,
            bump_depth: default_bump_depth(),
        }
    }
}

fn default_bump_depth() -> f32 {
    0.5
}

impl MaterialDesc {
    pub fn diffuse_image(&self) -> TexelImage {
        TexelImage::solid(TextureKind::Diffuse, self.color)
    }

    pub fn normal_image(&self) -> Result<TexelImage> {
        if self.bumps == 0 {
            return Ok(TexelImage::flat_normal());
        }
        let frequency = TAU * self.bumps as f32;
        let size = NORMAL_MAP_SIZE;
        let image = TexelImage::from_fn(size, size, TextureKind::Normal, |x, _| {
            let u = (x as f32 + 0.5) / size as f32;
            let slope = self.bump_depth * (frequency * u).cos();
            pack_normal(Vec3::new(-slope, 0.0, 1.0).normalize())
        })?;
        Ok(image)
    }
}

/// Inverse of the shader's `* 2 - 1` unpack.
pub fn pack_normal(normal: Vec3) -> [u8; 4] {
    let packed = (normal * 0.5 + Vec3::splat(0.5)) * 255.0;
    [
        packed.x.round().clamp(0.0, 255.0) as u8,
        packed.y.round().clamp(0.0, 255.0) as u8,
        packed.z.round().clamp(0.0, 255.0) as u8,
        255,
    ]
}

fn parse_camera(node: &Node<'_, '_>) -> Result<(Camera, Lens)> {
    let lens_default = Lens::default();
    let camera_default = Camera::default();
    let position = parse_vec3(optional_text(node, "position"), camera_default.position)?;
    let yaw = parse_f32(optional_text(node, "yaw"), camera_default.yaw().to_degrees())?;
    let pitch = parse_f32(optional_text(node, "pitch"), camera_default.pitch().to_degrees())?;
    let lens = Lens {
        fovy: parse_f32(optional_text(node, "fov"), lens_default.fovy)?,
        z_near: parse_f32(optional_text(node, "near"), lens_default.z_near)?,
        z_far: parse_f32(optional_text(node, "far"), lens_default.z_far)?,
    };
    if lens.z_near <= 0.0 || lens.z_far <= lens.z_near {
        bail!(
            "clip planes must satisfy 0 < near < far (near {}, far {})",
            lens.z_near,
            lens.z_far
        );
    }
    Ok((Camera::from_degrees(position, yaw, pitch), lens))
}

fn parse_light(node: &Node<'_, '_>) -> Result<Light> {
    let defaults = Light::default();
    let position = parse_vec3(optional_text(node, "position"), defaults.position)?;
    let color = parse_color(optional_text(node, "color"), defaults.color)?;
    let intensity = parse_f32(optional_text(node, "intensity"), 1.0)?;
    Ok(Light::new(position, color * intensity))
}

fn parse_material(node: &Node<'_, '_>) -> Result<MaterialDesc> {
    let defaults = MaterialDesc::default();
    let color = match optional_text(node, "color") {
        Some(text) => {
            let [r, g, b] = parse_floats::<3>(&text, "color")?;
            [byte(r)?, byte(g)?, byte(b)?]
        }
        None => [255, 255, 255],
    };
    let alpha = match optional_text(node, "alpha") {
        Some(text) => byte(parse_f32(Some(text), 255.0)?)?,
        None => 255,
    };
    let bumps = match optional_text(node, "bumps") {
        Some(text) => text
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse bump count `{text}`: {err}"))?,
        None => 0,
    };
    Ok(MaterialDesc {
        name: optional_text(node, "name").unwrap_or(defaults.name),
        color: [color[0], color[1], color[2], alpha],
        bumps,
        bump_depth: parse_f32(optional_text(node, "bump-depth"), defaults.bump_depth)?,
    })
}

fn parse_instance(node: &Node<'_, '_>) -> Result<Instance> {
    let position = parse_vec3(Some(required_text(node, "position")?), Vec3::ZERO)?;
    let rotation = parse_vec3(optional_text(node, "rotation"), Vec3::ZERO)?;
    let scale = parse_vec3(optional_text(node, "scale"), Vec3::ONE)?;
    Ok(Instance {
        position,
        rotation: Quat::from_euler(
            EulerRot::ZYX,
            rotation.z.to_radians(),
            rotation.y.to_radians(),
            rotation.x.to_radians(),
        ),
        scale,
    })
}

fn parse_grid(node: &Node<'_, '_>) -> Result<Vec<Instance>> {
    let per_row = required_text(node, "per-row")?;
    let per_row = per_row
        .parse::<u32>()
        .map_err(|err| anyhow!("failed to parse per-row `{per_row}`: {err}"))?;
    let count = per_row as usize * per_row as usize;
    if count > instance::MAX_INSTANCES {
        bail!(
            "per-row {per_row} would create {count} instances, more than the limit of {}",
            instance::MAX_INSTANCES
        );
    }
    let spacing = parse_f32(optional_text(node, "spacing"), 3.0)?;
    Ok(instance::grid(per_row, spacing))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_floats<const N: usize>(value: &str, what: &str) -> Result<[f32; N]> {
    let components = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("{what} component `{component}`: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    components
        .try_into()
        .map_err(|found: Vec<f32>| anyhow!("{what} needs {N} components, found {}", found.len()))
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(Vec3::from_array(parse_floats::<3>(&value, "vector")?)),
        None => Ok(default),
    }
}

/// Colours are written as 0-255 per channel.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(Vec3::from_array(parse_floats::<3>(&value, "color")?) / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float `{value}`: {err}")),
        None => Ok(default),
    }
}

fn byte(value: f32) -> Result<u8> {
    if !(0.0..=255.0).contains(&value) {
        bail!("channel value {value} is outside 0-255");
    }
    Ok(value.round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shading::unpack_normal;

    const SAMPLE: &str = r#"
    <scene>
        <variant>standard</variant>
        <mesh>quad</mesh>
        <camera>
            <position>0 1 4</position>
            <yaw>-90</yaw>
            <pitch>0</pitch>
            <fov>60</fov>
        </camera>
        <light>
            <position>0 5 0</position>
            <color>255 128 0</color>
            <intensity>2</intensity>
        </light>
        <material>
            <name>brick</name>
            <color>200 100 50</color>
            <alpha>128</alpha>
            <bumps>4</bumps>
        </material>
        <instance>
            <position>1 2 3</position>
            <rotation>0 90 0</rotation>
            <scale>2 2 2</scale>
        </instance>
        <instance-grid>
            <per-row>2</per-row>
            <spacing>1.5</spacing>
        </instance-grid>
    </scene>
    "#;

    #[test]
    fn parse_scene_populates_every_section() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.variant, ShadingVariant::Standard);
        assert_eq!(scene.mesh, MeshKind::Quad);
        assert_eq!(scene.camera.position, Vec3::new(0.0, 1.0, 4.0));
        assert!((scene.camera.yaw() + 90f32.to_radians()).abs() < 1e-6);
        assert_eq!(scene.lens.fovy, 60.0);
        assert_eq!(scene.lens.z_far, 100.0);

        assert_eq!(scene.light.position, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(scene.light.color, Vec3::new(2.0, 256.0 / 255.0, 0.0));

        assert_eq!(scene.material.name, "brick");
        assert_eq!(scene.material.color, [200, 100, 50, 128]);
        assert_eq!(scene.material.bumps, 4);

        assert_eq!(scene.instances.len(), 5);
        let first = scene.instances[0];
        assert_eq!(first.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(first.scale, Vec3::splat(2.0));
        let turned = first.rotation * Vec3::X;
        assert!((turned - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn empty_scene_gets_defaults_and_one_instance() {
        let scene = Scene::from_xml("<scene/>").unwrap();
        assert_eq!(scene.variant, ShadingVariant::Standard);
        assert_eq!(scene.instances, vec![Instance::default()]);
        assert_eq!(scene.light, Light::default());
        assert_eq!(
            scene.material.normal_image().unwrap(),
            TexelImage::flat_normal()
        );
    }

    #[test]
    fn unlit_variant_is_recognised() {
        let scene = Scene::from_xml("<scene><variant>unlit</variant></scene>").unwrap();
        assert_eq!(scene.variant, ShadingVariant::Unlit);
    }

    #[test]
    fn malformed_sections_are_errors() {
        let bad = [
            "<world/>",
            "<scene><variant>phong</variant></scene>",
            "<scene><instance><scale>1 1 1</scale></instance></scene>",
            "<scene><light><position>1 2</position></light></scene>",
            "<scene><material><color>300 0 0</color></material></scene>",
            "<scene><camera><near>5</near><far>1</far></camera></scene>",
            "<scene><instance-grid/></scene>",
        ];
        for xml in bad {
            assert!(Scene::from_xml(xml).is_err(), "accepted {xml}");
        }
    }

    #[test]
    fn oversized_grids_are_rejected_before_allocating() {
        let err = Scene::from_xml(
            "<scene><instance-grid><per-row>70000</per-row></instance-grid></scene>",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("more than the limit"), "{err:#}");

        let largest = Scene::from_xml(
            "<scene><instance-grid><per-row>1024</per-row></instance-grid></scene>",
        )
        .unwrap();
        assert_eq!(largest.instances.len(), instance::MAX_INSTANCES);

        let two_grids = "<scene>\
            <instance-grid><per-row>1024</per-row></instance-grid>\
            <instance><position>0 0 0</position></instance>\
            </scene>";
        assert!(Scene::from_xml(two_grids).is_err());
    }

    #[test]
    fn bumpy_normal_map_tilts_along_u_only() {
        let material = MaterialDesc {
            bumps: 2,
            ..MaterialDesc::default()
        };
        let image = material.normal_image().unwrap();
        assert_eq!(image.width(), NORMAL_MAP_SIZE);

        let crest = unpack_normal(image.sample(glam::Vec2::new(0.0, 0.3)));
        assert!(crest.x < -0.3);
        assert!(crest.y.abs() < 0.01);
        assert!(crest.z > 0.8);

        let quarter = unpack_normal(image.sample(glam::Vec2::new(0.125, 0.9)));
        assert!(quarter.x.abs() < 0.1);
    }

    #[test]
    fn pack_normal_rounds_to_nearest_byte() {
        assert_eq!(pack_normal(Vec3::Z), [128, 128, 255, 255]);
        assert_eq!(pack_normal(Vec3::NEG_X), [0, 128, 128, 255]);
    }
}
