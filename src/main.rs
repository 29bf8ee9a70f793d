use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, warn};
use pollster::block_on;

use tangent_shading::{preview, GpuContext, Renderer, Scene};

/// Loads a scene description and shades it.
#[derive(Parser, Debug)]
#[command(name = "tangent-shading")]
#[command(about = "Tangent-space normal-mapped lighting for instanced meshes")]
struct Cli {
    /// Scene description (XML)
    #[arg(value_name = "SCENE")]
    scene: PathBuf,

    /// Print the scene summary without shading anything
    #[arg(long)]
    summary_only: bool,

    /// Write the software preview to this PNG file
    #[arg(long, value_name = "FILE")]
    preview: Option<PathBuf>,

    /// Preview / render target size
    #[arg(long, value_name = "WxH", default_value = "64x64", value_parser = parse_size)]
    size: (u32, u32),

    /// Also draw one frame on a headless GPU device
    #[arg(long)]
    gpu: bool,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let scene = Scene::load(&cli.scene)?;
    info!("loaded scene from {}", cli.scene.display());

    println!(
        "Loaded scene with {} instance(s) ({} variant)",
        scene.instances.len(),
        scene.variant
    );
    println!(
        " - mesh: {:?}, material: {}",
        scene.mesh, scene.material.name
    );
    let light = scene.light;
    println!(
        "Light at ({:.3}, {:.3}, {:.3}) colour ({:.3}, {:.3}, {:.3})",
        light.position.x,
        light.position.y,
        light.position.z,
        light.color.x,
        light.color.y,
        light.color.z
    );

    if cli.summary_only {
        return Ok(());
    }

    let (width, height) = cli.size;
    let image = preview::render(&scene, width, height).context("failed to shade preview")?;
    let centre = image.center_color;
    println!(
        "Centre pixel: ({:.3}, {:.3}, {:.3}, {:.3})",
        centre.x, centre.y, centre.z, centre.w
    );
    if let Some(path) = &cli.preview {
        image.save(path)?;
        println!("Wrote preview to {}", path.display());
    }

    if cli.gpu {
        render_on_gpu(&scene, width, height)?;
    }
    Ok(())
}

fn render_on_gpu(scene: &Scene, width: u32, height: u32) -> Result<()> {
    let context = match block_on(GpuContext::headless()) {
        Ok(context) => context,
        Err(err) => {
            warn!("GPU unavailable: {err}");
            eprintln!("{err}. Falling back to the software preview only.");
            return Ok(());
        }
    };
    let adapter = context.adapter_info.name.clone();
    let mut renderer = Renderer::new(context, scene, width, height)?;
    let submission = renderer.render_frame();
    info!("submitted frame {submission:?}");
    let pixels = renderer
        .read_pixels()
        .context("failed to read back GPU frame")?;
    println!(
        "Rendered {} instance(s) on {adapter}",
        renderer.instance_count()
    );
    if let Some([r, g, b, a]) = pixels.get((height / 2 * width + width / 2) as usize) {
        println!("GPU centre pixel: ({r}, {g}, {b}, {a})");
    }
    Ok(())
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width: u32 = width.trim().parse().context("invalid width")?;
    let height: u32 = height.trim().parse().context("invalid height")?;
    preview::check_target_size(width, height)?;
    Ok((width, height))
}
