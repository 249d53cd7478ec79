//! Headless grass frame driver.
//!
//! Builds a grass simulation over a procedural terrain against the recording
//! backend, orbits the camera for a number of frames and reports what each
//! frame would submit to the GPU.
//!
//! Usage: cargo run --release --bin grass_frame -- [--settings grass.json] [--frames 8] [--size 512]

use std::time::Instant;

use glam::Vec3;

use verdure::core::{Camera, logging};
use verdure::gpu::{KernelId, KernelSet, MaterialId, RecordingBackend};
use verdure::grass::{FrameTime, GrassSettings, SimulationBuilder};
use verdure::terrain::{TerrainGenerator, TerrainParams};

fn arg_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let settings: GrassSettings = match arg_value(&args, "--settings") {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => GrassSettings::default(),
    };
    let frames: u32 = arg_value(&args, "--frames").map(str::parse::<u32>).transpose()?.unwrap_or(8);
    let size: f32 = arg_value(&args, "--size").map(str::parse::<f32>).transpose()?.unwrap_or(512.0);

    let start = Instant::now();
    let terrain = TerrainGenerator::new(TerrainParams::default()).generate(
        257,
        Vec3::new(size, size * 0.15, size),
        Vec3::new(-size * 0.5, 0.0, -size * 0.5),
    );
    log::info!("Terrain generated in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    let mut gpu = RecordingBackend::new();
    let start = Instant::now();
    let mut ctx = SimulationBuilder::new()
        .terrain(&terrain)
        .heightmap(&terrain)
        .camera(Camera::look_at(Vec3::new(0.0, size * 0.2, size * 0.5), Vec3::ZERO, Vec3::Y))
        .kernels(KernelSet {
            visibility: KernelId(1),
            physics: Some(KernelId(0)),
        })
        .material(MaterialId(0))
        .settings(settings)
        .build(&mut gpu)?;

    if !ctx.is_ready() {
        return Err(format!("grass simulation not ready: {}", ctx.issues()).into());
    }
    log::info!(
        "Simulation built in {:.1}ms ({} buffers)",
        start.elapsed().as_secs_f64() * 1000.0,
        gpu.live_buffers()
    );

    let delta = 1.0 / 60.0;
    for frame in 0..frames {
        let angle = frame as f32 / frames.max(1) as f32 * std::f32::consts::TAU;
        let eye = Vec3::new(angle.sin(), 0.4, angle.cos()) * size * 0.5;
        ctx.set_camera(Camera::look_at(eye, Vec3::ZERO, Vec3::Y))?;

        let time = FrameTime { delta, elapsed: frame as f32 * delta };
        let stats = ctx.draw_frame(&mut gpu, time)?;
        let commands = gpu.take_commands();
        println!(
            "frame {frame:>3}: {:>4}/{} patches visible, {:>8} blades, {:>5} commands, {} nodes tested",
            stats.visible_patches,
            stats.total_patches,
            stats.blades_submitted,
            commands.len(),
            stats.cull.nodes_tested
        );
    }

    ctx.destroy(&mut gpu);
    log::info!("Released, {} buffers still live", gpu.live_buffers());
    Ok(())
}
