//! Vector Field Marker Benchmark
//!
//! Drives the engine the way the simulation does: a swarm of markers
//! disturbs the field, samples it to steer, and the field diffuses once per
//! tick. Prints per-phase timings for the selected device.
//!
//! ```bash
//! cargo run -p gravitas-field --release --bin field_bench -- \
//!     --width 640 --height 480 --markers 5000 --steps 200 --device gpu
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gravitas_field::{Device, FieldConfig, Impulse, Vec2, VectorField, VectorFieldEngine};

/// Marker swarm benchmark for the vector field engine
#[derive(Parser, Debug)]
#[command(name = "field_bench")]
#[command(version, about, long_about = None)]
struct Args {
    /// Grid width in cells (default: from config)
    #[arg(long)]
    width: Option<u32>,

    /// Grid height in cells (default: from config)
    #[arg(long)]
    height: Option<u32>,

    /// Number of markers
    #[arg(long, default_value_t = 1000)]
    markers: usize,

    /// Simulation ticks to run
    #[arg(long, default_value_t = 100)]
    steps: u32,

    /// Compute device: cpu or gpu (default: from config)
    #[arg(long)]
    device: Option<Device>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disturbance each marker leaves per tick
    #[arg(long, value_enum, default_value_t = Disturbance::Tiny)]
    disturbance: Disturbance,

    /// Marker magnitude
    #[arg(long, default_value_t = 1.0)]
    magnitude: f32,

    /// RNG seed for marker placement
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Disturbance {
    Tiny,
    Burst,
}

const DT: f32 = 1.0;
const GRAVITY: f32 = 0.01;
const SPEED_FACTOR: f32 = 0.9;

#[derive(Debug, Clone, Copy)]
struct Marker {
    pos: Vec2,
    vel: Vec2,
    mag: f32,
}

impl Marker {
    /// Steer by the sampled field, cap speed at one cell, move, then damp.
    fn step(&mut self, fitted: Vec2, cell_size: f32, width: u32, height: u32) {
        self.vel += fitted * (1.0 / self.mag);

        let speed = self.vel.length();
        if speed > cell_size {
            self.vel = self.vel * (cell_size / speed);
        }

        let next = self.pos + self.vel * DT;
        self.pos = Vec2::new(
            next.x.clamp(0.0, width as f32 - 1.0),
            next.y.clamp(0.0, height as f32 - 1.0),
        );

        self.vel.y += GRAVITY * DT;
        self.vel = self.vel * SPEED_FACTOR;
    }
}

#[derive(Debug, Default)]
struct PhaseTimes {
    disturb: Duration,
    fit: Duration,
    update: Duration,
    diffuse: Duration,
}

impl PhaseTimes {
    fn total(&self) -> Duration {
        self.disturb + self.fit + self.update + self.diffuse
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gravitas_field=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("field_bench: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> gravitas_field::Result<()> {
    let mut config = match &args.config {
        Some(path) => FieldConfig::load(path)?,
        None => FieldConfig::default(),
    };
    if let Some(width) = args.width {
        config.grid_width = width;
    }
    if let Some(height) = args.height {
        config.grid_height = height;
    }
    if let Some(device) = args.device {
        config.compute_device = device;
    }
    config.validate()?;
    if !(args.magnitude.is_finite() && args.magnitude > 0.0) {
        return Err(gravitas_field::FieldError::invalid_input(format!(
            "marker magnitude must be positive, got {}",
            args.magnitude
        )));
    }

    let mut engine = match VectorFieldEngine::new(&config) {
        Ok(engine) => engine,
        Err(e) if e.is_device_unavailable() => {
            println!(
                "Device '{}' unavailable ({}), running on cpu",
                config.compute_device, e
            );
            config.compute_device = Device::Cpu;
            VectorFieldEngine::new(&config)?
        }
        Err(e) => return Err(e),
    };

    let (width, height) = (config.grid_width, config.grid_height);
    let mut field = engine.create(width, height, Vec2::ZERO)?;
    let mut markers = scatter_markers(&args, width, height);

    println!("Vector Field Marker Benchmark");
    println!("  Device: {}", engine.current_device());
    println!("  Grid: {}x{} ({} cells)", width, height, field.len());
    println!("  Markers: {}", markers.len());
    println!("  Steps: {}", args.steps);
    println!(
        "  Weights: self={} neighbor={} x{} iteration(s)",
        engine.weights().self_weight,
        engine.weights().neighbor_weight,
        engine.iterations()
    );
    println!("  Disturbance: {:?}", args.disturbance);
    println!();

    let mut times = PhaseTimes::default();
    let wall = Instant::now();

    for _ in 0..args.steps {
        tick(&mut engine, &mut field, &mut markers, &args, &config, &mut times)?;
    }

    let wall = wall.elapsed();
    engine.cleanup();
    report(&times, wall, args.steps, markers.len(), &field);
    Ok(())
}

fn scatter_markers(args: &Args, width: u32, height: u32) -> Vec<Marker> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    (0..args.markers)
        .map(|_| Marker {
            pos: Vec2::new(
                rng.gen_range(0.0..width as f32),
                rng.gen_range(0.0..height as f32),
            ),
            vel: Vec2::ZERO,
            mag: args.magnitude,
        })
        .collect()
}

fn tick(
    engine: &mut VectorFieldEngine,
    field: &mut VectorField,
    markers: &mut [Marker],
    args: &Args,
    config: &FieldConfig,
    times: &mut PhaseTimes,
) -> gravitas_field::Result<()> {
    let start = Instant::now();
    let impulses: Vec<Impulse> = markers
        .iter()
        .map(|m| Impulse::new(m.pos.x, m.pos.y, m.mag))
        .collect();
    match args.disturbance {
        Disturbance::Tiny => engine.tiny_batch(field, &impulses)?,
        Disturbance::Burst => engine.burst_batch(field, &impulses)?,
    }
    times.disturb += start.elapsed();

    let start = Instant::now();
    let positions: Vec<Vec2> = markers.iter().map(|m| m.pos).collect();
    let fitted = engine.fit_batch(field, &positions)?;
    times.fit += start.elapsed();

    let start = Instant::now();
    for (marker, v) in markers.iter_mut().zip(fitted) {
        marker.step(v, config.cell_size, config.grid_width, config.grid_height);
    }
    times.update += start.elapsed();

    let start = Instant::now();
    engine.diffuse(field)?;
    times.diffuse += start.elapsed();

    Ok(())
}

fn report(times: &PhaseTimes, wall: Duration, steps: u32, markers: usize, field: &VectorField) {
    let per_step = |d: Duration| {
        if steps == 0 {
            0.0
        } else {
            d.as_secs_f64() * 1000.0 / steps as f64
        }
    };

    println!("Phase timings (ms/step):");
    println!("  Disturb: {:>10.3}", per_step(times.disturb));
    println!("  Fit:     {:>10.3}", per_step(times.fit));
    println!("  Update:  {:>10.3}", per_step(times.update));
    println!("  Diffuse: {:>10.3}", per_step(times.diffuse));
    println!("  Total:   {:>10.3}", per_step(times.total()));
    println!();

    let secs = wall.as_secs_f64();
    if secs > 0.0 {
        println!(
            "Throughput: {:.1} steps/s, {:.0} marker updates/s",
            steps as f64 / secs,
            (steps as f64 * markers as f64) / secs
        );
    }
    println!(
        "Field: max |v| = {:.4}, finite = {}",
        field.max_magnitude(),
        field.is_finite()
    );
}
