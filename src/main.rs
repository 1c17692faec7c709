use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use qlib::{
    SimError,
    driver::{self, RunConfig},
    shared::{ForceMode, SimulationSettings, TimeStep},
    sink::{CsvFrameSink, NullSink},
};

/// Barnes-Hut quadtree simulation of a rotating disk of point masses.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of particles
    #[arg(short = 'n', long, default_value_t = 10_000)]
    particles: usize,

    /// Worker threads for the force and integration phases
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Side length of the square domain
    #[arg(short, long, default_value_t = 1000.0)]
    domain: f64,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 100)]
    steps: u64,

    /// RNG seed for the initial disk
    #[arg(long)]
    seed: Option<u64>,

    /// Gravitational constant
    #[arg(long, default_value_t = 6.673e-11)]
    g: f64,

    /// Opening-angle threshold
    #[arg(long, default_value_t = 0.7)]
    theta: f64,

    /// Sum every branch's contribution instead of keeping only the last one
    #[arg(long)]
    accumulate: bool,

    /// Use a constant time step instead of one that grows with the step index
    #[arg(long, conflicts_with = "dt_scale")]
    dt: Option<f64>,

    /// Multiplier for the step-index time step
    #[arg(long, default_value_t = 1.0)]
    dt_scale: f64,

    /// Mass of an optional body placed at rest in the center of the disk
    #[arg(long)]
    central_mass: Option<f64>,

    /// Deepest tree level before coincident particles abort the run (1 to 64)
    #[arg(long, default_value_t = 40)]
    max_depth: usize,

    /// Write positions as CSV (frame,body,x,y)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only write every Nth frame
    #[arg(long, default_value_t = 1)]
    every: u64,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        let time_step = match self.dt {
            Some(dt) => TimeStep::Fixed(dt),
            None => TimeStep::StepIndex {
                scale: self.dt_scale,
            },
        };
        let force_mode = if self.accumulate {
            ForceMode::Accumulate
        } else {
            ForceMode::Overwrite
        };
        RunConfig {
            particles: self.particles,
            workers: self.workers,
            steps: self.steps,
            seed: self.seed,
            central_mass: self.central_mass,
            settings: SimulationSettings {
                g: self.g,
                theta: self.theta,
                domain_size: self.domain,
                max_depth: self.max_depth,
                force_mode,
                time_step,
                ..Default::default()
            },
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn run(args: &Args) -> Result<(), SimError> {
    let config = args.run_config();
    match &args.output {
        Some(path) => {
            let mut sink = CsvFrameSink::create(path, args.every)?;
            driver::run(&config, &mut sink)?;
            log::info!("positions written to {}", path.display());
        }
        None => {
            driver::run(&config, &mut NullSink)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logger();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
