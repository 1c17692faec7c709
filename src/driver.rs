use std::time::{Duration, Instant};

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    error::{Result, SimError},
    generator::DiskGenerator,
    shared::{
        Integrator, Particle, PointParticle, SemiImplicitEuler, Simulation, SimulationSettings,
    },
    sim::{BarnesHutPoolSimulation, BarnesHutSimulation},
    sink::FrameSink,
};

/// Everything needed for one headless run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub particles: usize,
    pub workers: usize,
    pub steps: u64,
    /// Fixed RNG seed; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub central_mass: Option<f64>,
    pub settings: SimulationSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            particles: 1000,
            workers: 1,
            steps: 100,
            seed: None,
            central_mass: None,
            settings: SimulationSettings::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.particles == 0 {
            return Err(SimError::InvalidConfig(
                "particle count must be at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(SimError::InvalidConfig(
                "worker count must be at least 1".into(),
            ));
        }
        if self.steps == 0 {
            return Err(SimError::InvalidConfig(
                "step count must be at least 1".into(),
            ));
        }
        if let Some(mass) = self.central_mass {
            if !(mass.is_finite() && mass > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "central mass must be positive and finite, got {mass}"
                )));
            }
        }
        self.settings.validate()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    /// Sum of every dt handed to the integrator.
    pub sim_time: f64,
    pub wall: Duration,
    pub max_depth_seen: usize,
    pub escaped: usize,
    pub non_finite: usize,
}

/// Steps `sim` `steps` times, handing each tick's particles to `sink`.
/// The first error aborts the run.
pub fn drive<P, I, S, K>(sim: &mut S, steps: u64, sink: &mut K) -> Result<RunSummary>
where
    P: Particle,
    I: Integrator<P>,
    S: Simulation<P, I>,
    K: FrameSink<P>,
{
    let start = Instant::now();
    let mut summary = RunSummary::default();
    let mut reported_non_finite = 0;

    for _ in 0..steps {
        let report = sim.step()?;
        log::debug!(
            "step {} dt={} nodes={} depth={} escaped={}",
            report.step,
            report.dt,
            report.nodes,
            report.depth,
            report.escaped
        );
        if report.non_finite > reported_non_finite {
            log::warn!(
                "step {}: {} particles have non-finite position or velocity",
                report.step,
                report.non_finite
            );
            reported_non_finite = report.non_finite;
        }

        sink.frame(report.step, sim.get_points())?;

        summary.steps = report.step;
        summary.sim_time += report.dt;
        summary.max_depth_seen = summary.max_depth_seen.max(report.depth);
        summary.escaped = report.escaped;
        summary.non_finite = report.non_finite;
    }
    sink.finish()?;

    summary.wall = start.elapsed();
    Ok(summary)
}

/// Generates a disk from `config` and runs it to completion on the executor
/// matching the worker count. Returns the final particle states.
pub fn run<K>(config: &RunConfig, sink: &mut K) -> Result<(Vec<PointParticle>, RunSummary)>
where
    K: FrameSink<PointParticle>,
{
    config.validate()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut generator =
        DiskGenerator::new(config.particles, config.settings.domain_size, config.settings.g);
    if let Some(mass) = config.central_mass {
        generator = generator.with_central_mass(mass);
    }
    let points: Vec<PointParticle> = generator.generate(&mut rng);

    log::info!(
        "running {} particles for {} steps on {} worker(s), theta={}, mode={:?}",
        points.len(),
        config.steps,
        config.workers,
        config.settings.theta,
        config.settings.force_mode
    );

    let (points, summary) = if config.workers == 1 {
        let mut sim = BarnesHutSimulation::new(points, SemiImplicitEuler, config.settings.clone());
        sim.init();
        let summary = drive(&mut sim, config.steps, sink)?;
        (sim.get_points().to_vec(), summary)
    } else {
        let mut sim = BarnesHutPoolSimulation::new(
            points,
            SemiImplicitEuler,
            config.settings.clone(),
            config.workers,
        )?;
        sim.init();
        let summary = drive(&mut sim, config.steps, sink)?;
        (sim.get_points().to_vec(), summary)
    };

    log::info!(
        "finished {} steps in {:?} (max depth {}, {} escaped)",
        summary.steps,
        summary.wall,
        summary.max_depth_seen,
        summary.escaped
    );
    Ok((points, summary))
}
