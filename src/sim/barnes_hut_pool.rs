use rayon::prelude::*;

use crate::{
    error::{Result, SimError},
    quadtree::{QuadNode, QuadTree},
    shared::{
        Integrator, Particle, SemiImplicitEuler, Simulation, SimulationSettings, StepReport, Vec2,
        count_non_finite,
    },
};

/// Smallest run of particle indices a worker claims at once.
pub const DEFAULT_CHUNK: usize = 10;

/// Barnes-Hut stepping on a dedicated rayon pool.
///
/// The tree is still built on the calling thread. Forces are evaluated against
/// that read-only tree into a side buffer and only then written back, so every
/// particle sees the same snapshot and the result does not depend on how the
/// indices were split between workers.
pub struct BarnesHutPoolSimulation<P, I = SemiImplicitEuler>
where
    P: Particle,
    I: Integrator<P>,
{
    points: Vec<P>,
    arena: Vec<QuadNode>,
    forces: Vec<Vec2>,
    integrator: I,
    settings: SimulationSettings,
    pool: rayon::ThreadPool,
    chunk: usize,
    elapsed: f64,
    steps: u64,
}

impl<P, I> BarnesHutPoolSimulation<P, I>
where
    P: Particle,
    I: Integrator<P>,
{
    pub fn new(
        points: Vec<P>,
        integrator: I,
        settings: SimulationSettings,
        workers: usize,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(SimError::InvalidConfig(
                "worker count must be at least 1".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bh-worker-{i}"))
            .build()?;
        Ok(Self {
            forces: vec![Vec2::zeros(); points.len()],
            points,
            arena: Vec::new(),
            integrator,
            settings,
            pool,
            chunk: DEFAULT_CHUNK,
            elapsed: 0.0,
            steps: 0,
        })
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl<P, I> Simulation<P, I> for BarnesHutPoolSimulation<P, I>
where
    P: Particle,
    I: Integrator<P>,
{
    fn init(&mut self) {
        self.integrator.init();
        self.elapsed = 0.0;
        self.steps = 0;
    }

    fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    fn elapsed(&self) -> f64 {
        self.elapsed
    }

    fn steps_taken(&self) -> u64 {
        self.steps
    }

    fn update_forces(&mut self) -> Result<StepReport> {
        let Self {
            points,
            arena,
            forces,
            settings,
            pool,
            chunk,
            ..
        } = self;
        let chunk = *chunk;
        let settings = &*settings;

        let tree = QuadTree::build_in(std::mem::take(arena), points, settings)?;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("tree:\n{tree}");
        }
        let report = StepReport {
            nodes: tree.node_count(),
            depth: tree.depth(),
            escaped: tree.escaped(),
            ..Default::default()
        };

        forces.resize(points.len(), Vec2::zeros());
        pool.install(|| {
            forces
                .par_iter_mut()
                .enumerate()
                .with_min_len(chunk)
                .for_each(|(i, force)| *force = tree.force_on(i, settings));
        });
        *arena = tree.into_arena();

        pool.install(|| {
            points
                .par_iter_mut()
                .zip(forces.par_iter())
                .with_min_len(chunk)
                .for_each(|(point, force)| *point.force_mut() = *force);
        });
        Ok(report)
    }

    fn step_by(&mut self, dt: f64) -> Result<StepReport> {
        let chunk = self.chunk;
        let integrator = &self.integrator;
        let points = &mut self.points;
        self.pool.install(|| {
            points
                .par_iter_mut()
                .with_min_len(chunk)
                .for_each(|point| integrator.integrate_pre_force(point, dt));
        });

        let mut report = self.update_forces()?;

        let integrator = &self.integrator;
        let points = &mut self.points;
        self.pool.install(|| {
            points
                .par_iter_mut()
                .with_min_len(chunk)
                .for_each(|point| integrator.integrate_after_force(point, dt));
        });

        self.steps += 1;
        self.elapsed += dt;
        report.step = self.steps;
        report.dt = dt;
        report.non_finite = count_non_finite(&self.points);
        Ok(report)
    }

    fn get_points(&self) -> &[P] {
        &self.points
    }
}
