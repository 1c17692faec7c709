use crate::{
    error::Result,
    quadtree::{QuadNode, QuadTree},
    shared::{
        Integrator, Particle, SemiImplicitEuler, Simulation, SimulationSettings, StepReport, Vec2,
        count_non_finite,
    },
};

/// Single-threaded Barnes-Hut stepping. Reference executor for the pooled variant.
#[derive(Clone)]
pub struct BarnesHutSimulation<P, I = SemiImplicitEuler>
where
    P: Particle,
    I: Integrator<P>,
{
    points: Vec<P>,
    arena: Vec<QuadNode>,
    forces: Vec<Vec2>,
    integrator: I,
    settings: SimulationSettings,
    elapsed: f64,
    steps: u64,
}

impl<P, I> BarnesHutSimulation<P, I>
where
    P: Particle,
    I: Integrator<P>,
{
    pub fn new(points: Vec<P>, integrator: I, settings: SimulationSettings) -> Self {
        Self {
            forces: vec![Vec2::zeros(); points.len()],
            points,
            arena: Vec::new(),
            integrator,
            settings,
            elapsed: 0.0,
            steps: 0,
        }
    }
}

impl<P, I> Simulation<P, I> for BarnesHutSimulation<P, I>
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
        let tree = QuadTree::build_in(
            std::mem::take(&mut self.arena),
            &self.points,
            &self.settings,
        )?;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("tree:\n{tree}");
        }
        let report = StepReport {
            nodes: tree.node_count(),
            depth: tree.depth(),
            escaped: tree.escaped(),
            ..Default::default()
        };

        self.forces.resize(self.points.len(), Vec2::zeros());
        for (i, force) in self.forces.iter_mut().enumerate() {
            *force = tree.force_on(i, &self.settings);
        }
        self.arena = tree.into_arena();

        for (point, force) in self.points.iter_mut().zip(&self.forces) {
            *point.force_mut() = *force;
        }
        Ok(report)
    }

    fn step_by(&mut self, dt: f64) -> Result<StepReport> {
        for point in self.points.iter_mut() {
            self.integrator.integrate_pre_force(point, dt);
        }
        let mut report = self.update_forces()?;
        for point in self.points.iter_mut() {
            self.integrator.integrate_after_force(point, dt);
        }

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
