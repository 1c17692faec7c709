// This file defines the behavior shared by the sequential and pooled Barnes-Hut simulations.

use nalgebra::Vector2;

use crate::error::{Result, SimError};

pub type Vec2 = Vector2<f64>;

pub trait Particle: Clone + Send + Sync {
    fn new(position: Vec2, velocity: Vec2, mass: f64) -> Self;
    fn position(&self) -> &Vec2;
    fn velocity(&self) -> &Vec2;
    fn force(&self) -> &Vec2;
    fn position_mut(&mut self) -> &mut Vec2;
    fn velocity_mut(&mut self) -> &mut Vec2;
    fn force_mut(&mut self) -> &mut Vec2;
    fn get_mass(&self) -> f64;

    fn is_finite(&self) -> bool {
        self.position().iter().chain(self.velocity().iter()).all(|c| c.is_finite())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointParticle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub force: Vec2,
    pub mass: f64,
}

impl Particle for PointParticle {
    fn new(position: Vec2, velocity: Vec2, mass: f64) -> Self {
        Self {
            position,
            velocity,
            force: Vec2::zeros(),
            mass,
        }
    }

    fn position(&self) -> &Vec2 {
        &self.position
    }

    fn velocity(&self) -> &Vec2 {
        &self.velocity
    }

    fn force(&self) -> &Vec2 {
        &self.force
    }

    fn position_mut(&mut self) -> &mut Vec2 {
        &mut self.position
    }

    fn velocity_mut(&mut self) -> &mut Vec2 {
        &mut self.velocity
    }

    fn force_mut(&mut self) -> &mut Vec2 {
        &mut self.force
    }

    fn get_mass(&self) -> f64 {
        self.mass
    }
}

/// Axis-aligned square region, inclusive on every edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub center: Vec2,
    pub half_width: f64,
}

impl Bounds {
    pub fn new(center: Vec2, half_width: f64) -> Self {
        Self { center, half_width }
    }

    pub fn min(&self) -> Vec2 {
        self.center.add_scalar(-self.half_width)
    }

    pub fn max(&self) -> Vec2 {
        self.center.add_scalar(self.half_width)
    }

    pub fn width(&self) -> f64 {
        self.half_width * 2.0
    }

    pub fn contains(&self, point: &Vec2) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }

    pub fn create_quadrant(&self, quadrant: Quadrant) -> Bounds {
        let offset = self.half_width / 2.0;
        let (dx, dy) = quadrant.direction();
        Bounds {
            center: Vec2::new(self.center.x + dx * offset, self.center.y + dy * offset),
            half_width: offset,
        }
    }
}

/// Child slots of a subdivided node. Declaration order is the insertion
/// precedence for points lying on a shared edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quadrant {
    NW = 0,
    NE = 1,
    SW = 2,
    SE = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::NW, Quadrant::NE, Quadrant::SW, Quadrant::SE];

    fn direction(self) -> (f64, f64) {
        match self {
            Quadrant::NW => (-1.0, 1.0),
            Quadrant::NE => (1.0, 1.0),
            Quadrant::SW => (-1.0, -1.0),
            Quadrant::SE => (1.0, -1.0),
        }
    }
}

/// How each contribution found during the tree walk is written into a particle's force.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForceMode {
    /// Every write replaces the previous one; only the last branch visited
    /// (NW, NE, SW, SE order) survives. Matches the reference program.
    #[default]
    Overwrite,
    /// Contributions are summed, as in textbook Barnes-Hut.
    Accumulate,
}

impl ForceMode {
    #[inline]
    pub fn apply(self, force: &mut Vec2, contribution: Vec2) {
        match self {
            ForceMode::Overwrite => *force = contribution,
            ForceMode::Accumulate => *force += contribution,
        }
    }
}

/// Schedule for the integration step handed to the integrator each tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeStep {
    /// `dt = scale * step`, with steps counted from 1. The reference driver
    /// runs with scale 1 (headless) or 10 (rendered).
    StepIndex { scale: f64 },
    Fixed(f64),
}

impl Default for TimeStep {
    fn default() -> Self {
        TimeStep::StepIndex { scale: 1.0 }
    }
}

impl TimeStep {
    pub fn dt(&self, step: u64) -> f64 {
        match *self {
            TimeStep::StepIndex { scale } => scale * step as f64,
            TimeStep::Fixed(dt) => dt,
        }
    }
}

/// Deepest `max_depth` accepted. Insertion recurses once per level.
pub const MAX_TREE_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationSettings {
    pub g: f64,
    /// Opening-angle threshold.
    pub theta: f64,
    /// Unit/softening factor applied to every force write.
    pub k: f64,
    /// Side length of the square domain; the root covers `[0, domain_size]²`.
    pub domain_size: f64,
    /// Size metric of the root node. Each level divides it by four.
    pub root_size_metric: f64,
    /// Level at which a node that still needs splitting aborts the build.
    /// Must lie in `1..=MAX_TREE_DEPTH`.
    pub max_depth: usize,
    pub force_mode: ForceMode,
    pub time_step: TimeStep,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            g: 6.673e-11,
            theta: 0.7,
            k: 5e-4,
            domain_size: 1000.0,
            root_size_metric: 1.0,
            max_depth: 40,
            force_mode: ForceMode::Overwrite,
            time_step: TimeStep::default(),
        }
    }
}

impl SimulationSettings {
    pub fn root_bounds(&self) -> Bounds {
        let half = self.domain_size / 2.0;
        Bounds::new(Vec2::new(half, half), half)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SimError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        };
        positive("g", self.g)?;
        positive("theta", self.theta)?;
        positive("k", self.k)?;
        positive("domain size", self.domain_size)?;
        positive("root size metric", self.root_size_metric)?;
        match self.time_step {
            TimeStep::StepIndex { scale } => positive("dt scale", scale)?,
            TimeStep::Fixed(dt) => positive("dt", dt)?,
        }
        self.validate_max_depth()
    }

    pub fn validate_max_depth(&self) -> Result<()> {
        if !(1..=MAX_TREE_DEPTH).contains(&self.max_depth) {
            return Err(SimError::InvalidConfig(format!(
                "max depth must be between 1 and {MAX_TREE_DEPTH}, got {}",
                self.max_depth
            )));
        }
        Ok(())
    }
}

/// Per-tick summary returned by [`Simulation::step_by`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    pub step: u64,
    pub dt: f64,
    pub nodes: usize,
    pub depth: usize,
    pub escaped: usize,
    pub non_finite: usize,
}

pub trait Integrator<P: Particle>: Clone + Send + Sync {
    fn init(&mut self) {}
    fn integrate_pre_force(&self, _point: &mut P, _dt: f64) {}
    fn integrate_after_force(&self, point: &mut P, dt: f64);
}

/// Semi-implicit Euler: velocity is kicked by the fresh force, then the
/// position drifts with the updated velocity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SemiImplicitEuler;

impl<P: Particle> Integrator<P> for SemiImplicitEuler {
    fn integrate_after_force(&self, point: &mut P, dt: f64) {
        let acceleration = *point.force() / point.get_mass();
        *point.velocity_mut() += acceleration * dt;
        let velocity = *point.velocity();
        *point.position_mut() += velocity * dt;
    }
}

pub trait Simulation<P: Particle, I: Integrator<P>> {
    fn init(&mut self);
    fn settings(&self) -> &SimulationSettings;
    fn elapsed(&self) -> f64;
    fn steps_taken(&self) -> u64;
    /// Rebuilds the tree from current positions and overwrites every particle's force.
    fn update_forces(&mut self) -> Result<StepReport>;
    fn step_by(&mut self, dt: f64) -> Result<StepReport>;
    fn get_points(&self) -> &[P];

    fn step(&mut self) -> Result<StepReport> {
        let dt = self.settings().time_step.dt(self.steps_taken() + 1);
        self.step_by(dt)
    }
}

pub(crate) fn count_non_finite<P: Particle>(points: &[P]) -> usize {
    points.iter().filter(|p| !p.is_finite()).count()
}
