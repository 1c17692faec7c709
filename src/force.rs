use crate::{
    quadtree::{NodeIndex, QuadTree, ROOT},
    shared::{Particle, SimulationSettings, Vec2},
};

/// Newtonian pull on `mass` at `position` from `source_mass` at `source`,
/// scaled by the settings' `k`.
#[inline]
pub fn attraction(
    position: &Vec2,
    mass: f64,
    source: &Vec2,
    source_mass: f64,
    settings: &SimulationSettings,
) -> Vec2 {
    let r = source - position;
    let d = r.norm();
    let f = settings.g * source_mass * mass / (d * d);
    r.map(|c| f * c / d * settings.k)
}

impl<P: Particle> QuadTree<'_, P> {
    /// Force on the particle at `index`, which never interacts with itself.
    pub fn force_on(&self, index: usize, settings: &SimulationSettings) -> Vec2 {
        let particle = &self.particles[index];
        self.force_at(particle.position(), particle.get_mass(), Some(index), settings)
    }

    /// Force on a probe mass at `position`. Leaves occupied by `exclude` are skipped.
    pub fn force_at(
        &self,
        position: &Vec2,
        mass: f64,
        exclude: Option<usize>,
        settings: &SimulationSettings,
    ) -> Vec2 {
        let mut force = Vec2::zeros();
        if !self.nodes.is_empty() {
            self.calc_force(ROOT, position, mass, exclude, settings, &mut force);
        }
        force
    }

    fn calc_force(
        &self,
        node: NodeIndex,
        position: &Vec2,
        mass: f64,
        exclude: Option<usize>,
        settings: &SimulationSettings,
        force: &mut Vec2,
    ) {
        let n = &self.nodes[node];
        match n.occupant() {
            Some(index) if Some(index) == exclude => {}
            Some(index) => {
                let other = &self.particles[index];
                let contribution =
                    attraction(position, mass, other.position(), other.get_mass(), settings);
                settings.force_mode.apply(force, contribution);
            }
            // Internal nodes and empty leaves act as a point mass at their
            // geometric center once they are far enough away.
            None => {
                let d = (n.bounds.center - position).norm();
                if n.size_metric / d < settings.theta {
                    let contribution =
                        attraction(position, mass, &n.bounds.center, n.mass, settings);
                    settings.force_mode.apply(force, contribution);
                } else if let Some(children) = n.children() {
                    for &child in children {
                        self.calc_force(child, position, mass, exclude, settings, force);
                    }
                }
            }
        }
    }
}
