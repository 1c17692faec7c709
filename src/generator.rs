use std::f64::consts::PI;

use rand::Rng;

use crate::shared::{Particle, Vec2};

const MIN_MASS: f64 = 180.0;
const MAX_MASS: f64 = 500.0;
/// Disk radius as a fraction of the domain side.
const RADIUS_FRACTION: f64 = 2.5 / 6.0;
const ANGULAR_SCALE: f64 = 7e-2;

/// Rotating-disk initial conditions centered in a square domain.
#[derive(Clone, Debug)]
pub struct DiskGenerator {
    pub count: usize,
    pub domain_size: f64,
    pub g: f64,
    /// Optional heavy body placed at rest at the domain center as particle 0.
    pub central_mass: Option<f64>,
}

impl DiskGenerator {
    pub fn new(count: usize, domain_size: f64, g: f64) -> Self {
        Self {
            count,
            domain_size,
            g,
            central_mass: None,
        }
    }

    pub fn with_central_mass(mut self, mass: f64) -> Self {
        self.central_mass = Some(mass);
        self
    }

    /// Draws `count` particles. Angular velocity uses the running sum of the
    /// masses drawn so far as the enclosed mass, so earlier particles spin faster
    /// regardless of their radius.
    pub fn generate<P: Particle, R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<P> {
        let center = Vec2::new(self.domain_size / 2.0, self.domain_size / 2.0);
        let max_radius = RADIUS_FRACTION * self.domain_size;
        let mut points = Vec::with_capacity(self.count);
        let mut enclosed_mass = 0.0;

        if let Some(mass) = self.central_mass {
            if self.count > 0 {
                points.push(P::new(center, Vec2::zeros(), mass));
                enclosed_mass += mass;
            }
        }

        while points.len() < self.count {
            let angle = rng.random_range(0.0..2.0 * PI);
            let radius = rng.random_range(0.0..max_radius);
            let mass = rng.random_range(MIN_MASS..MAX_MASS);
            if radius == 0.0 {
                // ω diverges at the exact center.
                continue;
            }
            let offset = Vec2::new(radius * angle.cos(), radius * angle.sin());
            let r = offset.norm();
            enclosed_mass += mass;
            let omega = (self.g * enclosed_mass / r.powi(3)).sqrt() * ANGULAR_SCALE;

            // Each component is uniform between -ω·y and ω·x.
            let span = omega * offset.x + omega * offset.y;
            let velocity = Vec2::new(
                rng.random::<f64>() * span - omega * offset.y,
                rng.random::<f64>() * span - omega * offset.y,
            );

            points.push(P::new(center + offset, velocity, mass));
        }

        log::debug!(
            "generated {} particles, total mass {:.1}",
            points.len(),
            enclosed_mass
        );
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::PointParticle;
    use rand::{SeedableRng, rngs::StdRng};

    fn disk(seed: u64, generator: &DiskGenerator) -> Vec<PointParticle> {
        generator.generate(&mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn particles_lie_in_the_disk() {
        let generator = DiskGenerator::new(2000, 1000.0, 6.673e-11);
        let points = disk(1, &generator);
        assert_eq!(points.len(), 2000);
        let center = Vec2::new(500.0, 500.0);
        for p in &points {
            let r = (p.position - center).norm();
            assert!(r > 0.0);
            assert!(r < 1000.0 * 2.5 / 6.0 + 1e-9);
            assert!(p.mass >= 180.0 && p.mass < 500.0);
            assert_eq!(p.force, Vec2::zeros());
        }
    }

    #[test]
    fn velocity_components_stay_between_bounds() {
        let generator = DiskGenerator::new(500, 1000.0, 1.0);
        let points = disk(2, &generator);
        let mut enclosed = 0.0;
        for p in &points {
            let offset = p.position - Vec2::new(500.0, 500.0);
            enclosed += p.mass;
            let omega = (enclosed / offset.norm().powi(3)).sqrt() * ANGULAR_SCALE;
            let (a, b) = (-omega * offset.y, omega * offset.x);
            let (lo, hi) = (a.min(b), a.max(b));
            let slack = 1e-9 * (1.0 + hi.abs() + lo.abs());
            for v in p.velocity.iter() {
                assert!(*v >= lo - slack && *v <= hi + slack);
            }
        }
    }

    #[test]
    fn same_seed_same_disk() {
        let generator = DiskGenerator::new(100, 1000.0, 6.673e-11);
        assert_eq!(disk(42, &generator), disk(42, &generator));
        assert_ne!(disk(42, &generator), disk(43, &generator));
    }

    #[test]
    fn central_body_comes_first() {
        let generator = DiskGenerator::new(10, 1000.0, 1.0).with_central_mass(1e6);
        let points = disk(3, &generator);
        assert_eq!(points.len(), 10);
        assert_eq!(points[0].position, Vec2::new(500.0, 500.0));
        assert_eq!(points[0].velocity, Vec2::zeros());
        assert_eq!(points[0].mass, 1e6);
    }

    #[test]
    fn empty_request_yields_nothing() {
        let generator = DiskGenerator::new(0, 1000.0, 1.0).with_central_mass(1e6);
        assert!(disk(4, &generator).is_empty());
    }
}
