use qlib::{
    SimError,
    force::attraction,
    generator::DiskGenerator,
    quadtree::QuadTree,
    shared::{
        ForceMode, Particle, PointParticle, SemiImplicitEuler, Simulation, SimulationSettings,
        Vec2,
    },
    sim::{BarnesHutPoolSimulation, BarnesHutSimulation},
};
use rand::{SeedableRng, rngs::StdRng};

fn particle(x: f64, y: f64, mass: f64) -> PointParticle {
    PointParticle::new(Vec2::new(x, y), Vec2::zeros(), mass)
}

fn disk(n: usize, seed: u64) -> Vec<PointParticle> {
    DiskGenerator::new(n, 1000.0, 6.673e-11).generate(&mut StdRng::seed_from_u64(seed))
}

/// Two particles along y = 500 in the default 1000 x 1000 domain.
fn two_body() -> Vec<PointParticle> {
    vec![particle(400.0, 500.0, 200.0), particle(600.0, 500.0, 300.0)]
}

// ==================================================================================
// Tree invariants
// ==================================================================================

#[test]
fn generated_disk_keeps_tree_invariants() {
    let points = disk(3000, 21);
    let tree = QuadTree::build(&points, &SimulationSettings::default()).unwrap();

    let total: f64 = points.iter().map(|p| p.mass).sum();
    assert!((tree.root().mass - total).abs() <= total * 1e-12);
    assert_eq!(tree.escaped(), 0);

    let mut placed = vec![false; points.len()];
    for leaf in tree.leaves() {
        let index = leaf.occupant().unwrap();
        assert!(leaf.bounds.contains(&points[index].position));
        assert!(!placed[index], "particle {index} placed twice");
        placed[index] = true;
    }
    assert!(placed.iter().all(|&p| p));
}

#[test]
fn children_tile_every_divided_node() {
    let points = disk(500, 8);
    let tree = QuadTree::build(&points, &SimulationSettings::default()).unwrap();
    for (_, node) in tree.iter() {
        let Some(children) = node.children() else {
            continue;
        };
        let area: f64 = children
            .iter()
            .map(|&c| tree.node(c).bounds.width().powi(2))
            .sum();
        assert_eq!(area, node.bounds.width().powi(2));
        let child_mass: f64 = children.iter().map(|&c| tree.node(c).mass).sum();
        assert!((child_mass - node.mass).abs() <= node.mass * 1e-12);
    }
}

// ==================================================================================
// Force evaluation
// ==================================================================================

#[test]
fn fully_opened_walk_matches_pairwise_sum() {
    // A root metric this large never passes the opening test, so the walk
    // reaches every leaf and accumulation must equal the direct sum without
    // the self term.
    let points = disk(300, 5);
    let settings = SimulationSettings {
        g: 1.0,
        root_size_metric: 1e30,
        force_mode: ForceMode::Accumulate,
        ..Default::default()
    };
    let tree = QuadTree::build(&points, &settings).unwrap();
    for (i, p) in points.iter().enumerate() {
        let contributions: Vec<Vec2> = points
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, q)| attraction(&p.position, p.mass, &q.position, q.mass, &settings))
            .collect();
        let direct = contributions.iter().fold(Vec2::zeros(), |acc, f| acc + f);
        let scale: f64 = contributions.iter().map(|f| f.norm()).sum();
        let walked = tree.force_on(i, &settings);
        assert!(walked.iter().all(|c| c.is_finite()));
        assert!(
            (walked - direct).norm() <= scale * 1e-12,
            "particle {i}: {walked:?} vs {direct:?}"
        );
    }
}

#[test]
fn opening_angle_switches_at_threshold() {
    let points = vec![particle(0.5, 0.5, 1.0), particle(3.5, 0.5, 2.0)];
    for force_mode in [ForceMode::Overwrite, ForceMode::Accumulate] {
        let settings = SimulationSettings {
            g: 1.0,
            k: 1.0,
            domain_size: 4.0,
            force_mode,
            ..Default::default()
        };
        let tree = QuadTree::build(&points, &settings).unwrap();
        let center = tree.root().bounds.center;
        let boundary = tree.root().size_metric / settings.theta;

        // size / d just below theta: the root is a single pseudo-particle.
        let far = Vec2::new(center.x + boundary * (1.0 + 1e-9), center.y);
        let f = tree.force_at(&far, 1.0, None, &settings);
        assert_eq!(f, attraction(&far, 1.0, &center, 3.0, &settings));
        assert_eq!(f.y, 0.0);
        assert!(f.x < 0.0);

        // size / d just above theta: the walk descends into the quadrants,
        // whose masses sit below the probe's row.
        let near = Vec2::new(center.x + boundary * (1.0 - 1e-9), center.y);
        let f = tree.force_at(&near, 1.0, None, &settings);
        assert!(f.y < 0.0, "{force_mode:?}: {f:?}");
    }
}

// ==================================================================================
// End to end
// ==================================================================================

#[test]
fn two_bodies_attract_and_close_in() {
    for force_mode in [ForceMode::Overwrite, ForceMode::Accumulate] {
        // At the default G one tick moves each body by ~1e-15, below f64
        // resolution at x = 400, so the approach would be invisible.
        let settings = SimulationSettings {
            g: 1.0,
            force_mode,
            ..Default::default()
        };
        let points = two_body();

        let tree = QuadTree::build(&points, &settings).unwrap();
        assert!(tree.root().is_divided());
        assert_eq!(tree.leaves().count(), 2);
        drop(tree);

        let mut sim = BarnesHutSimulation::new(points, SemiImplicitEuler, settings);
        sim.init();
        let report = sim.step_by(1.0).unwrap();
        assert_eq!(report.non_finite, 0);

        let [a, b] = sim.get_points() else {
            panic!("expected two particles");
        };
        assert!(a.force.x > 0.0, "{force_mode:?}: {:?}", a.force);
        assert!(b.force.x < 0.0, "{force_mode:?}: {:?}", b.force);
        assert!(a.position.x > 400.0);
        assert!(b.position.x < 600.0);
        assert!(b.position.x - a.position.x < 200.0);
        assert_eq!(a.position.y, 500.0);
        assert_eq!(b.position.y, 500.0);
    }
}

#[test]
fn executors_agree_bit_for_bit() {
    let settings = SimulationSettings::default();
    let points = disk(2000, 99);

    let mut reference =
        BarnesHutSimulation::new(points.clone(), SemiImplicitEuler, settings.clone());
    for _ in 0..3 {
        reference.step().unwrap();
    }

    for (workers, chunk) in [(1, 10), (2, 1), (4, 7), (4, 256)] {
        let mut pooled = BarnesHutPoolSimulation::new(
            points.clone(),
            SemiImplicitEuler,
            settings.clone(),
            workers,
        )
        .unwrap()
        .with_chunk(chunk);
        for _ in 0..3 {
            pooled.step().unwrap();
        }
        assert_eq!(
            reference.get_points(),
            pooled.get_points(),
            "workers={workers} chunk={chunk}"
        );
    }
}

#[test]
fn rerunning_forces_is_stable() {
    let points = disk(1000, 3);
    let mut sim =
        BarnesHutPoolSimulation::new(points, SemiImplicitEuler, SimulationSettings::default(), 4)
            .unwrap();
    sim.update_forces().unwrap();
    let first: Vec<Vec2> = sim.get_points().iter().map(|p| *p.force()).collect();
    sim.update_forces().unwrap();
    let second: Vec<Vec2> = sim.get_points().iter().map(|p| *p.force()).collect();
    assert_eq!(first, second);
}

// ==================================================================================
// Degenerate input
// ==================================================================================

#[test]
fn coincident_particles_abort_the_tick() {
    let points = vec![
        particle(250.0, 250.0, 200.0),
        particle(750.0, 750.0, 250.0),
        particle(250.0, 250.0, 300.0),
    ];

    let mut sequential =
        BarnesHutSimulation::new(points.clone(), SemiImplicitEuler, SimulationSettings::default());
    match sequential.step() {
        Err(SimError::MaxDepthExceeded { depth, index, x, y }) => {
            assert_eq!(depth, 40);
            assert_eq!(index, 2);
            assert_eq!((x, y), (250.0, 250.0));
        }
        other => panic!("expected depth error, got {other:?}"),
    }
    // Nothing was integrated.
    assert_eq!(sequential.get_points(), points.as_slice());

    let mut pooled =
        BarnesHutPoolSimulation::new(points, SemiImplicitEuler, SimulationSettings::default(), 2)
            .unwrap();
    assert!(matches!(
        pooled.step(),
        Err(SimError::MaxDepthExceeded { .. })
    ));
}

#[test]
fn shallow_depth_limit_rejects_close_pairs() {
    let points = vec![particle(100.0, 100.0, 1.0), particle(100.001, 100.0, 1.0)];
    let settings = SimulationSettings {
        max_depth: 8,
        ..Default::default()
    };
    assert!(matches!(
        QuadTree::build(&points, &settings),
        Err(SimError::MaxDepthExceeded { depth: 8, .. })
    ));

    // The default limit resolves them.
    let tree = QuadTree::build(&points, &SimulationSettings::default()).unwrap();
    assert_eq!(tree.leaves().count(), 2);
}
