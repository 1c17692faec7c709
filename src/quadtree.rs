//! Arena-backed quadtree rebuilt from particle positions every tick.
//!
//! Nodes live contiguously in a `Vec` and refer to their children by index.
//! The tree only borrows the particle slice, so it has to be dropped before
//! the particles are advanced; [`QuadTree::into_arena`] hands the node storage
//! back so the next tick can reuse the allocation.

use std::fmt;

use crate::{
    error::{Result, SimError},
    shared::{Bounds, Particle, Quadrant, SimulationSettings, Vec2},
};

pub type NodeIndex = usize;

pub const ROOT: NodeIndex = 0;

#[derive(Clone, Debug)]
pub struct QuadNode {
    pub bounds: Bounds,
    /// Opening-angle size. Shrinks by four per level while the half-width
    /// shrinks by two, so it is not a geometric width below the root.
    pub size_metric: f64,
    /// Total mass of every particle inserted at or below this node.
    pub mass: f64,
    occupant: Option<usize>,
    children: Option<[NodeIndex; 4]>,
}

impl QuadNode {
    fn new(bounds: Bounds, size_metric: f64) -> Self {
        Self {
            bounds,
            size_metric,
            mass: 0.0,
            occupant: None,
            children: None,
        }
    }

    pub fn occupant(&self) -> Option<usize> {
        self.occupant
    }

    pub fn children(&self) -> Option<&[NodeIndex; 4]> {
        self.children.as_ref()
    }

    pub fn is_divided(&self) -> bool {
        self.children.is_some()
    }

    /// Neither an occupant nor children: the next insert lands here directly.
    pub fn is_untouched(&self) -> bool {
        self.occupant.is_none() && self.children.is_none()
    }
}

pub struct QuadTree<'a, P: Particle> {
    pub(crate) particles: &'a [P],
    pub(crate) nodes: Vec<QuadNode>,
    max_depth: usize,
    escaped: usize,
}

impl<'a, P: Particle> QuadTree<'a, P> {
    /// Creates a tree holding only an empty root over the settings' domain.
    pub fn new(particles: &'a [P], settings: &SimulationSettings) -> Self {
        Self::with_arena(Vec::new(), particles, settings)
    }

    fn with_arena(
        mut arena: Vec<QuadNode>,
        particles: &'a [P],
        settings: &SimulationSettings,
    ) -> Self {
        arena.clear();
        let mut tree = Self {
            particles,
            nodes: arena,
            max_depth: settings.max_depth,
            escaped: 0,
        };
        let root = settings.root_bounds();
        tree.create_node(root.center, settings.root_size_metric, root.half_width);
        tree
    }

    /// Builds the full tree, inserting particles in slice order.
    pub fn build(particles: &'a [P], settings: &SimulationSettings) -> Result<Self> {
        Self::build_in(Vec::new(), particles, settings)
    }

    /// Same as [`QuadTree::build`] but reuses `arena` for node storage.
    pub fn build_in(
        arena: Vec<QuadNode>,
        particles: &'a [P],
        settings: &SimulationSettings,
    ) -> Result<Self> {
        settings.validate_max_depth()?;
        let mut tree = Self::with_arena(arena, particles, settings);
        for index in 0..particles.len() {
            tree.insert(index)?;
        }
        Ok(tree)
    }

    pub fn into_arena(self) -> Vec<QuadNode> {
        self.nodes
    }

    pub fn create_node(&mut self, center: Vec2, size_metric: f64, half_width: f64) -> NodeIndex {
        self.nodes
            .push(QuadNode::new(Bounds::new(center, half_width), size_metric));
        self.nodes.len() - 1
    }

    /// Splits `node` into NW, NE, SW, SE children. No-op if already divided.
    pub fn subdivide(&mut self, node: NodeIndex) {
        if self.nodes[node].is_divided() {
            return;
        }
        let bounds = self.nodes[node].bounds;
        let size_metric = self.nodes[node].size_metric / 4.0;
        let children = Quadrant::ALL.map(|quadrant| {
            let child = bounds.create_quadrant(quadrant);
            self.create_node(child.center, size_metric, child.half_width)
        });
        self.nodes[node].children = Some(children);
    }

    pub fn contains(&self, node: NodeIndex, position: &Vec2) -> bool {
        self.nodes[node].bounds.contains(position)
    }

    /// Inserts particle `index` starting at the root.
    ///
    /// A particle outside the root square is never placed in a node, but its
    /// mass still counts towards the root so the root always carries the total.
    /// The root is split at that point so it can no longer be a leaf whose
    /// mass differs from its occupant's.
    pub fn insert(&mut self, index: usize) -> Result<()> {
        let particles = self.particles;
        let particle = &particles[index];
        if !self.contains(ROOT, particle.position()) {
            log::debug!(
                "particle {index} at {:?} is outside the domain; counted at root only",
                particle.position().as_slice()
            );
            self.subdivide(ROOT);
            if let Some(existing) = self.nodes[ROOT].occupant.take() {
                self.push_down(ROOT, existing, 0)?;
            }
            self.nodes[ROOT].mass += particle.get_mass();
            self.escaped += 1;
            return Ok(());
        }
        self.insert_at(ROOT, index, 0)
    }

    fn insert_at(&mut self, node: NodeIndex, index: usize, depth: usize) -> Result<()> {
        let mass = self.particles[index].get_mass();

        if self.nodes[node].is_untouched() {
            // Root mass may already hold escaped particles, hence `+=`.
            self.nodes[node].occupant = Some(index);
            self.nodes[node].mass += mass;
            return Ok(());
        }

        if !self.nodes[node].is_divided() {
            if depth >= self.max_depth {
                let position = self.particles[index].position();
                return Err(SimError::MaxDepthExceeded {
                    depth,
                    index,
                    x: position.x,
                    y: position.y,
                });
            }
            self.subdivide(node);
        }

        if let Some(existing) = self.nodes[node].occupant.take() {
            self.push_down(node, existing, depth)?;
        }
        self.push_down(node, index, depth)?;
        self.nodes[node].mass += mass;
        Ok(())
    }

    fn push_down(&mut self, node: NodeIndex, index: usize, depth: usize) -> Result<()> {
        match self.child_containing(node, index) {
            Some(child) => self.insert_at(child, index, depth + 1),
            None => {
                // Only reachable when rounding leaves a gap between siblings.
                log::debug!("particle {index} fell between the children of node {node}");
                self.escaped += 1;
                Ok(())
            }
        }
    }

    /// First child, in NW, NE, SW, SE order, whose square contains the particle.
    fn child_containing(&self, node: NodeIndex, index: usize) -> Option<NodeIndex> {
        let position = self.particles[index].position();
        self.nodes[node]
            .children?
            .into_iter()
            .find(|&child| self.contains(child, position))
    }

    pub fn node(&self, index: NodeIndex) -> &QuadNode {
        &self.nodes[index]
    }

    pub fn root(&self) -> &QuadNode {
        &self.nodes[ROOT]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Particles that fell outside the root square (or between sibling
    /// squares through rounding) during this build.
    pub fn escaped(&self) -> usize {
        self.escaped
    }

    pub fn depth(&self) -> usize {
        self.iter().map(|(depth, _)| depth).max().unwrap_or(0)
    }

    /// Nodes that currently hold an occupant.
    pub fn leaves(&self) -> impl Iterator<Item = &QuadNode> {
        self.nodes.iter().filter(|n| n.occupant.is_some())
    }

    /// Breadth-first walk yielding `(depth, node)`.
    pub fn iter(&self) -> NodeIterator<'_, 'a, P> {
        NodeIterator {
            tree: self,
            current: vec![ROOT],
            next: Vec::new(),
            current_index: 0,
            current_depth: 0,
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, node: NodeIndex, depth: usize) -> fmt::Result {
        let n = &self.nodes[node];
        let indent = depth * 4;
        match n.occupant {
            Some(index) => {
                let p = self.particles[index].position();
                writeln!(f, "{:indent$}Leaf {:.1} @ {:.1} {:.1}", "", n.mass, p.x, p.y)
            }
            None => {
                writeln!(
                    f,
                    "{:indent$}Node {:.1} @ {:.1} {:.1}",
                    "", n.mass, n.bounds.center.x, n.bounds.center.y
                )?;
                if let Some(children) = n.children {
                    for child in children {
                        self.fmt_node(f, child, depth + 1)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl<P: Particle> fmt::Display for QuadTree<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, ROOT, 0)
    }
}

pub struct NodeIterator<'t, 'a, P: Particle> {
    tree: &'t QuadTree<'a, P>,
    current: Vec<NodeIndex>,
    next: Vec<NodeIndex>,
    current_index: usize,
    current_depth: usize,
}

impl<'t, P: Particle> Iterator for NodeIterator<'t, '_, P> {
    type Item = (usize, &'t QuadNode);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index < self.current.len() {
            let node = &self.tree.nodes[self.current[self.current_index]];
            if let Some(children) = node.children {
                self.next.extend(children);
            }
            self.current_index += 1;
            Some((self.current_depth, node))
        } else if self.next.is_empty() {
            None
        } else {
            std::mem::swap(&mut self.current, &mut self.next);
            self.next.clear();
            self.current_index = 0;
            self.current_depth += 1;
            self.next()
        }
    }
}
