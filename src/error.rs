use thiserror::Error;

/// Errors raised while configuring or stepping a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// A setting or run parameter is out of range. Rejected before any tick runs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Insertion needed to split a node that already sits at the depth limit.
    /// Happens when two particles are coincident (or closer than the
    /// resolution of `max_depth` halvings of the domain).
    #[error(
        "quadtree exceeded max depth {depth} inserting particle {index} at ({x}, {y}); \
         particles are coincident or nearly so"
    )]
    MaxDepthExceeded {
        depth: usize,
        index: usize,
        x: f64,
        y: f64,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("frame output failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
