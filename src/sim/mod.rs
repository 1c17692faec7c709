mod barnes_hut;
mod barnes_hut_pool;

pub use barnes_hut::*;
pub use barnes_hut_pool::*;
