pub mod driver;
pub mod error;
pub mod force;
pub mod generator;
pub mod quadtree;
pub mod shared;
pub mod sim;
pub mod sink;

pub use error::SimError;
