//! Data sources for the engines that do not come from disk.
//!
//! - synthetic voxels and toy basis sets (`synthetic`)
//! - synthetic phantom volumes for demos and tests (`phantom`)

pub mod phantom;
pub mod synthetic;

pub use phantom::*;
pub use synthetic::*;
