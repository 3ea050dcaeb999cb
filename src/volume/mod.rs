//! Volumetric fitting.
//!
//! - input containers and voxel indexing (`container`)
//! - the run state machine and worker pool (`orchestrator`)
//! - completed-voxel progress (`progress`)
//! - output volumes and result sinks (`output`)

pub mod container;
pub mod orchestrator;
pub mod output;
pub mod progress;

pub use container::*;
pub use orchestrator::*;
pub use output::*;
pub use progress::*;
