//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - acquisition metadata, spectral axes and the basis set (`types`)
//! - the run configuration (`config`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
