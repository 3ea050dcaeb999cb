//! `mrs-fit` library crate.
//!
//! The binary (`mrsfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitting engines can be driven by other front ends (NIfTI tools, notebooks)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod logging;
pub mod math;
pub mod models;
pub mod quantify;
pub mod report;
pub mod volume;
