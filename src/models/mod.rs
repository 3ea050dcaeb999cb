//! Spectral model definitions.
//!
//! - `layout`: where each parameter lives in the flat parameter vector
//! - `model`: prediction and analytic Jacobian over the fit window

pub mod layout;
pub mod model;

pub use layout::*;
pub use model::*;
