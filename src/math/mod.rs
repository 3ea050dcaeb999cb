//! Mathematical utilities: least squares solvers and spectral transforms.

pub mod fft;
pub mod ols;

pub use fft::*;
pub use ols::*;
