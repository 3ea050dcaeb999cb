//! FID ↔ spectrum transforms.
//!
//! Spectra are always `fftshift(fft(fid))` so that the zero-frequency bin sits
//! at index `n / 2`, matching [`crate::domain::SpectralAxis`].

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// A planned forward transform for one FID length.
///
/// The plan is immutable and `Send + Sync`, so a single instance can be
/// shared by every worker fitting voxels of the same dataset.
#[derive(Clone)]
pub struct SpectrumTransform {
    fft: Arc<dyn Fft<f64>>,
    len: usize,
}

impl std::fmt::Debug for SpectrumTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumTransform").field("len", &self.len).finish()
    }
}

impl SpectrumTransform {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        Self { fft, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Transform `buf` in place into a shifted spectrum.
    ///
    /// # Panics
    /// Panics if `buf.len()` differs from the planned length.
    pub fn forward_in_place(&self, buf: &mut [Complex64]) {
        assert_eq!(buf.len(), self.len, "FFT buffer length mismatch");
        self.fft.process(buf);
        buf.rotate_right(self.len / 2);
    }

    /// Shifted spectrum of `fid`.
    pub fn spectrum(&self, fid: &[Complex64]) -> Vec<Complex64> {
        let mut buf = fid.to_vec();
        self.forward_in_place(&mut buf);
        buf
    }
}

/// One-shot helper for callers that transform a single FID.
pub fn fid_to_spectrum(fid: &[Complex64]) -> Vec<Complex64> {
    SpectrumTransform::new(fid.len()).spectrum(fid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn complex_exponential_lands_on_its_bin() {
        let n = 64;
        let bin: isize = -5;
        let fid: Vec<Complex64> = (0..n)
            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * bin as f64 * k as f64 / n as f64))
            .collect();
        let spec = fid_to_spectrum(&fid);
        let peak = spec
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak as isize - (n / 2) as isize, bin);
        assert!((spec[peak].re - n as f64).abs() < 1e-9);
    }

    #[test]
    fn odd_lengths_center_dc() {
        let fid = vec![Complex64::new(1.0, 0.0); 7];
        let spec = fid_to_spectrum(&fid);
        assert!((spec[3].re - 7.0).abs() < 1e-12);
    }
}
