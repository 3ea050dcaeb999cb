//! Synthetic spectra generated from a basis set.
//!
//! Used by the demo binary and by tests that need spectra with known
//! parameters. The lineshape convention is the forward model's, so a spectrum
//! generated here is exactly representable by a fit.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use tracing::warn;
use num_complex::Complex64;

use crate::domain::{Acquisition, Basis, SpectralAxis, H2O_PPM};
use crate::error::ConfigError;

/// Intrinsic damping of the toy basis signals (1/s).
const BASIS_DAMPING: f64 = 5.0;

/// Singlet approximation of common brain metabolites: (ppm, protons).
fn singlet_table(name: &str) -> Option<&'static [(f64, f64)]> {
    let peaks: &'static [(f64, f64)] = match name {
        "NAA" => &[(2.008, 3.0)],
        "NAAG" => &[(2.042, 3.0)],
        "Cr" => &[(3.027, 3.0), (3.913, 2.0)],
        "PCr" => &[(3.029, 3.0), (3.930, 2.0)],
        "GPC" | "PCh" | "Cho" => &[(3.208, 9.0)],
        "Ins" => &[(3.522, 2.0), (3.614, 2.0), (4.054, 1.0), (3.269, 1.0)],
        "Glu" => &[(2.043, 1.0), (2.343, 2.0), (3.744, 1.0)],
        "Gln" => &[(2.129, 2.0), (2.447, 2.0), (3.753, 1.0)],
        "Lac" => &[(1.313, 3.0), (4.097, 1.0)],
        "Tau" => &[(3.247, 2.0), (3.421, 2.0)],
        "GABA" => &[(1.889, 2.0), (2.284, 2.0), (3.012, 2.0)],
        "Water" | "H2O" => &[(H2O_PPM, 2.0)],
        _ => return None,
    };
    Some(peaks)
}

/// Build a basis of damped singlets for the named metabolites.
pub fn singlet_basis(names: &[&str], points: usize, acq: &Acquisition) -> Result<Basis, ConfigError> {
    acq.validate()?;
    let axis = SpectralAxis::new(points, acq);
    let mut fids = Vec::with_capacity(names.len());
    for name in names {
        let peaks = singlet_table(name).ok_or_else(|| ConfigError::InvalidSetting {
            name: "basis",
            reason: format!("no singlet model for metabolite '{name}'"),
        })?;
        fids.push(singlet_fid(peaks, &axis, acq.central_frequency));
    }
    Basis::new(
        names.iter().map(|n| n.to_string()).collect(),
        fids,
        acq.bandwidth,
    )
}

/// Damped sum of complex exponentials at the given (ppm, weight) pairs.
pub fn singlet_fid(peaks: &[(f64, f64)], axis: &SpectralAxis, central_frequency: f64) -> Vec<Complex64> {
    axis.time
        .iter()
        .map(|&t| {
            peaks
                .iter()
                .map(|&(ppm, weight)| {
                    let hz = (ppm - H2O_PPM) * central_frequency;
                    Complex64::from_polar(weight, 2.0 * std::f64::consts::PI * hz * t)
                })
                .sum::<Complex64>()
                * (-BASIS_DAMPING * t).exp()
        })
        .collect()
}

/// Typical in-vivo concentrations (mM) for common metabolites.
///
/// Metabolites without a tabulated value get a random concentration in
/// `[1, 5)`.
pub fn standard_concentrations<R: Rng + ?Sized>(names: &[String], rng: &mut R) -> Vec<f64> {
    names
        .iter()
        .map(|name| match name.as_str() {
            "Ala" => 0.60,
            "Asc" => 1.20,
            "Asp" => 2.40,
            "Cr" => 4.87,
            "GABA" => 1.20,
            "Glc" => 1.20,
            "Gln" => 3.37,
            "Glu" => 12.41,
            "GPC" => 0.74,
            "GSH" => 1.20,
            "Gly" => 1.20,
            "Ins" => 7.72,
            "Lac" => 0.60,
            "NAA" => 13.80,
            "NAAG" => 1.20,
            "PCho" | "PCh" => 0.85,
            "PCr" => 4.87,
            "PE" => 1.80,
            "sIns" | "Scyllo" => 0.30,
            "Tau" => 1.80,
            other => {
                warn!("{other} has no standard concentration, drawing one in [1, 5)");
                rng.gen_range(1.0..5.0)
            }
        })
        .collect()
}

/// Parameters of a synthetic voxel.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    /// One amplitude per basis signal.
    pub concentrations: Vec<f64>,
    /// `(gamma, sigma)` per basis signal, applied as `exp(-gamma t - sigma t^2)`.
    /// `sigma` is the linear coefficient of `t^2`: a Gaussian width `s` written
    /// as `exp(-s^2 t^2)` is passed as `s * s`.
    pub broadening: Vec<(f64, f64)>,
    /// Frequency shift (rad/s) per basis signal.
    pub shifts: Vec<f64>,
    /// Zero-order phase (rad) applied to the whole FID.
    pub phase0: f64,
    /// Standard deviation of the real and imaginary time-domain noise.
    pub noise_sd: f64,
}

impl SyntheticSpec {
    /// Undistorted, noiseless signal with the given amplitudes.
    pub fn new(concentrations: Vec<f64>) -> Self {
        let n = concentrations.len();
        Self {
            concentrations,
            broadening: vec![(0.0, 0.0); n],
            shifts: vec![0.0; n],
            phase0: 0.0,
            noise_sd: 0.0,
        }
    }

    pub fn with_broadening(mut self, gamma: f64, sigma: f64) -> Self {
        self.broadening = vec![(gamma, sigma); self.concentrations.len()];
        self
    }

    pub fn with_shift(mut self, eps: f64) -> Self {
        self.shifts = vec![eps; self.concentrations.len()];
        self
    }

    pub fn with_noise(mut self, noise_sd: f64) -> Self {
        self.noise_sd = noise_sd;
        self
    }
}

/// Generate one FID from `basis` following `spec`.
pub fn synthetic_from_basis<R: Rng + ?Sized>(
    basis: &Basis,
    acq: &Acquisition,
    spec: &SyntheticSpec,
    rng: &mut R,
) -> Result<Vec<Complex64>, ConfigError> {
    let n_metabs = basis.len();
    if spec.concentrations.len() != n_metabs
        || spec.broadening.len() != n_metabs
        || spec.shifts.len() != n_metabs
    {
        return Err(ConfigError::ShapeMismatch {
            what: "synthetic parameters",
            got: vec![
                spec.concentrations.len(),
                spec.broadening.len(),
                spec.shifts.len(),
            ],
            expected: vec![n_metabs; 3],
        });
    }
    if !(spec.noise_sd.is_finite() && spec.noise_sd >= 0.0) {
        return Err(ConfigError::InvalidSetting {
            name: "noise_sd",
            reason: format!("must be finite and >= 0, got {}", spec.noise_sd),
        });
    }
    basis.check_matches(basis.points(), acq)?;

    let axis = SpectralAxis::new(basis.points(), acq);
    let mut fid = vec![Complex64::new(0.0, 0.0); basis.points()];
    for (j, basis_fid) in basis.fids().iter().enumerate() {
        let c = spec.concentrations[j];
        let (gamma, sigma) = spec.broadening[j];
        let eps = spec.shifts[j];
        for ((f, b), &t) in fid.iter_mut().zip(basis_fid).zip(&axis.time) {
            let shape = (-(Complex64::new(gamma, eps) * t) - sigma * t * t).exp();
            *f += b * shape * c;
        }
    }

    let rotation = Complex64::from_polar(1.0, spec.phase0);
    for f in fid.iter_mut() {
        *f *= rotation;
    }

    if spec.noise_sd > 0.0 {
        let normal = Normal::new(0.0, spec.noise_sd).map_err(|e| ConfigError::InvalidSetting {
            name: "noise_sd",
            reason: e.to_string(),
        })?;
        for f in fid.iter_mut() {
            *f += Complex64::new(normal.sample(rng), normal.sample(rng));
        }
    }

    Ok(fid)
}

/// Generate the same voxel as seen by several receive coils.
///
/// Each `(amplitude, phase)` pair scales and rotates the noiseless signal.
/// Noise is drawn jointly across coils from `noise_covariance`
/// (`coils.len()` square, symmetric positive definite), separately for the
/// real and imaginary parts. Without a covariance every coil gets independent
/// noise of standard deviation `spec.noise_sd`.
pub fn synthetic_coils<R: Rng + ?Sized>(
    basis: &Basis,
    acq: &Acquisition,
    spec: &SyntheticSpec,
    coils: &[(f64, f64)],
    noise_covariance: Option<&DMatrix<f64>>,
    rng: &mut R,
) -> Result<Vec<Vec<Complex64>>, ConfigError> {
    let n = coils.len();
    let factor = match noise_covariance {
        Some(cov) => Some(noise_factor(cov, n)?),
        None if !(spec.noise_sd.is_finite() && spec.noise_sd >= 0.0) => {
            return Err(ConfigError::InvalidSetting {
                name: "noise_sd",
                reason: format!("must be finite and >= 0, got {}", spec.noise_sd),
            });
        }
        None if spec.noise_sd > 0.0 => Some(DMatrix::identity(n, n) * spec.noise_sd),
        None => None,
    };

    let clean = SyntheticSpec {
        noise_sd: 0.0,
        ..spec.clone()
    };
    let signal = synthetic_from_basis(basis, acq, &clean, rng)?;
    let mut fids: Vec<Vec<Complex64>> = coils
        .iter()
        .map(|&(amplitude, phase)| {
            let gain = Complex64::from_polar(amplitude, phase);
            signal.iter().map(|s| s * gain).collect()
        })
        .collect();

    if let Some(l) = factor {
        for t in 0..signal.len() {
            let re = &l * DVector::<f64>::from_fn(n, |_, _| StandardNormal.sample(rng));
            let im = &l * DVector::<f64>::from_fn(n, |_, _| StandardNormal.sample(rng));
            for (c, fid) in fids.iter_mut().enumerate() {
                fid[t] += Complex64::new(re[c], im[c]);
            }
        }
    }
    Ok(fids)
}

/// Lower Cholesky factor of a coil noise covariance.
fn noise_factor(cov: &DMatrix<f64>, coils: usize) -> Result<DMatrix<f64>, ConfigError> {
    if cov.shape() != (coils, coils) {
        return Err(ConfigError::ShapeMismatch {
            what: "noise covariance",
            got: vec![cov.nrows(), cov.ncols()],
            expected: vec![coils, coils],
        });
    }
    let not_pd = || ConfigError::InvalidSetting {
        name: "noise_covariance",
        reason: "must be finite, symmetric and positive definite".into(),
    };
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(not_pd());
    }
    let asymmetry = (cov - cov.transpose()).amax();
    if asymmetry > 1e-12 * cov.amax().max(1.0) {
        return Err(not_pd());
    }
    cov.clone().cholesky().map(|c| c.l()).ok_or_else(not_pd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn acq() -> Acquisition {
        Acquisition::new(2000.0, 123.2)
    }

    #[test]
    fn singlet_basis_knows_common_names() {
        let basis = singlet_basis(&["NAA", "Cr", "PCr"], 128, &acq()).unwrap();
        assert_eq!(basis.len(), 3);
        assert_eq!(basis.points(), 128);
        assert!(singlet_basis(&["Unobtainium"], 128, &acq()).is_err());
    }

    #[test]
    fn standard_concentrations_fill_unknowns_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let names = vec!["NAA".to_string(), "Mystery".to_string()];
        let concs = standard_concentrations(&names, &mut rng);
        assert_eq!(concs[0], 13.80);
        assert!((1.0..5.0).contains(&concs[1]));
    }

    #[test]
    fn noiseless_synthetic_is_linear_in_concentration() {
        let basis = singlet_basis(&["NAA", "Cr"], 128, &acq()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let one = synthetic_from_basis(&basis, &acq(), &SyntheticSpec::new(vec![1.0, 0.0]), &mut rng)
            .unwrap();
        let three =
            synthetic_from_basis(&basis, &acq(), &SyntheticSpec::new(vec![3.0, 0.0]), &mut rng)
                .unwrap();
        for (a, b) in one.iter().zip(&three) {
            assert!((a * 3.0 - b).norm() < 1e-12);
        }
    }

    #[test]
    fn noise_is_seeded() {
        let basis = singlet_basis(&["NAA"], 64, &acq()).unwrap();
        let spec = SyntheticSpec::new(vec![1.0]).with_noise(0.1);
        let a = synthetic_from_basis(&basis, &acq(), &spec, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = synthetic_from_basis(&basis, &acq(), &spec, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn coils_scale_and_rotate_the_signal() {
        let basis = singlet_basis(&["NAA"], 64, &acq()).unwrap();
        let spec = SyntheticSpec::new(vec![1.0]);
        let mut rng = StdRng::seed_from_u64(5);
        let single = synthetic_from_basis(&basis, &acq(), &spec, &mut rng).unwrap();
        let coils = synthetic_coils(
            &basis,
            &acq(),
            &spec,
            &[(1.0, 0.0), (2.0, std::f64::consts::FRAC_PI_2)],
            None,
            &mut rng,
        )
        .unwrap();
        assert_eq!(coils.len(), 2);
        for ((s, c0), c1) in single.iter().zip(&coils[0]).zip(&coils[1]) {
            assert!((s - c0).norm() < 1e-12);
            assert!((s * Complex64::new(0.0, 2.0) - c1).norm() < 1e-12);
        }
    }

    #[test]
    fn mismatched_parameter_lengths_are_rejected() {
        let basis = singlet_basis(&["NAA", "Cr"], 64, &acq()).unwrap();
        let spec = SyntheticSpec::new(vec![1.0]);
        let err = synthetic_from_basis(&basis, &acq(), &spec, &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(ConfigError::ShapeMismatch { .. })));
    }

    #[test]
    fn coil_noise_follows_the_covariance() {
        let basis = singlet_basis(&["NAA"], 4096, &acq()).unwrap();
        let spec = SyntheticSpec::new(vec![0.0]);
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 0.9, 0.9, 4.0]);
        let coils = [(1.0, 0.0), (1.0, 0.0)];
        let draw = |seed| {
            synthetic_coils(&basis, &acq(), &spec, &coils, Some(&cov), &mut StdRng::seed_from_u64(seed))
                .unwrap()
        };
        let fids = draw(11);
        assert_eq!(fids, draw(11));

        let n = 2.0 * 4096.0;
        let parts = |fid: &[Complex64]| -> Vec<f64> { fid.iter().flat_map(|v| [v.re, v.im]).collect() };
        let (a, b) = (parts(&fids[0]), parts(&fids[1]));
        let var_a = a.iter().map(|x| x * x).sum::<f64>() / n;
        let var_b = b.iter().map(|x| x * x).sum::<f64>() / n;
        let cross = a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>() / n;
        assert!((var_a - 1.0).abs() < 0.1, "var_a {var_a}");
        assert!((var_b - 4.0).abs() < 0.4, "var_b {var_b}");
        assert!((cross - 0.9).abs() < 0.1, "cross {cross}");
    }

    #[test]
    fn coil_covariance_must_match_and_be_positive_definite() {
        let basis = singlet_basis(&["NAA"], 64, &acq()).unwrap();
        let spec = SyntheticSpec::new(vec![1.0]);
        let coils = [(1.0, 0.0), (0.5, 1.0)];
        let mut rng = StdRng::seed_from_u64(0);

        let wrong_shape = DMatrix::identity(3, 3);
        let err = synthetic_coils(&basis, &acq(), &spec, &coils, Some(&wrong_shape), &mut rng);
        assert!(matches!(err, Err(ConfigError::ShapeMismatch { what: "noise covariance", .. })));

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let err = synthetic_coils(&basis, &acq(), &spec, &coils, Some(&indefinite), &mut rng);
        assert!(matches!(err, Err(ConfigError::InvalidSetting { name: "noise_covariance", .. })));

        let asymmetric = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 1.0]);
        let err = synthetic_coils(&basis, &acq(), &spec, &coils, Some(&asymmetric), &mut rng);
        assert!(matches!(err, Err(ConfigError::InvalidSetting { name: "noise_covariance", .. })));
    }

    #[test]
    fn gaussian_width_is_the_linear_t_squared_coefficient() {
        let basis = singlet_basis(&["NAA"], 64, &acq()).unwrap();
        let axis = SpectralAxis::new(64, &acq());
        let mut rng = StdRng::seed_from_u64(0);
        let plain = synthetic_from_basis(&basis, &acq(), &SyntheticSpec::new(vec![1.0]), &mut rng).unwrap();
        let s = 30.0;
        let spec = SyntheticSpec::new(vec![1.0]).with_broadening(0.0, s * s);
        let broadened = synthetic_from_basis(&basis, &acq(), &spec, &mut rng).unwrap();
        for ((p, b), &t) in plain.iter().zip(&broadened).zip(&axis.time) {
            assert!((p * (-(s * t).powi(2)).exp() - b).norm() < 1e-12);
        }
    }
}
