//! Default starting point for the nonlinear fits.
//!
//! Amplitudes come from a non-negative least-squares fit of the raw basis
//! spectra to the data window. Lineshape, phase and baseline start at zero,
//! except the Voigt Gaussian term which starts slightly positive so its
//! derivative is not pinned at the bound.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::domain::NewtonConfig;
use crate::error::FitError;
use crate::math::solve_nnls;
use crate::models::{SpectralModel, stack};

pub fn initial_guess(
    model: &SpectralModel<'_>,
    data: &[Complex64],
    config: &NewtonConfig,
) -> Result<Vec<f64>, FitError> {
    let layout = model.layout();
    let window = model.window();
    let k = window.len();
    let n_metabs = layout.n_metabs;

    let mut design = DMatrix::<f64>::zeros(2 * k, n_metabs);
    for (j, fid) in model.basis().fids().iter().enumerate() {
        let spec = model.transform().spectrum(fid);
        for (w, idx) in window.clone().enumerate() {
            design[(w, j)] = spec[idx].re;
            design[(k + w, j)] = spec[idx].im;
        }
    }
    let target: DVector<f64> = stack(data.iter().copied(), k);

    let amps = solve_nnls(&design, &target).ok_or(FitError::InitialGuessFailed)?;
    if amps.iter().any(|a| !a.is_finite()) {
        return Err(FitError::InitialGuessFailed);
    }

    let mut params = vec![0.0; layout.len()];
    params[layout.amplitudes()].copy_from_slice(amps.as_slice());
    for g in 0..layout.n_groups {
        if let Some(s) = layout.sigma(g) {
            params[s] = config.init_sigma;
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticSpec, singlet_basis, synthetic_from_basis};
    use crate::domain::{Acquisition, LineshapeModel, MetabGroups};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn recovers_amplitudes_of_undistorted_data() {
        let acq = Acquisition::new(2000.0, 123.2);
        let basis = singlet_basis(&["NAA", "Cr", "Cho"], 256, &acq).unwrap();
        let fid = synthetic_from_basis(
            &basis,
            &acq,
            &SyntheticSpec::new(vec![2.0, 1.0, 0.5]),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        let model = SpectralModel::new(
            &basis,
            &acq,
            MetabGroups::single(3),
            LineshapeModel::Voigt,
            None,
            (0.2, 4.2),
        )
        .unwrap();
        let data = model.data_window(&fid);
        let x0 = initial_guess(&model, &data, &NewtonConfig::default()).unwrap();
        assert!((x0[0] - 2.0).abs() < 1e-6);
        assert!((x0[1] - 1.0).abs() < 1e-6);
        assert!((x0[2] - 0.5).abs() < 1e-6);
        assert_eq!(x0[model.layout().sigma(0).unwrap()], 1.0);
    }
}
