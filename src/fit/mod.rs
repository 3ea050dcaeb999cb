//! Per-voxel fitting.
//!
//! Responsibilities:
//!
//! - build the default starting point (`init`)
//! - least-squares fit with CRLB uncertainties (`newton`)
//! - posterior sampling (`mh`)
//! - collect the fit record and its quality metrics (`result`, `metrics`)

pub mod init;
pub mod metrics;
pub mod mh;
pub mod newton;
pub mod result;

pub use init::*;
pub use metrics::*;
pub use result::*;

use num_complex::Complex64;

use crate::domain::{Algorithm, FitConfig};
use crate::error::{ConfigError, FitError};
use crate::models::SpectralModel;

/// Fit one voxel with the engine selected in `config`.
///
/// `index` only feeds the sampler seed so results do not depend on which
/// worker ran the voxel.
pub fn fit_voxel(
    model: &SpectralModel<'_>,
    fid: &[Complex64],
    config: &FitConfig,
    x0: Option<&[f64]>,
    index: usize,
) -> Result<FitResult, FitError> {
    if fid.len() != model.basis().points() {
        return Err(FitError::Config(ConfigError::PointMismatch {
            basis: model.basis().points(),
            data: fid.len(),
        }));
    }
    match config.algorithm {
        Algorithm::Newton => newton::fit(model, fid, &config.newton, x0),
        Algorithm::Mh => mh::fit(
            model,
            fid,
            &config.newton,
            &config.mh,
            x0,
            mh::voxel_seed(config.mh.seed, index),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::singlet_basis;
    use crate::domain::{Acquisition, LineshapeModel, MetabGroups};

    #[test]
    fn fid_length_must_match_the_basis() {
        let acq = Acquisition::new(2000.0, 123.2);
        let basis = singlet_basis(&["NAA", "Cr"], 128, &acq).unwrap();
        let model =
            SpectralModel::new(&basis, &acq, MetabGroups::single(2), LineshapeModel::Lorentzian, None, (0.2, 4.2))
                .unwrap();
        let fid = vec![Complex64::new(0.0, 0.0); 64];
        for algorithm in [Algorithm::Newton, Algorithm::Mh] {
            let config = FitConfig {
                algorithm,
                ..FitConfig::default()
            };
            assert_eq!(
                fit_voxel(&model, &fid, &config, None, 0).unwrap_err(),
                FitError::Config(ConfigError::PointMismatch { basis: 128, data: 64 })
            );
        }
    }
}
