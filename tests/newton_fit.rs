//! Integration tests for single-voxel fitting with the Newton engine.

use approx::assert_abs_diff_eq;
use mrs_fit::data::{SyntheticSpec, singlet_basis, synthetic_from_basis};
use mrs_fit::domain::{Acquisition, Basis, LineshapeModel, MetabGroups, NewtonConfig, Scaling};
use mrs_fit::fit::newton;
use mrs_fit::models::SpectralModel;
use mrs_fit::quantify::scale;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn acq() -> Acquisition {
    Acquisition::new(2000.0, 123.2)
}

fn model<'a>(basis: &'a Basis, lineshape: LineshapeModel, baseline: Option<usize>) -> SpectralModel<'a> {
    SpectralModel::new(
        basis,
        &acq(),
        MetabGroups::single(basis.len()),
        lineshape,
        baseline,
        (0.2, 4.2),
    )
    .unwrap()
}

/// NAA + Cr at unit amplitude, one lineshape group, no baseline, no noise.
#[test]
fn naa_cr_unit_amplitudes() {
    let basis = singlet_basis(&["NAA", "Cr"], 512, &acq()).unwrap();
    let groups = MetabGroups::new(&[0, 0], 2).unwrap();
    let model = SpectralModel::new(&basis, &acq(), groups, LineshapeModel::Lorentzian, None, (0.2, 4.2))
        .unwrap();
    let spec = SyntheticSpec::new(vec![1.0, 1.0]).with_broadening(4.0, 0.0);
    let fid = synthetic_from_basis(&basis, &acq(), &spec, &mut StdRng::seed_from_u64(0)).unwrap();

    let mut result = newton::fit(&model, &fid, &NewtonConfig::default(), None).unwrap();
    assert!(result.convergence.converged);
    assert_abs_diff_eq!(result.amplitudes()[0], 1.0, epsilon = 1e-3);
    assert_abs_diff_eq!(result.amplitudes()[1], 1.0, epsilon = 1e-3);

    let energy: f64 = model.data_window(&fid).iter().map(|v| v.norm_sqr()).sum();
    assert!(result.cost / energy < 1e-6, "relative cost {}", result.cost / energy);

    scale(&mut result, &model, None, None, &["Cr".to_string()]).unwrap();
    assert_abs_diff_eq!(
        result.concentration("NAA", Scaling::Internal).unwrap(),
        1.0,
        epsilon = 1e-3
    );
    assert!(!result.has_scaling(Scaling::Molarity));
}

/// Zero-noise data is recovered with a Voigt lineshape and a baseline.
#[test]
fn voigt_round_trip_with_baseline() {
    let basis = singlet_basis(&["NAA", "Cr", "Cho"], 512, &acq()).unwrap();
    let model = model(&basis, LineshapeModel::Voigt, Some(1));
    let spec = SyntheticSpec::new(vec![4.0, 2.5, 1.5])
        .with_broadening(6.0, 40.0)
        .with_shift(10.0);
    let fid = synthetic_from_basis(&basis, &acq(), &spec, &mut StdRng::seed_from_u64(0)).unwrap();

    let result = newton::fit(&model, &fid, &NewtonConfig::default(), None).unwrap();
    let layout = model.layout();
    for (got, want) in result.amplitudes().iter().zip([4.0, 2.5, 1.5]) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-2);
    }
    assert_abs_diff_eq!(result.params[layout.eps(0)], 10.0, epsilon = 1e-1);
    for &b in &result.params[layout.baseline()] {
        assert!(b.abs() < 1e-2, "baseline coefficient {b}");
    }
}

/// Percent SD of every amplitude grows with the noise level.
#[test]
fn percent_sd_grows_with_noise() {
    let basis = singlet_basis(&["NAA", "Cr"], 512, &acq()).unwrap();
    let model = model(&basis, LineshapeModel::Lorentzian, None);

    let mut previous = [0.0_f64; 2];
    for noise in [0.2, 1.0, 5.0] {
        let spec = SyntheticSpec::new(vec![2.0, 1.0])
            .with_broadening(8.0, 0.0)
            .with_noise(noise);
        let fid = synthetic_from_basis(&basis, &acq(), &spec, &mut StdRng::seed_from_u64(21)).unwrap();
        let result = newton::fit(&model, &fid, &NewtonConfig::default(), None).unwrap();
        for (j, name) in ["NAA", "Cr"].iter().enumerate() {
            let p = result.percent_sd(name, Scaling::Raw).unwrap();
            assert!(p > previous[j], "{name}: {p} <= {}", previous[j]);
            previous[j] = p;
        }
    }
}

/// Starting from a nearby `x0` lands on the same solution as the default start.
#[test]
fn x0_start_matches_default_start() {
    let basis = singlet_basis(&["NAA", "Cr"], 256, &acq()).unwrap();
    let model = model(&basis, LineshapeModel::Lorentzian, None);
    let spec = SyntheticSpec::new(vec![3.0, 1.0]).with_broadening(10.0, 0.0);
    let fid = synthetic_from_basis(&basis, &acq(), &spec, &mut StdRng::seed_from_u64(0)).unwrap();

    let default = newton::fit(&model, &fid, &NewtonConfig::default(), None).unwrap();
    let mut x0 = default.params.clone();
    x0[0] *= 1.2;
    x0[1] *= 0.8;
    let warm = newton::fit(&model, &fid, &NewtonConfig::default(), Some(&x0)).unwrap();
    for (a, b) in default.amplitudes().iter().zip(warm.amplitudes()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
    }
}
