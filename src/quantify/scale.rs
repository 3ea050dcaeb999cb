//! Turning fitted amplitudes into concentrations.
//!
//! Each scaling is stored on the `FitResult` as one factor per basis
//! metabolite, so combined entries and their uncertainties follow from the
//! same factors.

use num_complex::Complex64;
use tracing::warn;

use crate::domain::{Basis, Scaling};
use crate::error::{ConfigError, QuantifyError};
use crate::fit::FitResult;
use crate::models::SpectralModel;
use crate::quantify::info::{H2O_PROTONS, QuantificationInfo};

/// Basis indices of the internal reference metabolites that exist in the
/// basis. None present is a configuration error.
pub fn resolve_internal_refs(basis: &Basis, refs: &[String]) -> Result<Vec<usize>, ConfigError> {
    let found: Vec<usize> = refs.iter().filter_map(|r| basis.index_of(r)).collect();
    if found.is_empty() {
        return Err(ConfigError::NoInternalReference(refs.to_vec()));
    }
    Ok(found)
}

/// Add internal and, when possible, absolute scalings to `result`.
///
/// Missing echo/repetition times or a missing water signal only skip the
/// absolute scalings, with a warning.
pub fn scale(
    result: &mut FitResult,
    model: &SpectralModel<'_>,
    water: Option<&[Complex64]>,
    info: Option<&QuantificationInfo>,
    internal_refs: &[String],
) -> Result<(), QuantifyError> {
    let refs = resolve_internal_refs(model.basis(), internal_refs)?;
    scale_internal(result, &refs);

    let Some(info) = info else {
        return Ok(());
    };
    if info.timing().is_none() {
        warn!("echo or repetition time missing, skipping absolute quantification");
        return Ok(());
    }
    let Some(water) = water else {
        warn!("no water reference, skipping absolute quantification");
        return Ok(());
    };
    if water.len() != model.basis().points() {
        return Err(ConfigError::ShapeMismatch {
            what: "water reference",
            got: vec![water.len()],
            expected: vec![model.basis().points()],
        }
        .into());
    }
    scale_absolute(result, model, water, info);
    Ok(())
}

fn scale_internal(result: &mut FitResult, refs: &[usize]) {
    let total: f64 = refs.iter().map(|&i| result.params[i]).sum();
    if !(total.is_finite() && total > 0.0) {
        warn!(total, "internal reference amplitude is not positive, skipping internal scaling");
        return;
    }
    let n = result.metabolites.len();
    result.set_factors(Scaling::Internal, vec![1.0 / total; n]);
}

/// Sum of magnitudes of `spectrum` between two ppm limits.
pub fn integrate(spectrum: &[Complex64], model: &SpectralModel<'_>, limits: (f64, f64)) -> f64 {
    let range = model.axis().ppm_range(limits.0, limits.1);
    spectrum[range].iter().map(|v| v.norm()).sum()
}

fn scale_absolute(
    result: &mut FitResult,
    model: &SpectralModel<'_>,
    water: &[Complex64],
    info: &QuantificationInfo,
) {
    let water_spec = model.transform().spectrum(water);
    let water_integral = integrate(&water_spec, model, info.water_limits);
    if !(water_integral.is_finite() && water_integral > 0.0) {
        warn!("water integral is not positive, skipping absolute quantification");
        return;
    }

    let ref_amp = result.params[info.ref_index];
    let ref_spec = model.metabolite_spectrum(&result.params, info.ref_index);
    let ref_integral = integrate(&ref_spec, model, info.ref_limits);
    if !(ref_amp > 0.0 && ref_integral > 0.0) {
        warn!(
            metabolite = %info.ref_metab,
            "water-reference metabolite has no signal, skipping absolute quantification"
        );
        return;
    }
    let per_proton = ref_integral / (ref_amp * info.ref_protons);

    let attenuation: Option<Vec<f64>> = result
        .metabolites
        .iter()
        .map(|name| info.metab_attenuation(name))
        .collect();
    let Some(attenuation) = attenuation else {
        return;
    };

    let factors_for = |water_conc: f64| -> Vec<f64> {
        attenuation
            .iter()
            .map(|r| {
                per_proton * (H2O_PROTONS * water_conc / water_integral) / r
                    * info.correction_factor
            })
            .collect()
    };

    if let Some(conc) = info.water_conc_molarity() {
        let factors = factors_for(conc);
        result.set_factors(Scaling::Molarity, factors);
    }
    if let Some(conc) = info.water_conc_molality() {
        let factors = factors_for(conc);
        result.set_factors(Scaling::Molality, factors);
    }
}
