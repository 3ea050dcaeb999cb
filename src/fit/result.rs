//! The record of one voxel's fit.
//!
//! A `FitResult` owns everything downstream stages need without going back
//! to the model: parameters and their covariance, the window prediction,
//! residual and baseline, per-metabolite quality metrics and convergence
//! information. Quantification adds per-scaling factors and combined entries
//! in place.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::Serialize;

use crate::domain::{Algorithm, Scaling};
use crate::fit::metrics::{fwhm_hz, percent_sd, snr};
use crate::models::{ParamLayout, SpectralModel};

/// A reported metabolite: one basis signal or a combination of several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetabEntry {
    pub name: String,
    /// Basis indices summed into this entry.
    pub members: Vec<usize>,
    /// Hidden entries stay addressable but are left out of reports and maps.
    pub hidden: bool,
}

/// How the engine finished.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Convergence {
    pub converged: bool,
    pub iterations: usize,
    /// Post-burn-in acceptance rate (sampler only).
    pub acceptance_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub algorithm: Algorithm,
    pub layout: ParamLayout,
    pub param_names: Vec<String>,
    pub params: Vec<f64>,
    pub covariance: DMatrix<f64>,
    /// Basis metabolite names, in basis order.
    pub metabolites: Vec<String>,
    pub entries: Vec<MetabEntry>,
    factors: BTreeMap<Scaling, Vec<f64>>,
    /// Window prediction, residual (`data - prediction`) and baseline.
    pub prediction: Vec<Complex64>,
    pub residual: Vec<Complex64>,
    pub baseline: Vec<Complex64>,
    /// Sum of squared real and imaginary residuals.
    pub cost: f64,
    /// Per basis metabolite.
    pub snr: Vec<f64>,
    /// Per basis metabolite, in Hz.
    pub fwhm: Vec<f64>,
    pub convergence: Convergence,
}

impl FitResult {
    /// Evaluate the model at `params` and collect the derived quantities.
    pub fn from_model(
        model: &SpectralModel<'_>,
        data: &[Complex64],
        params: Vec<f64>,
        covariance: DMatrix<f64>,
        algorithm: Algorithm,
        convergence: Convergence,
    ) -> Self {
        let layout = model.layout().clone();
        let metabolites = model.basis().names().to_vec();
        let param_names = layout.names(&metabolites);

        let prediction = model.predict(&params);
        let residual: Vec<Complex64> = data.iter().zip(&prediction).map(|(y, p)| y - p).collect();
        let baseline = model.baseline_curve(&params);
        let cost: f64 = residual.iter().map(|r| r.norm_sqr()).sum();

        let window = model.window();
        let frequency = &model.axis().frequency;
        let mut snrs = Vec::with_capacity(metabolites.len());
        let mut fwhms = Vec::with_capacity(metabolites.len());
        let mut unit = params.clone();
        for j in 0..metabolites.len() {
            let spec = model.metabolite_spectrum(&params, j);
            snrs.push(snr(&spec[window.clone()], &residual));

            // Linewidth does not depend on the amplitude.
            unit[j] = 1.0;
            let shape = model.metabolite_spectrum(&unit, j);
            unit[j] = params[j];
            fwhms.push(fwhm_hz(&shape, frequency));
        }

        let entries = metabolites
            .iter()
            .enumerate()
            .map(|(j, name)| MetabEntry {
                name: name.clone(),
                members: vec![j],
                hidden: false,
            })
            .collect();

        let mut factors = BTreeMap::new();
        factors.insert(Scaling::Raw, vec![1.0; metabolites.len()]);

        Self {
            algorithm,
            layout,
            param_names,
            params,
            covariance,
            metabolites,
            entries,
            factors,
            prediction,
            residual,
            baseline,
            cost,
            snr: snrs,
            fwhm: fwhms,
            convergence,
        }
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.params[self.layout.amplitudes()]
    }

    pub fn param_sd(&self) -> Vec<f64> {
        (0..self.params.len())
            .map(|i| self.covariance[(i, i)].max(0.0).sqrt())
            .collect()
    }

    pub fn param_percent_sd(&self) -> Vec<f64> {
        self.params
            .iter()
            .zip(self.param_sd())
            .map(|(&x, sd)| percent_sd(x, sd))
            .collect()
    }

    pub fn entry(&self, name: &str) -> Option<&MetabEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn visible_entries(&self) -> impl Iterator<Item = &MetabEntry> {
        self.entries.iter().filter(|e| !e.hidden)
    }

    pub fn scalings(&self) -> impl Iterator<Item = Scaling> + '_ {
        self.factors.keys().copied()
    }

    pub fn has_scaling(&self, scaling: Scaling) -> bool {
        self.factors.contains_key(&scaling)
    }

    /// Per basis metabolite multiplier turning an amplitude into `scaling`.
    pub fn factors(&self, scaling: Scaling) -> Option<&[f64]> {
        self.factors.get(&scaling).map(Vec::as_slice)
    }

    pub fn set_factors(&mut self, scaling: Scaling, factors: Vec<f64>) {
        debug_assert_eq!(factors.len(), self.metabolites.len());
        self.factors.insert(scaling, factors);
    }

    pub fn concentration(&self, name: &str, scaling: Scaling) -> Option<f64> {
        let entry = self.entry(name)?;
        let factors = self.factors.get(&scaling)?;
        Some(
            entry
                .members
                .iter()
                .map(|&m| self.params[m] * factors[m])
                .sum(),
        )
    }

    /// Standard deviation of a scaled entry from the members' covariance block.
    pub fn sd(&self, name: &str, scaling: Scaling) -> Option<f64> {
        let entry = self.entry(name)?;
        let factors = self.factors.get(&scaling)?;
        let mut var = 0.0;
        for &a in &entry.members {
            for &b in &entry.members {
                var += factors[a] * factors[b] * self.covariance[(a, b)];
            }
        }
        Some(var.max(0.0).sqrt())
    }

    pub fn percent_sd(&self, name: &str, scaling: Scaling) -> Option<f64> {
        Some(percent_sd(
            self.concentration(name, scaling)?,
            self.sd(name, scaling)?,
        ))
    }

    /// Quality metric of a basis metabolite by name.
    pub fn snr_of(&self, name: &str) -> Option<f64> {
        let j = self.metabolites.iter().position(|n| n == name)?;
        Some(self.snr[j])
    }

    pub fn fwhm_of(&self, name: &str) -> Option<f64> {
        let j = self.metabolites.iter().position(|n| n == name)?;
        Some(self.fwhm[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::singlet_basis;
    use crate::domain::{Acquisition, LineshapeModel, MetabGroups};

    fn result() -> FitResult {
        let acq = Acquisition::new(2000.0, 123.2);
        let basis = singlet_basis(&["NAA", "Cr"], 2048, &acq).unwrap();
        let model = SpectralModel::new(
            &basis,
            &acq,
            MetabGroups::single(2),
            LineshapeModel::Lorentzian,
            None,
            (0.2, 4.2),
        )
        .unwrap();
        let mut params = vec![0.0; model.layout().len()];
        params[0] = 2.0;
        params[1] = 1.0;
        params[model.layout().gamma(0)] = 30.0;
        let data = model.predict(&params);
        let mut cov = DMatrix::zeros(params.len(), params.len());
        cov[(0, 0)] = 0.04;
        cov[(1, 1)] = 0.01;
        cov[(0, 1)] = 0.005;
        cov[(1, 0)] = 0.005;
        FitResult::from_model(
            &model,
            &data,
            params,
            cov,
            Algorithm::Newton,
            Convergence {
                converged: true,
                iterations: 1,
                acceptance_rate: None,
            },
        )
    }

    #[test]
    fn raw_entries_mirror_amplitudes() {
        let r = result();
        assert_eq!(r.entries.len(), 2);
        assert_eq!(r.concentration("NAA", Scaling::Raw), Some(2.0));
        assert_eq!(r.concentration("Cr", Scaling::Internal), None);
        assert!((r.percent_sd("NAA", Scaling::Raw).unwrap() - 10.0).abs() < 1e-12);
        assert!(r.cost < 1e-20);
    }

    #[test]
    fn linewidth_tracks_damping() {
        let r = result();
        // gamma = 30 on top of the basis' own 5 1/s damping.
        let expected = 35.0 / std::f64::consts::PI;
        let fwhm = r.fwhm_of("NAA").unwrap();
        assert!((fwhm - expected).abs() < 1.0, "fwhm={fwhm}");
    }

    #[test]
    fn scaled_sd_uses_factors() {
        let mut r = result();
        r.set_factors(Scaling::Internal, vec![0.5, 0.5]);
        assert_eq!(r.concentration("NAA", Scaling::Internal), Some(1.0));
        assert!((r.sd("NAA", Scaling::Internal).unwrap() - 0.1).abs() < 1e-12);
    }
}
