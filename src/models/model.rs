//! Spectral forward model.
//!
//! The fitters rely on two primitive operations:
//! - predict the complex spectrum inside the ppm window for a parameter vector
//! - build the Jacobian of that prediction (for Gauss-Newton steps and CRLBs)
//!
//! For metabolite `j` in lineshape group `g` the time-domain contribution is
//! `c_j * basis_j(t) * L_g(t)` with
//!
//! ```text
//! Lorentzian: L(t) = exp(-(gamma + i*eps) t)
//! Voigt:      L(t) = exp(-(gamma + i*eps) t - sigma t^2)
//! ```
//!
//! The summed FID is transformed, rotated by `exp(i(Phi0 + Phi1 * nu))` and a
//! complex polynomial baseline over the window is added.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::domain::{Acquisition, Basis, FitConfig, LineshapeModel, MetabGroups, SpectralAxis};
use crate::error::ConfigError;
use crate::math::SpectrumTransform;
use crate::models::ParamLayout;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// Model choices that do not depend on the data.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub groups: MetabGroups,
    pub lineshape: LineshapeModel,
    pub baseline_order: Option<usize>,
    pub ppm_window: (f64, f64),
}

impl ModelOptions {
    pub fn from_config(config: &FitConfig, n_metabs: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            groups: MetabGroups::new(&config.metab_groups, n_metabs)?,
            lineshape: config.lineshape,
            baseline_order: config.baseline(),
            ppm_window: config.ppm_window,
        })
    }
}

/// Forward model bound to one basis, grouping, lineshape and fit window.
#[derive(Debug, Clone)]
pub struct SpectralModel<'a> {
    basis: &'a Basis,
    groups: MetabGroups,
    layout: ParamLayout,
    axis: SpectralAxis,
    window: Range<usize>,
    transform: SpectrumTransform,
    baseline_x: Vec<f64>,
}

impl<'a> SpectralModel<'a> {
    pub fn new(
        basis: &'a Basis,
        acquisition: &Acquisition,
        groups: MetabGroups,
        lineshape: LineshapeModel,
        baseline_order: Option<usize>,
        ppm_window: (f64, f64),
    ) -> Result<Self, ConfigError> {
        acquisition.validate()?;
        basis.check_matches(basis.points(), acquisition)?;
        if groups.ids().len() != basis.len() {
            return Err(ConfigError::GroupCount {
                groups: groups.ids().len(),
                metabolites: basis.len(),
            });
        }

        let axis = SpectralAxis::new(basis.points(), acquisition);
        let window = axis.ppm_range(ppm_window.0, ppm_window.1);
        if window.is_empty() {
            return Err(ConfigError::EmptyWindow {
                lo: ppm_window.0.min(ppm_window.1),
                hi: ppm_window.0.max(ppm_window.1),
            });
        }

        let k = window.len();
        let baseline_x = if k > 1 {
            (0..k).map(|i| -1.0 + 2.0 * i as f64 / (k - 1) as f64).collect()
        } else {
            vec![0.0]
        };

        let layout = ParamLayout::new(basis.len(), groups.count(), lineshape, baseline_order);
        let transform = SpectrumTransform::new(basis.points());

        Ok(Self {
            basis,
            groups,
            layout,
            axis,
            window,
            transform,
            baseline_x,
        })
    }

    pub fn with_options(
        basis: &'a Basis,
        acquisition: &Acquisition,
        options: &ModelOptions,
    ) -> Result<Self, ConfigError> {
        Self::new(
            basis,
            acquisition,
            options.groups.clone(),
            options.lineshape,
            options.baseline_order,
            options.ppm_window,
        )
    }

    pub fn basis(&self) -> &Basis {
        self.basis
    }

    pub fn groups(&self) -> &MetabGroups {
        &self.groups
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn axis(&self) -> &SpectralAxis {
        &self.axis
    }

    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    pub fn transform(&self) -> &SpectrumTransform {
        &self.transform
    }

    /// Shifted spectrum of `fid` restricted to the fit window.
    pub fn data_window(&self, fid: &[Complex64]) -> Vec<Complex64> {
        let spec = self.transform.spectrum(fid);
        spec[self.window.clone()].to_vec()
    }

    /// Time-domain lineshape of one group.
    fn lineshape(&self, params: &[f64], group: usize) -> Vec<Complex64> {
        let gamma = params[self.layout.gamma(group)];
        let eps = params[self.layout.eps(group)];
        let sigma = self.layout.sigma(group).map_or(0.0, |i| params[i]);
        self.axis
            .time
            .iter()
            .map(|&t| (-(Complex64::new(gamma, eps) * t) - sigma * t * t).exp())
            .collect()
    }

    /// Global phase factor at each window point.
    fn phase(&self, params: &[f64]) -> Vec<Complex64> {
        let phi0 = params[self.layout.phi0()];
        let phi1 = params[self.layout.phi1()];
        self.axis.frequency[self.window.clone()]
            .iter()
            .map(|&nu| Complex64::from_polar(1.0, phi0 + phi1 * nu))
            .collect()
    }

    /// Baseline polynomial over the window.
    pub fn baseline_curve(&self, params: &[f64]) -> Vec<Complex64> {
        let mut out = vec![Complex64::new(0.0, 0.0); self.window.len()];
        let Some(order) = self.layout.baseline_order else {
            return out;
        };
        for p in 0..=order {
            let (ir, ii) = self.layout.baseline_pair(p);
            let coef = Complex64::new(params[ir], params[ii]);
            for (o, &x) in out.iter_mut().zip(&self.baseline_x) {
                *o += coef * x.powi(p as i32);
            }
        }
        out
    }

    /// Sum of lineshaped, amplitude-weighted basis spectra (no phase, no
    /// baseline) over the full axis.
    fn metabolite_sum(&self, params: &[f64]) -> Vec<Complex64> {
        let n = self.basis.points();
        let mut total = vec![Complex64::new(0.0, 0.0); n];
        for g in 0..self.groups.count() {
            let mut fid = vec![Complex64::new(0.0, 0.0); n];
            let mut any = false;
            for (j, basis_fid) in self.basis.fids().iter().enumerate() {
                if self.groups.group_of(j) != g {
                    continue;
                }
                let c = params[j];
                if c == 0.0 {
                    continue;
                }
                any = true;
                for (f, b) in fid.iter_mut().zip(basis_fid) {
                    *f += b * c;
                }
            }
            if !any {
                continue;
            }
            let shape = self.lineshape(params, g);
            for (f, l) in fid.iter_mut().zip(&shape) {
                *f *= *l;
            }
            self.transform.forward_in_place(&mut fid);
            for (t, f) in total.iter_mut().zip(&fid) {
                *t += *f;
            }
        }
        total
    }

    /// Predicted spectrum inside the fit window.
    pub fn predict(&self, params: &[f64]) -> Vec<Complex64> {
        let metabs = self.metabolite_sum(params);
        let phase = self.phase(params);
        let baseline = self.baseline_curve(params);
        metabs[self.window.clone()]
            .iter()
            .zip(&phase)
            .zip(&baseline)
            .map(|((m, p), b)| m * p + b)
            .collect()
    }

    /// Lineshaped spectrum of a single metabolite over the full axis, scaled
    /// by its amplitude and without global phase or baseline.
    pub fn metabolite_spectrum(&self, params: &[f64], metab: usize) -> Vec<Complex64> {
        let shape = self.lineshape(params, self.groups.group_of(metab));
        let c = params[metab];
        let mut fid: Vec<Complex64> = self.basis.fids()[metab]
            .iter()
            .zip(&shape)
            .map(|(b, l)| b * l * c)
            .collect();
        self.transform.forward_in_place(&mut fid);
        fid
    }

    /// Stacked real/imaginary residual `data - model` over the window.
    pub fn residual_vector(&self, data: &[Complex64], params: &[f64]) -> DVector<f64> {
        let pred = self.predict(params);
        stack(data.iter().zip(&pred).map(|(y, s)| y - s), pred.len())
    }

    /// Sum of squared real and imaginary residuals.
    pub fn cost(&self, data: &[Complex64], params: &[f64]) -> f64 {
        let pred = self.predict(params);
        data.iter()
            .zip(&pred)
            .map(|(y, s)| (y - s).norm_sqr())
            .sum()
    }

    /// Jacobian of the stacked real/imaginary prediction, `2K x P`.
    pub fn jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        let k = self.window.len();
        let n = self.basis.points();
        let layout = &self.layout;
        let phase = self.phase(params);
        let zero = Complex64::new(0.0, 0.0);

        let mut cols: Vec<Vec<Complex64>> = vec![vec![zero; k]; layout.len()];
        let mut metab_total = vec![zero; k];
        let time = &self.axis.time;

        for (j, basis_fid) in self.basis.fids().iter().enumerate() {
            let g = self.groups.group_of(j);
            let c = params[j];
            let shape = self.lineshape(params, g);
            let shaped: Vec<Complex64> = basis_fid.iter().zip(&shape).map(|(b, l)| b * l).collect();

            let mut m = shaped.clone();
            self.transform.forward_in_place(&mut m);

            let mut t1: Vec<Complex64> = shaped.iter().zip(time).map(|(s, &t)| s * t).collect();
            let t2: Option<Vec<Complex64>> = layout
                .sigma(g)
                .map(|_| t1.iter().zip(time).map(|(s, &t)| s * t).collect());
            self.transform.forward_in_place(&mut t1);
            let t2 = t2.map(|mut v| {
                self.transform.forward_in_place(&mut v);
                v
            });

            let gi = layout.gamma(g);
            let ei = layout.eps(g);
            for (w, idx) in self.window.clone().enumerate() {
                let p = phase[w];
                cols[j][w] = p * m[idx];
                metab_total[w] += m[idx] * c;
                let dt = p * t1[idx] * c;
                cols[gi][w] -= dt;
                cols[ei][w] -= I * dt;
            }
            if let (Some(si), Some(t2)) = (layout.sigma(g), t2) {
                for (w, idx) in self.window.clone().enumerate() {
                    cols[si][w] -= phase[w] * t2[idx] * c;
                }
            }
        }
        debug_assert_eq!(n, self.axis.len());

        let freq = &self.axis.frequency[self.window.clone()];
        for w in 0..k {
            let rotated = I * phase[w] * metab_total[w];
            cols[layout.phi0()][w] = rotated;
            cols[layout.phi1()][w] = rotated * freq[w];
        }

        if let Some(order) = layout.baseline_order {
            for p in 0..=order {
                let (ir, ii) = layout.baseline_pair(p);
                for (w, &x) in self.baseline_x.iter().enumerate() {
                    let v = x.powi(p as i32);
                    cols[ir][w] = Complex64::new(v, 0.0);
                    cols[ii][w] = Complex64::new(0.0, v);
                }
            }
        }

        let mut jac = DMatrix::<f64>::zeros(2 * k, layout.len());
        for (c, col) in cols.iter().enumerate() {
            for (w, v) in col.iter().enumerate() {
                jac[(w, c)] = v.re;
                jac[(k + w, c)] = v.im;
            }
        }
        jac
    }
}

/// Real parts on top, imaginary parts below.
pub fn stack(values: impl Iterator<Item = Complex64>, len: usize) -> DVector<f64> {
    let mut out = DVector::<f64>::zeros(2 * len);
    for (i, v) in values.enumerate() {
        out[i] = v.re;
        out[len + i] = v.im;
    }
    out
}
