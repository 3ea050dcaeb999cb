//! Run configuration.
//!
//! A `FitConfig` describes everything the engines need besides the data:
//! model choices, solver settings, referencing and quantification options.
//! It deserializes from JSON with every field optional, so a config file only
//! has to name what differs from the defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Algorithm, LineshapeModel};
use crate::error::ConfigError;

/// Damped Gauss-Newton settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Hard iteration ceiling. Reaching it is reported, not fatal.
    pub max_iters: usize,
    /// Relative step-size tolerance.
    pub xtol: f64,
    /// Relative cost-decrease tolerance.
    pub ftol: f64,
    /// Initial Levenberg-Marquardt damping.
    pub lambda0: f64,
    /// Starting Gaussian broadening for Voigt fits without `x0`.
    pub init_sigma: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iters: 200,
            xtol: 1e-8,
            ftol: 1e-10,
            lambda0: 1e-3,
            init_sigma: 1.0,
        }
    }
}

/// Gaussian prior on a lineshape parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianPrior {
    pub mean: f64,
    pub sd: f64,
}

/// Priors used by the Metropolis-Hastings sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    /// Lorentzian damping (1/s).
    pub gamma: GaussianPrior,
    /// Frequency shift (rad/s).
    pub eps: GaussianPrior,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            gamma: GaussianPrior { mean: 0.0, sd: 50.0 },
            eps: GaussianPrior { mean: 0.0, sd: 100.0 },
        }
    }
}

/// Metropolis-Hastings settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MhConfig {
    /// Iterations discarded before samples are kept.
    pub burn_in: usize,
    /// Number of kept samples.
    pub samples: usize,
    /// Keep one sample every `thin` iterations.
    pub thin: usize,
    /// Proposal widths are re-tuned every `adapt_every` burn-in iterations.
    pub adapt_every: usize,
    pub seed: u64,
    /// When false the posterior is the bare likelihood (flat, unbounded).
    pub use_priors: bool,
    pub priors: Priors,
}

impl Default for MhConfig {
    fn default() -> Self {
        Self {
            burn_in: 500,
            samples: 500,
            thin: 1,
            adapt_every: 50,
            seed: 42,
            use_priors: true,
            priors: Priors::default(),
        }
    }
}

/// Absolute quantification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantificationConfig {
    /// Metabolite whose fitted area is compared to the water area.
    pub water_ref_metab: String,
    /// Equivalent proton count of that metabolite inside `ref_limits`.
    pub water_ref_protons: f64,
    /// Integration limits (ppm) for the reference metabolite.
    pub ref_limits: (f64, f64),
    /// Integration limits (ppm) for the water peak.
    pub water_limits: (f64, f64),
    /// Per-metabolite T1 overrides in seconds.
    pub t1: BTreeMap<String, f64>,
    /// Per-metabolite T2 overrides in seconds.
    pub t2: BTreeMap<String, f64>,
    /// Multiplicative correction applied to all absolute concentrations.
    pub correction_factor: f64,
}

impl Default for QuantificationConfig {
    fn default() -> Self {
        Self {
            water_ref_metab: "Cr".to_string(),
            water_ref_protons: 5.0,
            ref_limits: (2.0, 5.0),
            water_limits: (1.65, 7.65),
            t1: BTreeMap::new(),
            t2: BTreeMap::new(),
            correction_factor: 1.0,
        }
    }
}

/// A full run's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub algorithm: Algorithm,
    pub lineshape: LineshapeModel,
    /// Fit window in ppm (order does not matter).
    pub ppm_window: (f64, f64),
    /// Baseline polynomial order, -1 for none.
    pub baseline_order: i32,
    /// Group id per basis metabolite; empty puts everything in group 0.
    pub metab_groups: Vec<usize>,
    /// Metabolites whose summed amplitude is the internal reference.
    pub internal_reference: Vec<String>,
    /// Groups of metabolites reported as one combined entry.
    pub combine: Vec<Vec<String>>,
    /// Keep the individual members after combining.
    pub keep_combined_components: bool,
    pub newton: NewtonConfig,
    pub mh: MhConfig,
    /// Absolute quantification; `None` limits output to internal referencing.
    pub quantification: Option<QuantificationConfig>,
    /// Worker count for the parallel path; `None` uses every available CPU.
    pub workers: Option<usize>,
    /// `false` runs voxels one after another on the calling thread.
    pub parallel: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Newton,
            lineshape: LineshapeModel::Lorentzian,
            ppm_window: (0.2, 4.2),
            baseline_order: 2,
            metab_groups: Vec::new(),
            internal_reference: vec!["Cr".to_string(), "PCr".to_string()],
            combine: Vec::new(),
            keep_combined_components: true,
            newton: NewtonConfig::default(),
            mh: MhConfig::default(),
            quantification: None,
            workers: None,
            parallel: true,
        }
    }
}

impl FitConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: FitConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::InvalidSetting {
                name: "config",
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// `None` when no baseline is fitted.
    pub fn baseline(&self) -> Option<usize> {
        usize::try_from(self.baseline_order).ok()
    }

    /// Settings checks that do not need the basis or the data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (lo, hi) = self.ppm_window;
        if !(lo.is_finite() && hi.is_finite()) || lo == hi {
            return Err(ConfigError::InvalidSetting {
                name: "ppm_window",
                reason: format!("needs two distinct finite limits, got ({lo}, {hi})"),
            });
        }
        if self.baseline_order < -1 {
            return Err(ConfigError::InvalidSetting {
                name: "baseline_order",
                reason: format!("must be >= -1, got {}", self.baseline_order),
            });
        }
        if self.newton.max_iters == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "newton.max_iters",
                reason: "must be > 0".into(),
            });
        }
        if self.mh.samples == 0 || self.mh.thin == 0 || self.mh.adapt_every == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "mh",
                reason: "samples, thin and adapt_every must be > 0".into(),
            });
        }
        if self.mh.use_priors {
            for (name, prior) in [
                ("mh.priors.gamma", &self.mh.priors.gamma),
                ("mh.priors.eps", &self.mh.priors.eps),
            ] {
                if !(prior.sd.is_finite() && prior.sd > 0.0 && prior.mean.is_finite()) {
                    return Err(ConfigError::InvalidSetting {
                        name,
                        reason: format!("needs a finite mean and sd > 0, got ({}, {})", prior.mean, prior.sd),
                    });
                }
            }
        }
        if self.internal_reference.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "internal_reference",
                reason: "at least one reference metabolite is required".into(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidSetting {
                name: "workers",
                reason: "must be > 0".into(),
            });
        }
        if let Some(q) = &self.quantification {
            if !(q.water_ref_protons.is_finite() && q.water_ref_protons > 0.0) {
                return Err(ConfigError::InvalidSetting {
                    name: "quantification.water_ref_protons",
                    reason: format!("must be > 0, got {}", q.water_ref_protons),
                });
            }
            if !(q.correction_factor.is_finite() && q.correction_factor > 0.0) {
                return Err(ConfigError::InvalidSetting {
                    name: "quantification.correction_factor",
                    reason: format!("must be > 0, got {}", q.correction_factor),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = FitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.baseline(), Some(2));
    }

    #[test]
    fn json_overrides_only_named_fields() {
        let config = FitConfig::from_json_str(
            r#"{ "algorithm": "mh", "baseline_order": -1, "mh": { "samples": 100 } }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::Mh);
        assert_eq!(config.baseline(), None);
        assert_eq!(config.mh.samples, 100);
        assert_eq!(config.mh.burn_in, MhConfig::default().burn_in);
        assert_eq!(config.ppm_window, (0.2, 4.2));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let config = FitConfig {
            baseline_order: -2,
            ..FitConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { name: "baseline_order", .. })
        ));
        assert!(FitConfig::from_json_str(r#"{ "workers": 0 }"#).is_err());
        assert!(matches!(
            FitConfig::from_json_str(r#"{ "mh": { "priors": { "gamma": { "mean": 0.0, "sd": 0.0 } } } }"#),
            Err(ConfigError::InvalidSetting { name: "mh.priors.gamma", .. })
        ));
        assert!(FitConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn prior_widths_are_checked_only_when_used() {
        let mut config = FitConfig::default();
        config.mh.priors.eps.sd = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { name: "mh.priors.eps", .. })
        ));
        config.mh.priors.eps.sd = -1.0;
        assert!(config.validate().is_err());
        config.mh.use_priors = false;
        assert!(config.validate().is_ok());
    }
}
