//! Shared domain types.
//!
//! These types are intentionally small and owned so a voxel's inputs can be
//! moved into a worker without borrowing from the volume they came from.

use std::collections::HashSet;

use clap::ValueEnum;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Chemical shift of water, used as the ppm reference of the frequency axis.
pub const H2O_PPM: f64 = 4.65;

/// Which solver produces the point estimates for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Damped Gauss-Newton least squares with CRLB uncertainties.
    #[default]
    Newton,
    /// Random-walk Metropolis-Hastings sampler.
    Mh,
}

impl Algorithm {
    pub fn display_name(self) -> &'static str {
        match self {
            Algorithm::Newton => "Newton",
            Algorithm::Mh => "Metropolis-Hastings",
        }
    }
}

/// Lineshape distortion applied to every basis signal of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineshapeModel {
    /// `exp(-(gamma + i*eps) t)`.
    #[default]
    Lorentzian,
    /// `exp(-(gamma + i*eps) t - sigma t^2)`.
    Voigt,
}

impl LineshapeModel {
    /// Number of broadening parameters per group (shift not included).
    pub fn broadening_len(self) -> usize {
        match self {
            LineshapeModel::Lorentzian => 1,
            LineshapeModel::Voigt => 2,
        }
    }
}

/// Concentration scaling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    /// Fitted amplitudes as they come out of the engine.
    Raw,
    /// Ratio to the summed internal reference amplitudes.
    Internal,
    /// mmol per litre of voxel.
    Molarity,
    /// mmol per kg of tissue water.
    Molality,
}

impl Scaling {
    pub const ALL: [Scaling; 4] = [
        Scaling::Raw,
        Scaling::Internal,
        Scaling::Molarity,
        Scaling::Molality,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Scaling::Raw => "raw",
            Scaling::Internal => "internal",
            Scaling::Molarity => "molarity",
            Scaling::Molality => "molality",
        }
    }
}

/// Acquisition metadata shared by every voxel of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    /// Spectral width in Hz.
    pub bandwidth: f64,
    /// Spectrometer frequency in MHz.
    pub central_frequency: f64,
    /// Echo time in seconds.
    pub echo_time: Option<f64>,
    /// Repetition time in seconds.
    pub repetition_time: Option<f64>,
}

impl Acquisition {
    pub fn new(bandwidth: f64, central_frequency: f64) -> Self {
        Self {
            bandwidth,
            central_frequency,
            echo_time: None,
            repetition_time: None,
        }
    }

    pub fn with_timing(mut self, echo_time: f64, repetition_time: f64) -> Self {
        self.echo_time = Some(echo_time);
        self.repetition_time = Some(repetition_time);
        self
    }

    pub fn dwell_time(&self) -> f64 {
        1.0 / self.bandwidth
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bandwidth.is_finite() && self.bandwidth > 0.0) {
            return Err(ConfigError::InvalidSetting {
                name: "bandwidth",
                reason: format!("must be finite and > 0, got {}", self.bandwidth),
            });
        }
        if !(self.central_frequency.is_finite() && self.central_frequency > 0.0) {
            return Err(ConfigError::InvalidSetting {
                name: "central_frequency",
                reason: format!("must be finite and > 0, got {}", self.central_frequency),
            });
        }
        Ok(())
    }
}

/// Time, frequency and chemical-shift axes for a given point count.
///
/// The spectrum convention is `fftshift(fft(fid))`, so index `k` sits at
/// `(k - n/2) * bandwidth / n` Hz.
#[derive(Debug, Clone)]
pub struct SpectralAxis {
    pub time: Vec<f64>,
    pub frequency: Vec<f64>,
    pub ppm: Vec<f64>,
}

impl SpectralAxis {
    pub fn new(points: usize, acq: &Acquisition) -> Self {
        let dt = acq.dwell_time();
        let half = (points / 2) as f64;
        let df = acq.bandwidth / points as f64;

        let time = (0..points).map(|k| k as f64 * dt).collect();
        let frequency: Vec<f64> = (0..points).map(|k| (k as f64 - half) * df).collect();
        let ppm = frequency
            .iter()
            .map(|f| f / acq.central_frequency + H2O_PPM)
            .collect();

        Self {
            time,
            frequency,
            ppm,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Contiguous index range whose ppm values fall inside `[lo, hi]`.
    ///
    /// The ppm axis is monotonically increasing, so the matching points are
    /// always one run.
    pub fn ppm_range(&self, lo: f64, hi: f64) -> std::ops::Range<usize> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let start = self.ppm.partition_point(|&p| p < lo);
        let end = self.ppm.partition_point(|&p| p <= hi);
        start..end.max(start)
    }
}

/// Ordered set of named metabolite reference FIDs.
#[derive(Debug, Clone)]
pub struct Basis {
    names: Vec<String>,
    fids: Vec<Vec<Complex64>>,
    bandwidth: f64,
}

impl Basis {
    pub fn new(
        names: Vec<String>,
        fids: Vec<Vec<Complex64>>,
        bandwidth: f64,
    ) -> Result<Self, ConfigError> {
        if names.is_empty() || fids.is_empty() {
            return Err(ConfigError::EmptyBasis);
        }
        if names.len() != fids.len() {
            return Err(ConfigError::ShapeMismatch {
                what: "basis signals",
                got: vec![fids.len()],
                expected: vec![names.len()],
            });
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateMetabolite(name.clone()));
            }
        }
        let expected = fids[0].len();
        for (name, fid) in names.iter().zip(&fids) {
            if fid.len() != expected || fid.is_empty() {
                return Err(ConfigError::BasisLength {
                    name: name.clone(),
                    got: fid.len(),
                    expected,
                });
            }
        }
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(ConfigError::InvalidSetting {
                name: "basis bandwidth",
                reason: format!("must be finite and > 0, got {bandwidth}"),
            });
        }
        Ok(Self {
            names,
            fids,
            bandwidth,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn fids(&self) -> &[Vec<Complex64>] {
        &self.fids
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn points(&self) -> usize {
        self.fids[0].len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Check that the basis was sampled like the data it will be fitted to.
    pub fn check_matches(&self, points: usize, acq: &Acquisition) -> Result<(), ConfigError> {
        if self.points() != points {
            return Err(ConfigError::PointMismatch {
                basis: self.points(),
                data: points,
            });
        }
        let rel = (self.bandwidth - acq.bandwidth).abs() / acq.bandwidth;
        if rel > 1e-6 {
            return Err(ConfigError::BandwidthMismatch {
                basis: self.bandwidth,
                data: acq.bandwidth,
            });
        }
        Ok(())
    }
}

/// One voxel's signal: metabolite FID, optional water reference, metadata.
#[derive(Debug, Clone)]
pub struct Mrs {
    pub fid: Vec<Complex64>,
    pub water: Option<Vec<Complex64>>,
    pub acquisition: Acquisition,
}

impl Mrs {
    pub fn new(fid: Vec<Complex64>, acquisition: Acquisition) -> Self {
        Self {
            fid,
            water: None,
            acquisition,
        }
    }

    pub fn with_water(mut self, water: Vec<Complex64>) -> Self {
        self.water = Some(water);
        self
    }

    pub fn points(&self) -> usize {
        self.fid.len()
    }

    pub fn axis(&self) -> SpectralAxis {
        SpectralAxis::new(self.points(), &self.acquisition)
    }
}

/// Basis index → lineshape group id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetabGroups {
    ids: Vec<usize>,
    count: usize,
}

impl MetabGroups {
    /// Every metabolite in group 0.
    pub fn single(n_metabs: usize) -> Self {
        Self {
            ids: vec![0; n_metabs],
            count: 1,
        }
    }

    /// Validate an explicit assignment. An empty slice means "all in group 0".
    pub fn new(ids: &[usize], n_metabs: usize) -> Result<Self, ConfigError> {
        if ids.is_empty() {
            return Ok(Self::single(n_metabs));
        }
        if ids.len() != n_metabs {
            return Err(ConfigError::GroupCount {
                groups: ids.len(),
                metabolites: n_metabs,
            });
        }
        let count = ids.iter().max().map_or(0, |m| m + 1);
        for g in 0..count {
            if !ids.contains(&g) {
                return Err(ConfigError::NonContiguousGroups(g));
            }
        }
        Ok(Self {
            ids: ids.to_vec(),
            count,
        })
    }

    pub fn group_of(&self, metab: usize) -> usize {
        self.ids[metab]
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Tissue composition of one voxel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TissueFractions {
    pub wm: f64,
    pub gm: f64,
    pub csf: f64,
}

impl TissueFractions {
    pub fn new(wm: f64, gm: f64, csf: f64) -> Self {
        Self { wm, gm, csf }
    }

    /// Fractions rescaled to sum to one; `None` when they carry no weight.
    pub fn normalized(&self) -> Option<Self> {
        let parts = [self.wm, self.gm, self.csf];
        if parts.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let total: f64 = parts.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(Self::new(self.wm / total, self.gm / total, self.csf / total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acq() -> Acquisition {
        Acquisition::new(2000.0, 123.2)
    }

    #[test]
    fn axis_centre_is_water() {
        let axis = SpectralAxis::new(512, &acq());
        assert_eq!(axis.frequency[256], 0.0);
        assert!((axis.ppm[256] - H2O_PPM).abs() < 1e-12);
        assert!(axis.ppm.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn ppm_range_selects_inside_points() {
        let axis = SpectralAxis::new(512, &acq());
        let r = axis.ppm_range(4.2, 0.2);
        assert!(!r.is_empty());
        for k in r.clone() {
            assert!(axis.ppm[k] >= 0.2 && axis.ppm[k] <= 4.2);
        }
        assert!(axis.ppm[r.start - 1] < 0.2);
        assert!(axis.ppm[r.end] > 4.2);
    }

    #[test]
    fn basis_rejects_duplicates_and_lengths() {
        let fid = vec![Complex64::new(1.0, 0.0); 8];
        let err = Basis::new(vec!["A".into(), "A".into()], vec![fid.clone(), fid.clone()], 1.0)
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateMetabolite("A".into()));

        let err = Basis::new(vec!["A".into(), "B".into()], vec![fid.clone(), fid[..4].to_vec()], 1.0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::BasisLength { got: 4, .. }));
    }

    #[test]
    fn basis_must_match_acquisition() {
        let fid = vec![Complex64::new(1.0, 0.0); 8];
        let basis = Basis::new(vec!["A".into()], vec![fid], 2000.0).unwrap();
        assert!(basis.check_matches(8, &acq()).is_ok());
        assert!(matches!(
            basis.check_matches(16, &acq()),
            Err(ConfigError::PointMismatch { .. })
        ));
        assert!(matches!(
            basis.check_matches(8, &Acquisition::new(4000.0, 123.2)),
            Err(ConfigError::BandwidthMismatch { .. })
        ));
    }

    #[test]
    fn groups_must_be_contiguous() {
        assert_eq!(MetabGroups::new(&[], 3).unwrap().count(), 1);
        assert_eq!(MetabGroups::new(&[0, 1, 1], 3).unwrap().count(), 2);
        assert_eq!(
            MetabGroups::new(&[0, 2], 2).unwrap_err(),
            ConfigError::NonContiguousGroups(1)
        );
        assert!(matches!(
            MetabGroups::new(&[0, 0], 3),
            Err(ConfigError::GroupCount { .. })
        ));
    }

    #[test]
    fn tissue_fractions_normalize() {
        let f = TissueFractions::new(2.0, 1.0, 1.0).normalized().unwrap();
        assert!((f.wm - 0.5).abs() < 1e-12);
        assert!(TissueFractions::new(0.0, 0.0, 0.0).normalized().is_none());
    }
}
