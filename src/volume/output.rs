//! Output volumes assembled from per-voxel results, and the sink they are
//! handed to.

use std::collections::BTreeMap;
use std::convert::Infallible;

use num_complex::Complex64;

use crate::domain::Scaling;
use crate::error::VoxelError;
use crate::fit::FitResult;
use crate::volume::container::{Dims, voxel_count};

/// Per-voxel outcomes keyed by linear voxel index.
pub type Outcomes = BTreeMap<usize, Result<FitResult, VoxelError>>;

/// Destination for a run's maps (e.g. a NIfTI writer).
pub trait ResultSink {
    type Error;

    /// A 3-D scalar map.
    fn write_map(&mut self, name: &str, dims: Dims, values: &[f64]) -> Result<(), Self::Error>;

    /// A 4-D complex volume with `points` samples per voxel.
    fn write_spectra(
        &mut self,
        name: &str,
        dims: Dims,
        points: usize,
        values: &[Complex64],
    ) -> Result<(), Self::Error>;

    /// Text record of the configuration that produced the maps.
    fn write_config(&mut self, record: &str) -> Result<(), Self::Error>;
}

/// Name of the concentration map for an entry.
pub fn conc_map_name(scaling: Scaling, entry: &str) -> String {
    format!("conc_{}_{entry}", scaling.label())
}

pub fn sd_map_name(scaling: Scaling, entry: &str) -> String {
    format!("percent_sd_{}_{entry}", scaling.label())
}

#[derive(Debug, Clone, Default)]
pub struct OutputVolumes {
    pub dims: Dims,
    /// Samples per voxel in the 4-D fit, residual and baseline volumes.
    pub window_points: usize,
    pub maps: BTreeMap<String, Vec<f64>>,
    pub spectra: BTreeMap<String, Vec<Complex64>>,
}

impl OutputVolumes {
    /// Scatter successful results into NaN-filled volumes.
    pub fn gather(dims: Dims, window_points: usize, outcomes: &Outcomes) -> Self {
        let n = voxel_count(dims);
        let nan = Complex64::new(f64::NAN, f64::NAN);
        let mut out = Self {
            dims,
            window_points,
            maps: BTreeMap::new(),
            spectra: BTreeMap::new(),
        };
        for name in ["fit", "residual", "baseline"] {
            out.spectra.insert(name.to_string(), vec![nan; n * window_points]);
        }

        for (&lin, outcome) in outcomes {
            let Ok(result) = outcome else {
                continue;
            };

            for scaling in result.scalings() {
                for entry in result.visible_entries() {
                    if let Some(c) = result.concentration(&entry.name, scaling) {
                        out.set(conc_map_name(scaling, &entry.name), lin, c);
                    }
                    if let Some(p) = result.percent_sd(&entry.name, scaling) {
                        out.set(sd_map_name(scaling, &entry.name), lin, p);
                    }
                }
            }
            for (j, name) in result.metabolites.iter().enumerate() {
                out.set(format!("snr_{name}"), lin, result.snr[j]);
                out.set(format!("fwhm_{name}"), lin, result.fwhm[j]);
            }
            out.set("converged".to_string(), lin, f64::from(u8::from(result.convergence.converged)));
            out.set("cost".to_string(), lin, result.cost);

            let span = lin * window_points..(lin + 1) * window_points;
            for (name, values) in [
                ("fit", &result.prediction),
                ("residual", &result.residual),
                ("baseline", &result.baseline),
            ] {
                if values.len() != window_points {
                    continue;
                }
                if let Some(volume) = out.spectra.get_mut(name) {
                    volume[span.clone()].copy_from_slice(values);
                }
            }
        }
        out
    }

    fn set(&mut self, name: String, lin: usize, value: f64) {
        let n = voxel_count(self.dims);
        self.maps.entry(name).or_insert_with(|| vec![f64::NAN; n])[lin] = value;
    }

    pub fn map(&self, name: &str) -> Option<&[f64]> {
        self.maps.get(name).map(Vec::as_slice)
    }

    pub fn spectrum(&self, name: &str) -> Option<&[Complex64]> {
        self.spectra.get(name).map(Vec::as_slice)
    }

    /// Hand every volume and the configuration record to `sink`.
    pub fn write_to<S: ResultSink>(&self, sink: &mut S, config_record: &str) -> Result<(), S::Error> {
        for (name, values) in &self.maps {
            sink.write_map(name, self.dims, values)?;
        }
        for (name, values) in &self.spectra {
            sink.write_spectra(name, self.dims, self.window_points, values)?;
        }
        sink.write_config(config_record)
    }
}

/// Sink that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub maps: BTreeMap<String, Vec<f64>>,
    pub spectra: BTreeMap<String, Vec<Complex64>>,
    pub config: Option<String>,
}

impl ResultSink for MemorySink {
    type Error = Infallible;

    fn write_map(&mut self, name: &str, _dims: Dims, values: &[f64]) -> Result<(), Self::Error> {
        self.maps.insert(name.to_string(), values.to_vec());
        Ok(())
    }

    fn write_spectra(
        &mut self,
        name: &str,
        _dims: Dims,
        _points: usize,
        values: &[Complex64],
    ) -> Result<(), Self::Error> {
        self.spectra.insert(name.to_string(), values.to_vec());
        Ok(())
    }

    fn write_config(&mut self, record: &str) -> Result<(), Self::Error> {
        self.config = Some(record.to_string());
        Ok(())
    }
}
