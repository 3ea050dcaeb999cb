//! Volumetric inputs: spectra, mask and tissue fractions.
//!
//! All volumes are flat buffers in row-major voxel order,
//! `lin = (x * ny + y) * nz + z`; spectral data stores `points` consecutive
//! samples per voxel.

use num_complex::Complex64;
use tracing::debug;

use crate::domain::{Acquisition, Mrs, TissueFractions};
use crate::error::ConfigError;

pub type Dims = [usize; 3];

pub fn voxel_count(dims: Dims) -> usize {
    dims.iter().product()
}

pub fn linear_index(dims: Dims, x: usize, y: usize, z: usize) -> usize {
    (x * dims[1] + y) * dims[2] + z
}

pub fn coords(dims: Dims, lin: usize) -> (usize, usize, usize) {
    let z = lin % dims[2];
    let y = (lin / dims[2]) % dims[1];
    let x = lin / (dims[1] * dims[2]);
    (x, y, z)
}

/// Complex spectra on a 3-D grid.
#[derive(Debug, Clone)]
pub struct Volume {
    dims: Dims,
    points: usize,
    data: Vec<Complex64>,
    water: Option<Vec<Complex64>>,
    acquisition: Acquisition,
}

impl Volume {
    pub fn new(
        dims: Dims,
        points: usize,
        data: Vec<Complex64>,
        acquisition: Acquisition,
    ) -> Result<Self, ConfigError> {
        acquisition.validate()?;
        if points == 0 || voxel_count(dims) == 0 {
            return Err(ConfigError::ShapeMismatch {
                what: "volume",
                got: vec![dims[0], dims[1], dims[2], points],
                expected: vec![1, 1, 1, 1],
            });
        }
        check_len("volume data", &data, dims, points)?;
        Ok(Self {
            dims,
            points,
            data,
            water: None,
            acquisition,
        })
    }

    pub fn with_water(mut self, water: Vec<Complex64>) -> Result<Self, ConfigError> {
        check_len("water volume", &water, self.dims, self.points)?;
        self.water = Some(water);
        Ok(self)
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    pub fn has_water(&self) -> bool {
        self.water.is_some()
    }

    pub fn fid(&self, lin: usize) -> &[Complex64] {
        &self.data[lin * self.points..(lin + 1) * self.points]
    }

    pub fn water_fid(&self, lin: usize) -> Option<&[Complex64]> {
        self.water
            .as_ref()
            .map(|w| &w[lin * self.points..(lin + 1) * self.points])
    }

    /// Owned single-voxel spectrum.
    pub fn voxel(&self, lin: usize) -> Mrs {
        let mrs = Mrs::new(self.fid(lin).to_vec(), self.acquisition);
        match self.water_fid(lin) {
            Some(w) => mrs.with_water(w.to_vec()),
            None => mrs,
        }
    }

    /// Mean spectrum (and water) over the voxels selected by `mask`.
    ///
    /// Voxels with a non-finite sample in their FID or water FID are left
    /// out of the mean; they still fail on their own when fitted.
    pub fn masked_average(&self, mask: &Mask) -> Result<Mrs, ConfigError> {
        let selected = mask.indices();
        if selected.is_empty() {
            return Err(ConfigError::EmptyMask);
        }
        let indices: Vec<usize> = selected
            .into_iter()
            .filter(|&lin| {
                let finite = is_finite(self.fid(lin)) && self.water_fid(lin).is_none_or(is_finite);
                if !finite {
                    debug!(voxel = lin, "non-finite samples, left out of the average");
                }
                finite
            })
            .collect();
        if indices.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "volume",
                reason: "every masked voxel has non-finite samples".into(),
            });
        }
        let fid = mean_over(&indices, self.points, |lin| self.fid(lin));
        let mrs = Mrs::new(fid, self.acquisition);
        Ok(match &self.water {
            Some(water) => {
                let p = self.points;
                mrs.with_water(mean_over(&indices, p, |lin| &water[lin * p..(lin + 1) * p]))
            }
            None => mrs,
        })
    }
}

fn is_finite(samples: &[Complex64]) -> bool {
    samples.iter().all(|v| v.re.is_finite() && v.im.is_finite())
}

fn mean_over<'v>(
    indices: &[usize],
    points: usize,
    source: impl Fn(usize) -> &'v [Complex64],
) -> Vec<Complex64> {
    let scale = 1.0 / indices.len() as f64;
    let mut acc = vec![Complex64::new(0.0, 0.0); points];
    for &lin in indices {
        for (a, v) in acc.iter_mut().zip(source(lin)) {
            *a += *v * scale;
        }
    }
    acc
}

fn check_len(what: &'static str, data: &[Complex64], dims: Dims, points: usize) -> Result<(), ConfigError> {
    let expected = voxel_count(dims) * points;
    if data.len() != expected {
        return Err(ConfigError::ShapeMismatch {
            what,
            got: vec![data.len()],
            expected: vec![expected],
        });
    }
    Ok(())
}

/// Voxel selection on the same grid as a `Volume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    dims: Dims,
    values: Vec<bool>,
}

impl Mask {
    pub fn new(dims: Dims, values: Vec<bool>) -> Result<Self, ConfigError> {
        if values.len() != voxel_count(dims) {
            return Err(ConfigError::ShapeMismatch {
                what: "mask",
                got: vec![values.len()],
                expected: vec![voxel_count(dims)],
            });
        }
        Ok(Self { dims, values })
    }

    /// Every voxel selected.
    pub fn full(dims: Dims) -> Self {
        Self {
            dims,
            values: vec![true; voxel_count(dims)],
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn contains(&self, lin: usize) -> bool {
        self.values.get(lin).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.values.iter().filter(|v| **v).count()
    }

    /// Selected linear indices in increasing order.
    pub fn indices(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.then_some(i))
            .collect()
    }
}

/// White matter, grey matter and CSF fraction maps.
#[derive(Debug, Clone, PartialEq)]
pub struct TissueVolumes {
    dims: Dims,
    wm: Vec<f64>,
    gm: Vec<f64>,
    csf: Vec<f64>,
}

impl TissueVolumes {
    pub fn new(dims: Dims, wm: Vec<f64>, gm: Vec<f64>, csf: Vec<f64>) -> Result<Self, ConfigError> {
        let n = voxel_count(dims);
        for (what, v) in [("wm fraction", &wm), ("gm fraction", &gm), ("csf fraction", &csf)] {
            if v.len() != n {
                return Err(ConfigError::ShapeMismatch {
                    what,
                    got: vec![v.len()],
                    expected: vec![n],
                });
            }
        }
        Ok(Self { dims, wm, gm, csf })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn at(&self, lin: usize) -> TissueFractions {
        TissueFractions::new(self.wm[lin], self.gm[lin], self.csf[lin])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip() {
        let dims = [3, 4, 5];
        assert_eq!(linear_index(dims, 0, 0, 1), 1);
        assert_eq!(linear_index(dims, 0, 1, 0), 5);
        assert_eq!(linear_index(dims, 1, 0, 0), 20);
        for lin in 0..voxel_count(dims) {
            let (x, y, z) = coords(dims, lin);
            assert_eq!(linear_index(dims, x, y, z), lin);
        }
    }

    #[test]
    fn shapes_are_checked() {
        let acq = Acquisition::new(1000.0, 123.2);
        let data = vec![Complex64::new(0.0, 0.0); 2 * 2 * 1 * 8];
        let vol = Volume::new([2, 2, 1], 8, data.clone(), acq).unwrap();
        assert!(vol.clone().with_water(data[..8].to_vec()).is_err());
        assert!(Volume::new([2, 2, 2], 8, data, acq).is_err());
        assert!(Mask::new([2, 2, 1], vec![true; 3]).is_err());
        assert!(TissueVolumes::new([1, 1, 1], vec![0.5], vec![0.5], vec![]).is_err());
    }

    #[test]
    fn masked_average_uses_selected_voxels_only() {
        let acq = Acquisition::new(1000.0, 123.2);
        let points = 4;
        let mut data = Vec::new();
        for v in 0..3 {
            data.extend(std::iter::repeat(Complex64::new(v as f64, 0.0)).take(points));
        }
        let vol = Volume::new([3, 1, 1], points, data, acq).unwrap();
        let mask = Mask::new([3, 1, 1], vec![false, true, true]).unwrap();
        let avg = vol.masked_average(&mask).unwrap();
        assert!(avg.fid.iter().all(|v| (v.re - 1.5).abs() < 1e-12));
        assert!(avg.water.is_none());

        let empty = Mask::new([3, 1, 1], vec![false; 3]).unwrap();
        assert_eq!(vol.masked_average(&empty).unwrap_err(), ConfigError::EmptyMask);
    }

    #[test]
    fn masked_average_skips_non_finite_voxels() {
        let acq = Acquisition::new(1000.0, 123.2);
        let points = 4;
        let mut data = Vec::new();
        for v in 0..3 {
            data.extend(std::iter::repeat(Complex64::new(v as f64, 0.0)).take(points));
        }
        data[points + 2] = Complex64::new(f64::NAN, 0.0);
        let mut water = vec![Complex64::new(10.0, 0.0); 3 * points];
        water[2 * points] = Complex64::new(0.0, f64::INFINITY);
        let vol = Volume::new([3, 1, 1], points, data, acq)
            .unwrap()
            .with_water(water)
            .unwrap();

        // Voxel 1 has a NaN FID sample and voxel 2 an infinite water sample.
        let avg = vol.masked_average(&Mask::full([3, 1, 1])).unwrap();
        assert!(avg.fid.iter().all(|v| v.re == 0.0 && v.im == 0.0));
        assert!(avg.water.unwrap().iter().all(|v| (v.re - 10.0).abs() < 1e-12));

        let bad_only = Mask::new([3, 1, 1], vec![false, true, true]).unwrap();
        assert!(matches!(
            vol.masked_average(&bad_only),
            Err(ConfigError::InvalidSetting { name: "volume", .. })
        ));
    }
}
