//! Relaxation and water-content constants for absolute quantification.

use std::collections::BTreeMap;

use crate::domain::{Acquisition, Basis, QuantificationConfig, TissueFractions};
use crate::error::ConfigError;

/// Molal concentration of pure water (mmol/kg).
pub const H2O_MOLALITY: f64 = 55.51e3;
/// Protons contributing to the water resonance.
pub const H2O_PROTONS: f64 = 2.0;

/// Relative water density per tissue (GM, WM, CSF).
pub const WATER_DENSITY: TissueTable = TissueTable {
    gm: 0.78,
    wm: 0.65,
    csf: 0.97,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TissueTable {
    pub gm: f64,
    pub wm: f64,
    pub csf: f64,
}

/// Default relaxation times in seconds at one field strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationTable {
    pub water_t1: TissueTable,
    pub water_t2: TissueTable,
    pub metab_t1: f64,
    pub metab_t2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStrength {
    ThreeTesla,
    SevenTesla,
}

impl FieldStrength {
    /// Spectrometers below 200 MHz use the 3T table.
    pub fn from_central_frequency(mhz: f64) -> Self {
        if mhz < 200.0 {
            FieldStrength::ThreeTesla
        } else {
            FieldStrength::SevenTesla
        }
    }

    pub fn relaxation(self) -> RelaxationTable {
        match self {
            FieldStrength::ThreeTesla => RelaxationTable {
                water_t1: TissueTable {
                    gm: 1.50,
                    wm: 0.97,
                    csf: 4.47,
                },
                water_t2: TissueTable {
                    gm: 0.088,
                    wm: 0.073,
                    csf: 2.03,
                },
                metab_t1: 1.29,
                metab_t2: 0.194,
            },
            FieldStrength::SevenTesla => RelaxationTable {
                water_t1: TissueTable {
                    gm: 2.05,
                    wm: 1.21,
                    csf: 4.43,
                },
                water_t2: TissueTable {
                    gm: 0.050,
                    wm: 0.055,
                    csf: 1.050,
                },
                metab_t1: 1.43,
                metab_t2: 0.151,
            },
        }
    }
}

/// `exp(-TE/T2) * (1 - exp(-TR/T1))`.
pub fn relaxation_attenuation(te: f64, tr: f64, t1: f64, t2: f64) -> f64 {
    (-te / t2).exp() * (1.0 - (-tr / t1).exp())
}

/// Everything absolute scaling needs for one voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantificationInfo {
    pub echo_time: Option<f64>,
    pub repetition_time: Option<f64>,
    pub field: FieldStrength,
    pub relaxation: RelaxationTable,
    pub t1_overrides: BTreeMap<String, f64>,
    pub t2_overrides: BTreeMap<String, f64>,
    pub ref_metab: String,
    pub ref_index: usize,
    pub ref_protons: f64,
    pub ref_limits: (f64, f64),
    pub water_limits: (f64, f64),
    pub tissue: Option<TissueFractions>,
    pub correction_factor: f64,
}

impl QuantificationInfo {
    pub fn new(
        config: &QuantificationConfig,
        acquisition: &Acquisition,
        basis: &Basis,
    ) -> Result<Self, ConfigError> {
        let ref_index = basis
            .index_of(&config.water_ref_metab)
            .ok_or_else(|| ConfigError::UnknownReference(config.water_ref_metab.clone()))?;
        let field = FieldStrength::from_central_frequency(acquisition.central_frequency);
        Ok(Self {
            echo_time: acquisition.echo_time,
            repetition_time: acquisition.repetition_time,
            field,
            relaxation: field.relaxation(),
            t1_overrides: config.t1.clone(),
            t2_overrides: config.t2.clone(),
            ref_metab: config.water_ref_metab.clone(),
            ref_index,
            ref_protons: config.water_ref_protons,
            ref_limits: config.ref_limits,
            water_limits: config.water_limits,
            tissue: None,
            correction_factor: config.correction_factor,
        })
    }

    pub fn with_tissue(mut self, tissue: Option<TissueFractions>) -> Self {
        self.tissue = tissue.and_then(|t| t.normalized());
        self
    }

    /// `(TE, TR)` when both are known.
    pub fn timing(&self) -> Option<(f64, f64)> {
        Some((self.echo_time?, self.repetition_time?))
    }

    /// Relaxation attenuation of a metabolite signal.
    pub fn metab_attenuation(&self, name: &str) -> Option<f64> {
        let (te, tr) = self.timing()?;
        let t1 = self
            .t1_overrides
            .get(name)
            .copied()
            .unwrap_or(self.relaxation.metab_t1);
        let t2 = self
            .t2_overrides
            .get(name)
            .copied()
            .unwrap_or(self.relaxation.metab_t2);
        Some(relaxation_attenuation(te, tr, t1, t2))
    }

    /// Relaxation attenuation of each tissue's water.
    pub fn water_attenuation(&self) -> Option<TissueTable> {
        let (te, tr) = self.timing()?;
        let t1 = self.relaxation.water_t1;
        let t2 = self.relaxation.water_t2;
        Some(TissueTable {
            gm: relaxation_attenuation(te, tr, t1.gm, t2.gm),
            wm: relaxation_attenuation(te, tr, t1.wm, t2.wm),
            csf: relaxation_attenuation(te, tr, t1.csf, t2.csf),
        })
    }

    /// Visible water concentration per litre of voxel (mM).
    ///
    /// Without tissue fractions the voxel is taken as half grey, half white
    /// matter.
    pub fn water_conc_molarity(&self) -> Option<f64> {
        let r = self.water_attenuation()?;
        let f = self
            .tissue
            .unwrap_or(TissueFractions::new(0.5, 0.5, 0.0));
        let d = WATER_DENSITY;
        Some(H2O_MOLALITY * (f.gm * d.gm * r.gm + f.wm * d.wm * r.wm + f.csf * d.csf * r.csf))
    }

    /// Visible water per kg of tissue water, CSF excluded (mM). Requires
    /// tissue fractions.
    pub fn water_conc_molality(&self) -> Option<f64> {
        let r = self.water_attenuation()?;
        let f = self.tissue?;
        let d = WATER_DENSITY;
        let total = f.gm * d.gm + f.wm * d.wm + f.csf * d.csf;
        if total <= 0.0 {
            return None;
        }
        let (gm, wm, csf) = (
            f.gm * d.gm / total,
            f.wm * d.wm / total,
            f.csf * d.csf / total,
        );
        if csf >= 1.0 {
            return None;
        }
        Some(H2O_MOLALITY * (gm * r.gm + wm * r.wm + csf * r.csf) / (1.0 - csf))
    }
}
