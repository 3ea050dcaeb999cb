//! Concentration scaling.
//!
//! - internal referencing and water-referenced molarity/molality (`scale`)
//! - relaxation tables and water content (`info`)
//! - combined metabolite entries (`combine`)

pub mod combine;
pub mod info;
pub mod scale;

pub use combine::*;
pub use info::*;
pub use scale::*;

use num_complex::Complex64;

use crate::domain::FitConfig;
use crate::error::QuantifyError;
use crate::fit::FitResult;
use crate::models::SpectralModel;

/// Scale and combine one voxel's result as configured.
pub fn quantify_voxel(
    result: &mut FitResult,
    model: &SpectralModel<'_>,
    water: Option<&[Complex64]>,
    info: Option<&QuantificationInfo>,
    config: &FitConfig,
) -> Result<(), QuantifyError> {
    scale(result, model, water, info, &config.internal_reference)?;
    combine(result, &config.combine, config.keep_combined_components)
}
