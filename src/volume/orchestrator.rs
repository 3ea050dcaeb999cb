//! Masked fan-out of per-voxel fits over a worker pool.
//!
//! A run moves through
//!
//! ```text
//! Init -> AverageFit -> Dispatch -> Running -> Gather -> Done
//! ```
//!
//! Every configuration and shape problem is reported in `Init`, before any
//! fitting. Voxel failures (errors or panics) are recorded per voxel and never
//! stop the run. Results are keyed by voxel index, so the output does not
//! depend on the number of workers or on completion order.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{Algorithm, Basis, FitConfig, Mrs, TissueFractions};
use crate::error::{ConfigError, FitError, RunError, VoxelError};
use crate::fit::{FitResult, fit_voxel, newton};
use crate::models::{ModelOptions, SpectralModel};
use crate::quantify::{QuantificationInfo, quantify_voxel, resolve_internal_refs};
use crate::volume::container::{Mask, TissueVolumes, Volume, coords};
use crate::volume::output::{Outcomes, OutputVolumes};
use crate::volume::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    AverageFit,
    Dispatch,
    Running,
    Gather,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::AverageFit => "average-fit",
            RunState::Dispatch => "dispatch",
            RunState::Running => "running",
            RunState::Gather => "gather",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// One dispatched voxel.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub index: usize,
    pub coords: (usize, usize, usize),
    pub mrs: Mrs,
    pub tissue: Option<TissueFractions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub algorithm: Algorithm,
    pub dims: [usize; 3],
    pub masked: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub workers: usize,
    pub average_fit_used: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug)]
pub struct RunOutput {
    pub outcomes: Outcomes,
    pub volumes: OutputVolumes,
    /// Parameters of the mask-average fit, when it succeeded.
    pub x0: Option<Vec<f64>>,
    pub summary: RunSummary,
}

impl RunOutput {
    pub fn failures(&self) -> impl Iterator<Item = &VoxelError> {
        self.outcomes.values().filter_map(|o| o.as_ref().err())
    }
}

fn enter(state: RunState) {
    info!(state = %state, "run state");
}

/// Fit, quantify and combine every masked voxel of `volume`.
pub fn run(
    volume: &Volume,
    mask: &Mask,
    basis: &Basis,
    config: &FitConfig,
    tissue: Option<&TissueVolumes>,
) -> Result<RunOutput, RunError> {
    let started = Instant::now();

    enter(RunState::Init);
    let acquisition = *volume.acquisition();
    let options = validate(volume, mask, basis, config, tissue)?;
    let model = SpectralModel::with_options(basis, &acquisition, &options)?;
    let base_info = config
        .quantification
        .as_ref()
        .map(|q| QuantificationInfo::new(q, &acquisition, basis))
        .transpose()?;
    let workers = config
        .workers
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));

    enter(RunState::AverageFit);
    let average = volume
        .masked_average(mask)
        .map_err(FitError::from)
        .and_then(|average| newton::fit(&model, &average.fid, &config.newton, None));
    let x0 = match average {
        Ok(result) => {
            debug!(cost = result.cost, converged = result.convergence.converged, "average fit");
            Some(result.params)
        }
        Err(err) => {
            warn!(error = %err, "average fit failed, voxels start from the default guess");
            None
        }
    };

    enter(RunState::Dispatch);
    let units: Vec<WorkUnit> = mask
        .indices()
        .into_iter()
        .map(|index| WorkUnit {
            index,
            coords: coords(volume.dims(), index),
            mrs: volume.voxel(index),
            tissue: tissue.map(|t| t.at(index)),
        })
        .collect();
    info!(voxels = units.len(), workers, parallel = config.parallel, "dispatching");

    enter(RunState::Running);
    let progress = Progress::new(units.len());
    let job = |unit: &WorkUnit| -> (usize, Result<FitResult, VoxelError>) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            process_voxel(unit, &model, config, x0.as_deref(), base_info.as_ref())
        }))
        .unwrap_or_else(|payload| {
            Err(VoxelError::Panicked {
                index: unit.index,
                message: panic_message(payload.as_ref()),
            })
        });
        progress.inc();
        (unit.index, outcome)
    };

    let results: Vec<(usize, Result<FitResult, VoxelError>)> = if config.parallel {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        pool.install(|| units.par_iter().map(job).collect())
    } else {
        units.iter().map(job).collect()
    };

    enter(RunState::Gather);
    let outcomes: Outcomes = results.into_iter().collect();
    for err in outcomes.values().filter_map(|o| o.as_ref().err()) {
        warn!(voxel = err.index(), error = %err, "voxel failed");
    }
    let volumes = OutputVolumes::gather(volume.dims(), model.window().len(), &outcomes);
    let failed = outcomes.values().filter(|o| o.is_err()).count();

    let summary = RunSummary {
        algorithm: config.algorithm,
        dims: volume.dims(),
        masked: outcomes.len(),
        succeeded: outcomes.len() - failed,
        failed,
        workers: if config.parallel { workers } else { 1 },
        average_fit_used: x0.is_some(),
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    enter(RunState::Done);
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        elapsed_secs = summary.elapsed_secs,
        "run finished"
    );

    Ok(RunOutput {
        outcomes,
        volumes,
        x0,
        summary,
    })
}

/// Every check that can fail before compute starts.
fn validate(
    volume: &Volume,
    mask: &Mask,
    basis: &Basis,
    config: &FitConfig,
    tissue: Option<&TissueVolumes>,
) -> Result<ModelOptions, ConfigError> {
    config.validate()?;
    if mask.dims() != volume.dims() {
        return Err(ConfigError::ShapeMismatch {
            what: "mask",
            got: mask.dims().to_vec(),
            expected: volume.dims().to_vec(),
        });
    }
    if let Some(t) = tissue {
        if t.dims() != volume.dims() {
            return Err(ConfigError::ShapeMismatch {
                what: "tissue fractions",
                got: t.dims().to_vec(),
                expected: volume.dims().to_vec(),
            });
        }
    }
    if mask.count() == 0 {
        return Err(ConfigError::EmptyMask);
    }
    basis.check_matches(volume.points(), volume.acquisition())?;
    resolve_internal_refs(basis, &config.internal_reference)?;
    for group in &config.combine {
        if let Some(unknown) = group.iter().find(|name| basis.index_of(name).is_none()) {
            return Err(ConfigError::UnknownCombineName(unknown.clone()));
        }
    }
    ModelOptions::from_config(config, basis.len())
}

/// Fit, scale and combine one voxel.
pub fn process_voxel(
    unit: &WorkUnit,
    model: &SpectralModel<'_>,
    config: &FitConfig,
    x0: Option<&[f64]>,
    base_info: Option<&QuantificationInfo>,
) -> Result<FitResult, VoxelError> {
    let index = unit.index;
    let mut result = fit_voxel(model, &unit.mrs.fid, config, x0, index)
        .map_err(|source| VoxelError::Fit { index, source })?;

    let info = base_info.map(|i| i.clone().with_tissue(unit.tissue));
    quantify_voxel(
        &mut result,
        model,
        unit.mrs.water.as_deref(),
        info.as_ref(),
        config,
    )
    .map_err(|source| VoxelError::Quantify { index, source })?;
    Ok(result)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(RunState::AverageFit.to_string(), "average-fit");
        assert_eq!(RunState::Done.to_string(), "done");
    }

    fn static_panic() -> usize {
        panic!("bad voxel")
    }

    fn formatted_panic() -> usize {
        panic!("{} {}", "bad", 7)
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = catch_unwind(static_panic).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "bad voxel");
        let err = catch_unwind(formatted_panic).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "bad 7");
    }
}
