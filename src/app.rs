//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - builds a synthetic phantom from a toy basis
//! - runs the volumetric fit and hands the maps to a sink
//! - prints the run report

use clap::Parser;
use tracing::{info, warn};

use crate::cli::{Cli, Command, SimulateArgs};
use crate::data::{PhantomSpec, build_phantom, singlet_basis};
use crate::domain::{Acquisition, FitConfig, QuantificationConfig, Scaling};
use crate::error::AppError;
use crate::volume::{MemorySink, RunOutput};

/// Entry point for the `mrsfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    crate::logging::init(cli.verbose);

    match cli.command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Config => handle_config(),
    }
}

fn handle_config() -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(&FitConfig::default())
        .map_err(|e| AppError::new(4, format!("Could not serialize config: {e}")))?;
    println!("{text}");
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let acq = Acquisition::new(args.bandwidth, args.cf).with_timing(args.te, args.tr);
    let names: Vec<&str> = args.metabolites.iter().map(String::as_str).collect();
    let basis = singlet_basis(&names, args.points, &acq)?;
    let config = fit_config_from_args(&args, basis.names())?;

    let spec = PhantomSpec {
        dims: dims_from_args(&args.dims)?,
        noise_sd: args.noise,
        seed: args.seed.unwrap_or(PhantomSpec::default().seed),
        ..PhantomSpec::default()
    };
    let phantom = build_phantom(&basis, &acq, &spec)?;
    info!(voxels = phantom.mask.count(), "phantom ready");

    let run = crate::volume::run(
        &phantom.volume,
        &phantom.mask,
        &basis,
        &config,
        Some(&phantom.tissue),
    )?;

    let mut sink = MemorySink::default();
    if let Err(never) = run
        .volumes
        .write_to(&mut sink, &crate::report::config_record(&config))
    {
        match never {}
    }

    println!("{}", crate::report::format_run_summary(&run, &config));
    println!("{}", format_recovery(&run, &phantom.truth, basis.names()));
    println!(
        "Sink received {} maps and {} spectral volumes.",
        sink.maps.len(),
        sink.spectra.len()
    );
    Ok(())
}

/// Start from the config file (or defaults) and apply the CLI overrides.
pub fn fit_config_from_args(args: &SimulateArgs, basis_names: &[String]) -> Result<FitConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                AppError::new(2, format!("Could not read config {}: {e}", path.display()))
            })?;
            FitConfig::from_json_str(&text)?
        }
        None => FitConfig::default(),
    };

    if let Some(a) = args.algorithm {
        config.algorithm = a;
    }
    if let Some(l) = args.lineshape {
        config.lineshape = l;
    }
    if let Some(b) = args.baseline_order {
        config.baseline_order = b;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.sequential {
        config.parallel = false;
    }
    if let Some(seed) = args.seed {
        config.mh.seed = seed;
    }

    if args.no_water {
        config.quantification = None;
    } else if config.quantification.is_none() {
        // Reference water to the first internal reference the basis carries.
        match config
            .internal_reference
            .iter()
            .find(|r| basis_names.contains(*r))
        {
            Some(reference) => {
                config.quantification = Some(QuantificationConfig {
                    water_ref_metab: reference.clone(),
                    water_ref_protons: 3.0,
                    ref_limits: (2.8, 3.2),
                    ..QuantificationConfig::default()
                });
            }
            None => warn!("no internal reference in the basis, skipping water scaling"),
        }
    }

    config.validate()?;
    Ok(config)
}

fn dims_from_args(dims: &[usize]) -> Result<[usize; 3], AppError> {
    <[usize; 3]>::try_from(dims)
        .map_err(|_| AppError::new(2, format!("--dims needs three values, got {}", dims.len())))
}

/// Mean relative error of the raw amplitudes against the phantom truth.
fn format_recovery(run: &RunOutput, truth: &[Vec<f64>], names: &[String]) -> String {
    let mut out = String::from("Raw amplitude recovery (mean |fit - true| / true):\n");
    for (j, name) in names.iter().enumerate() {
        let errors: Vec<f64> = run
            .outcomes
            .iter()
            .filter_map(|(&lin, o)| {
                let fitted = o.as_ref().ok()?.concentration(name, Scaling::Raw)?;
                let expected = *truth.get(lin)?.get(j)?;
                (expected != 0.0).then(|| ((fitted - expected) / expected).abs())
            })
            .collect();
        if errors.is_empty() {
            out.push_str(&format!("  {name:<12} -\n"));
        } else {
            let mean = errors.iter().sum::<f64>() / errors.len() as f64;
            out.push_str(&format!("  {name:<12} {:.2}%\n", 100.0 * mean));
        }
    }
    out
}
