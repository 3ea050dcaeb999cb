//! Command-line parsing for the `mrsfit` demo binary.
//!
//! Parsing and dispatch stay apart from the fitting code; `app` turns the
//! parsed arguments into a `FitConfig` and a synthetic dataset.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{Algorithm, LineshapeModel};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mrsfit", version, about = "Voxel-wise MRS spectral fitting and quantification")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a synthetic phantom volume and print the run report.
    Simulate(SimulateArgs),
    /// Print the default fit configuration as JSON.
    Config,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Grid size in voxels.
    #[arg(long, num_args = 3, value_names = ["NX", "NY", "NZ"], default_values_t = [4, 4, 1])]
    pub dims: Vec<usize>,

    /// Samples per FID.
    #[arg(long, default_value_t = 1024)]
    pub points: usize,

    /// Spectral width (Hz).
    #[arg(long, default_value_t = 4000.0)]
    pub bandwidth: f64,

    /// Spectrometer frequency (MHz).
    #[arg(long, default_value_t = 123.2)]
    pub cf: f64,

    /// Echo time (s).
    #[arg(long, default_value_t = 0.03)]
    pub te: f64,

    /// Repetition time (s).
    #[arg(long, default_value_t = 2.0)]
    pub tr: f64,

    /// Metabolites in the toy basis.
    #[arg(long, value_delimiter = ',', default_value = "NAA,Cr,PCr,GPC,Ins,Glu")]
    pub metabolites: Vec<String>,

    /// Time-domain noise standard deviation.
    #[arg(long, default_value_t = 0.5)]
    pub noise: f64,

    /// Seed for the phantom noise and the sampler. When absent the phantom
    /// uses its default seed and the sampler keeps the configured one.
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON configuration file; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fit engine.
    #[arg(long, value_enum)]
    pub algorithm: Option<Algorithm>,

    /// Lineshape model.
    #[arg(long, value_enum)]
    pub lineshape: Option<LineshapeModel>,

    /// Baseline polynomial order (-1 disables the baseline).
    #[arg(long, allow_negative_numbers = true)]
    pub baseline_order: Option<i32>,

    /// Worker threads (defaults to every available CPU).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Fit voxels one after another on the main thread.
    #[arg(long)]
    pub sequential: bool,

    /// Skip water-referenced (molar/molal) scaling.
    #[arg(long)]
    pub no_water: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_defaults_parse() {
        let cli = Cli::parse_from(["mrsfit", "simulate"]);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.dims, vec![4, 4, 1]);
        assert_eq!(args.metabolites.len(), 6);
        assert!(args.algorithm.is_none());
        assert!(args.seed.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::parse_from([
            "mrsfit", "-vv", "simulate", "--dims", "2", "3", "1", "--algorithm", "mh",
            "--baseline-order", "-1", "--metabolites", "NAA,Cr", "--sequential",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.dims, vec![2, 3, 1]);
        assert_eq!(args.algorithm, Some(Algorithm::Mh));
        assert_eq!(args.baseline_order, Some(-1));
        assert_eq!(args.metabolites, vec!["NAA".to_string(), "Cr".to_string()]);
        assert!(args.sequential);
    }
}
