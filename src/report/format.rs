//! Formatted terminal output for single fits and volumetric runs.

use crate::domain::{FitConfig, Scaling};
use crate::fit::FitResult;
use crate::volume::RunOutput;

/// Per-metabolite table for one voxel: one column per available scaling.
pub fn format_fit_summary(result: &FitResult) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Algorithm: {} | converged={} | iterations={}",
        result.algorithm.display_name(),
        result.convergence.converged,
        result.convergence.iterations,
    ));
    if let Some(rate) = result.convergence.acceptance_rate {
        out.push_str(&format!(" | acceptance={rate:.3}"));
    }
    out.push('\n');
    out.push_str(&format!("Cost: {:.6e}\n\n", result.cost));

    let scalings: Vec<Scaling> = result.scalings().collect();
    let mut header = format!("{:<16}", "metabolite");
    let mut rule = format!("{:-<16}", "");
    for s in &scalings {
        header.push_str(&format!(" {:>12} {:>8}", s.label(), "%sd"));
        rule.push_str(&format!(" {:-<12} {:-<8}", "", ""));
    }
    header.push_str(&format!(" {:>8} {:>8}", "snr", "fwhm"));
    rule.push_str(&format!(" {:-<8} {:-<8}", "", ""));
    out.push_str(header.trim_end());
    out.push('\n');
    out.push_str(rule.trim_end());
    out.push('\n');

    for entry in result.visible_entries() {
        let mut row = format!("{:<16}", truncate(&entry.name, 16));
        for &s in &scalings {
            row.push_str(&format!(
                " {:>12} {:>8}",
                fmt_opt(result.concentration(&entry.name, s), 4),
                fmt_opt(result.percent_sd(&entry.name, s), 1),
            ));
        }
        row.push_str(&format!(
            " {:>8} {:>8}",
            fmt_opt(result.snr_of(&entry.name), 1),
            fmt_opt(result.fwhm_of(&entry.name), 2),
        ));
        out.push_str(row.trim_end());
        out.push('\n');
    }

    out
}

/// Overview of a volumetric run plus the fit table of the first fitted voxel.
pub fn format_run_summary(run: &RunOutput, config: &FitConfig) -> String {
    let s = &run.summary;
    let mut out = String::new();

    out.push_str("=== mrsfit - volumetric MRS fit ===\n");
    out.push_str(&format!(
        "Algorithm: {} | lineshape: {:?} | baseline order: {}\n",
        s.algorithm.display_name(),
        config.lineshape,
        config.baseline_order,
    ));
    out.push_str(&format!(
        "Window: [{:.2}, {:.2}] ppm\n",
        config.ppm_window.0, config.ppm_window.1
    ));
    out.push_str(&format!(
        "Grid: {}x{}x{} | masked={} | ok={} | failed={}\n",
        s.dims[0], s.dims[1], s.dims[2], s.masked, s.succeeded, s.failed
    ));
    out.push_str(&format!(
        "Workers: {} | average fit: {} | elapsed: {:.2}s\n",
        s.workers,
        if s.average_fit_used { "used" } else { "unavailable" },
        s.elapsed_secs,
    ));

    for err in run.failures().take(5) {
        out.push_str(&format!("  ! {err}\n"));
    }
    if s.failed > 5 {
        out.push_str(&format!("  ! ... and {} more\n", s.failed - 5));
    }

    if let Some((lin, result)) = run
        .outcomes
        .iter()
        .find_map(|(lin, o)| o.as_ref().ok().map(|r| (lin, r)))
    {
        out.push_str(&format!("\nFirst fitted voxel (index {lin}):\n"));
        out.push_str(&format_fit_summary(result));
    }

    out
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.decimals$}"),
        Some(_) => "inf".to_string(),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('.');
    out
}
