//! Fit quality metrics.

use num_complex::Complex64;

/// Relative uncertainty in percent.
///
/// A zero estimate with zero spread reports 0; a zero estimate with any
/// spread is unbounded.
pub fn percent_sd(value: f64, sd: f64) -> f64 {
    if value == 0.0 {
        if sd == 0.0 { 0.0 } else { f64::INFINITY }
    } else {
        100.0 * sd / value.abs()
    }
}

/// Sample standard deviation of the real part of the residual.
pub fn noise_sd(residual: &[Complex64]) -> f64 {
    let n = residual.len();
    if n < 2 {
        return 0.0;
    }
    let mean = residual.iter().map(|r| r.re).sum::<f64>() / n as f64;
    let var = residual
        .iter()
        .map(|r| (r.re - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    var.sqrt()
}

/// Peak height of the real spectrum over the residual noise level.
pub fn snr(spectrum: &[Complex64], residual: &[Complex64]) -> f64 {
    let peak = spectrum
        .iter()
        .map(|v| v.re)
        .fold(f64::NEG_INFINITY, f64::max);
    if !peak.is_finite() {
        return f64::NAN;
    }
    let noise = noise_sd(residual);
    if noise > 0.0 {
        peak / noise
    } else if peak > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Full width at half maximum (Hz) of the tallest real peak.
///
/// Crossings are linearly interpolated between samples; a peak that never
/// drops below half height on one side extends to the end of the axis.
pub fn fwhm_hz(spectrum: &[Complex64], frequency: &[f64]) -> f64 {
    let n = spectrum.len().min(frequency.len());
    if n < 2 {
        return f64::NAN;
    }
    let re: Vec<f64> = spectrum[..n].iter().map(|v| v.re).collect();
    let (peak_idx, peak) = re
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
    if !(peak.is_finite() && peak > 0.0) {
        return f64::NAN;
    }
    let half = peak / 2.0;

    let crossing = |a: usize, b: usize| -> f64 {
        let (ya, yb) = (re[a], re[b]);
        let frac = if ya == yb { 0.0 } else { (half - ya) / (yb - ya) };
        frequency[a] + frac * (frequency[b] - frequency[a])
    };

    let mut left = frequency[0];
    for i in (1..=peak_idx).rev() {
        if re[i - 1] < half {
            left = crossing(i - 1, i);
            break;
        }
    }
    let mut right = frequency[n - 1];
    for i in peak_idx..n - 1 {
        if re[i + 1] < half {
            right = crossing(i, i + 1);
            break;
        }
    }
    right - left
}
