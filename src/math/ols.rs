//! Small dense least-squares solvers.
//!
//! The spectral fit repeatedly solves little linear systems:
//!
//! ```text
//! minimize ||A x - b||^2          (unconstrained, SVD)
//! minimize ||A x - b||^2, x >= 0  (Lawson-Hanson NNLS, initial amplitudes)
//! ```
//!
//! Column counts are tiny (number of metabolites), so clarity wins over speed.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Moore-Penrose pseudo-inverse of a symmetric positive semi-definite matrix.
///
/// Singular directions (relative to the largest singular value) are dropped
/// rather than blowing up, which is what a covariance estimate wants when a
/// parameter is not identifiable.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let max_sv = m.clone().svd(false, false).singular_values.max();
    let eps = (max_sv * 1e-12).max(f64::MIN_POSITIVE);
    m.clone().pseudo_inverse(eps).ok()
}

/// Non-negative least squares (Lawson-Hanson active set).
pub fn solve_nnls(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = a.ncols();
    let mut x = DVector::<f64>::zeros(n);
    let mut passive = vec![false; n];
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0)
        * b.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
    let tol = 1e-12 * scale * a.nrows() as f64;

    let max_outer = 3 * n + 10;
    for _ in 0..max_outer {
        let w = a.transpose() * (b - a * &x);

        // Most promising inactive column.
        let candidate = (0..n)
            .filter(|&j| !passive[j])
            .max_by(|&i, &j| w[i].partial_cmp(&w[j]).unwrap_or(std::cmp::Ordering::Equal));
        let Some(j) = candidate else { break };
        if w[j] <= tol {
            break;
        }
        passive[j] = true;

        // Inner loop: keep the passive solution feasible.
        for _ in 0..(n + 1) {
            let cols: Vec<usize> = (0..n).filter(|&i| passive[i]).collect();
            if cols.is_empty() {
                break;
            }
            let sub = a.select_columns(&cols);
            let z_sub = solve_least_squares(&sub, b)?;

            if z_sub.iter().all(|&v| v > 0.0) {
                x.fill(0.0);
                for (k, &c) in cols.iter().enumerate() {
                    x[c] = z_sub[k];
                }
                break;
            }

            // Step towards z until the first passive variable hits zero.
            let mut alpha = f64::INFINITY;
            for (k, &c) in cols.iter().enumerate() {
                if z_sub[k] <= 0.0 {
                    let denom = x[c] - z_sub[k];
                    if denom > 0.0 {
                        alpha = alpha.min(x[c] / denom);
                    }
                }
            }
            if !alpha.is_finite() {
                alpha = 0.0;
            }
            for (k, &c) in cols.iter().enumerate() {
                x[c] += alpha * (z_sub[k] - x[c]);
            }
            for &c in &cols {
                if x[c] <= tol.min(1e-14) {
                    x[c] = 0.0;
                    passive[c] = false;
                }
            }
        }
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
