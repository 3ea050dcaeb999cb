//! Damped Gauss-Newton (Levenberg-Marquardt) least squares.
//!
//! Each iteration solves
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr
//! ```
//!
//! and projects amplitudes and widths back onto `>= 0`. A step that lowers
//! the cost is accepted and λ shrinks; otherwise λ grows and the step is
//! retried from the same point. Uncertainties are Cramér-Rao bounds from the
//! Jacobian at the solution.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use tracing::debug;

use crate::domain::{Algorithm, NewtonConfig};
use crate::error::FitError;
use crate::fit::init::initial_guess;
use crate::fit::result::{Convergence, FitResult};
use crate::math::{pseudo_inverse, solve_least_squares};
use crate::models::SpectralModel;

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

/// Raw optimiser output before it is turned into a `FitResult`.
#[derive(Debug, Clone)]
pub struct NewtonOutcome {
    pub params: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Fit one spectrum and report CRLB uncertainties.
///
/// `x0` replaces the default initial guess (typically the fit of the
/// mask-averaged spectrum).
pub fn fit(
    model: &SpectralModel<'_>,
    fid: &[Complex64],
    config: &NewtonConfig,
    x0: Option<&[f64]>,
) -> Result<FitResult, FitError> {
    let data = model.data_window(fid);
    if data.iter().any(|v| !(v.re.is_finite() && v.im.is_finite())) {
        return Err(FitError::NonFiniteData);
    }
    let start = starting_point(model, &data, config, x0)?;
    let outcome = minimize(model, &data, start, config)?;
    let covariance = crlb_covariance(model, &outcome.params, outcome.cost);

    Ok(FitResult::from_model(
        model,
        &data,
        outcome.params,
        covariance,
        Algorithm::Newton,
        Convergence {
            converged: outcome.converged,
            iterations: outcome.iterations,
            acceptance_rate: None,
        },
    ))
}

/// Validated `x0`, or the NNLS-based default.
pub fn starting_point(
    model: &SpectralModel<'_>,
    data: &[Complex64],
    config: &NewtonConfig,
    x0: Option<&[f64]>,
) -> Result<Vec<f64>, FitError> {
    let expected = model.layout().len();
    match x0 {
        Some(x0) if x0.len() != expected => Err(FitError::InitialGuessLength {
            got: x0.len(),
            expected,
        }),
        Some(x0) => {
            let mut start = x0.to_vec();
            model.layout().project(&mut start);
            Ok(start)
        }
        None => initial_guess(model, data, config),
    }
}

/// Run the damped Gauss-Newton iterations from `start`.
pub fn minimize(
    model: &SpectralModel<'_>,
    data: &[Complex64],
    start: Vec<f64>,
    config: &NewtonConfig,
) -> Result<NewtonOutcome, FitError> {
    let layout = model.layout();
    let mut x = start;
    layout.project(&mut x);
    let mut cost = model.cost(data, &x);
    if !cost.is_finite() {
        return Err(FitError::Singular(0));
    }

    let energy: f64 = data.iter().map(|v| v.norm_sqr()).sum();
    let cost_floor = f64::EPSILON * f64::EPSILON * energy.max(f64::MIN_POSITIVE);

    let mut lambda = config.lambda0;
    let mut iterations = 0;
    let mut converged = false;
    let mut normal: Option<(DMatrix<f64>, DVector<f64>)> = None;

    while iterations < config.max_iters {
        if cost <= cost_floor {
            converged = true;
            break;
        }
        iterations += 1;

        // Normal equations are rebuilt only after an accepted step.
        let (jtj, jtr) = normal.get_or_insert_with(|| {
            let jac = model.jacobian(&x);
            let r = model.residual_vector(data, &x);
            (jac.tr_mul(&jac), jac.tr_mul(&r))
        });

        let Some(delta) = damped_step(jtj, jtr, lambda) else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                return Err(FitError::Singular(iterations));
            }
            continue;
        };

        let mut trial: Vec<f64> = x.iter().zip(delta.iter()).map(|(a, d)| a + d).collect();
        layout.project(&mut trial);
        let trial_cost = model.cost(data, &trial);

        if trial_cost.is_finite() && trial_cost < cost {
            let step: f64 = x
                .iter()
                .zip(&trial)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            let size: f64 = x.iter().map(|a| a * a).sum::<f64>().sqrt();
            let decrease = cost - trial_cost;

            x = trial;
            let previous = cost;
            cost = trial_cost;
            normal = None;
            lambda = (lambda / 10.0).max(LAMBDA_MIN);

            if step <= config.xtol * (config.xtol + size) || decrease <= config.ftol * previous {
                converged = true;
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No descent direction left: the current point is a minimum
                // as far as the damped model can tell.
                converged = true;
                break;
            }
        }
    }

    debug!(iterations, cost, converged, "newton finished");
    Ok(NewtonOutcome {
        params: x,
        cost,
        iterations,
        converged,
    })
}

/// Solve the damped normal equations, falling back to SVD when the
/// Cholesky factorisation fails.
fn damped_step(jtj: &DMatrix<f64>, jtr: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut a = jtj.clone();
    let max_diag = jtj.diagonal().amax().max(f64::MIN_POSITIVE);
    for i in 0..a.nrows() {
        // Columns with no sensitivity still get a little damping.
        let d = jtj[(i, i)].max(1e-12 * max_diag);
        a[(i, i)] += lambda * d;
    }
    let step = match a.clone().cholesky() {
        Some(chol) => chol.solve(jtr),
        None => solve_least_squares(&a, jtr)?,
    };
    step.iter().all(|v| v.is_finite()).then_some(step)
}

/// `s²·pinv(JᵀJ)` with `s² = SSE / (2K - P)`.
pub fn crlb_covariance(model: &SpectralModel<'_>, params: &[f64], cost: f64) -> DMatrix<f64> {
    let p = params.len();
    let jac = model.jacobian(params);
    let jtj = jac.tr_mul(&jac);
    let dof = jac.nrows().saturating_sub(p).max(1);
    let s2 = cost / dof as f64;
    match pseudo_inverse(&jtj) {
        Some(inv) => inv * s2,
        None => DMatrix::from_element(p, p, f64::NAN),
    }
}
