//! Random-walk Metropolis-Hastings sampler.
//!
//! The likelihood marginalises the noise variance, giving the log posterior
//!
//! ```text
//! log p(x | y) = -(N/2) ln SSE(x) + Σ log prior(x)      (N = 2K real residuals)
//! ```
//!
//! Proposals are symmetric Gaussian moves of one parameter at a time. The
//! chain starts at a Newton solution and its proposal widths start at the
//! Newton CRLB standard deviations.

use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use crate::domain::{Algorithm, MhConfig, NewtonConfig};
use crate::error::FitError;
use crate::fit::newton;
use crate::fit::result::{Convergence, FitResult};
use crate::models::SpectralModel;

/// Relative floor for the initial proposal widths.
const PROPOSAL_FLOOR: f64 = 1e-3;

/// Reproducible per-voxel seed.
pub fn voxel_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Posterior summary of one chain.
#[derive(Debug, Clone)]
pub struct ChainSummary {
    pub mean: Vec<f64>,
    pub covariance: DMatrix<f64>,
    pub samples: usize,
    pub acceptance_rate: f64,
    pub iterations: usize,
}

/// Sample the posterior of one spectrum.
///
/// A Newton fit (started from `x0` when given) provides the chain's start
/// and the initial proposal widths.
pub fn fit(
    model: &SpectralModel<'_>,
    fid: &[Complex64],
    newton_config: &NewtonConfig,
    config: &MhConfig,
    x0: Option<&[f64]>,
    seed: u64,
) -> Result<FitResult, FitError> {
    let data = model.data_window(fid);
    if data.iter().any(|v| !(v.re.is_finite() && v.im.is_finite())) {
        return Err(FitError::NonFiniteData);
    }

    let start = newton::starting_point(model, &data, newton_config, x0)?;
    let pre = newton::minimize(model, &data, start, newton_config)?;
    let crlb = newton::crlb_covariance(model, &pre.params, pre.cost);
    let widths: Vec<f64> = pre
        .params
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let floor = PROPOSAL_FLOOR * x.abs().max(1e-2);
            let sd = crlb[(i, i)].sqrt();
            if sd.is_finite() && sd > floor { sd } else { floor }
        })
        .collect();

    let chain = sample(model, &data, pre.params, widths, config, seed)?;
    Ok(FitResult::from_model(
        model,
        &data,
        chain.mean,
        chain.covariance,
        Algorithm::Mh,
        Convergence {
            converged: pre.converged,
            iterations: chain.iterations,
            acceptance_rate: Some(chain.acceptance_rate),
        },
    ))
}

fn log_posterior(
    model: &SpectralModel<'_>,
    data: &[Complex64],
    x: &[f64],
    config: &MhConfig,
) -> f64 {
    let layout = model.layout();
    if config.use_priors && (0..x.len()).any(|i| layout.is_non_negative(i) && x[i] < 0.0) {
        return f64::NEG_INFINITY;
    }
    let sse = model.cost(data, x);
    if !sse.is_finite() {
        return f64::NEG_INFINITY;
    }
    let n = 2.0 * data.len() as f64;
    let mut lp = -0.5 * n * sse.max(f64::MIN_POSITIVE).ln();

    if config.use_priors {
        let priors = &config.priors;
        for g in 0..layout.n_groups {
            let z = (x[layout.gamma(g)] - priors.gamma.mean) / priors.gamma.sd;
            lp -= 0.5 * z * z;
            let z = (x[layout.eps(g)] - priors.eps.mean) / priors.eps.sd;
            lp -= 0.5 * z * z;
        }
    }
    lp
}

/// Run the chain from `start` with initial proposal widths `widths`.
pub fn sample(
    model: &SpectralModel<'_>,
    data: &[Complex64],
    start: Vec<f64>,
    mut widths: Vec<f64>,
    config: &MhConfig,
    seed: u64,
) -> Result<ChainSummary, FitError> {
    let p = start.len();
    if widths.len() != p {
        return Err(FitError::Sampler(format!(
            "{} proposal widths for {p} parameters",
            widths.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = start;
    let mut lp = log_posterior(model, data, &x, config);
    if !lp.is_finite() {
        return Err(FitError::Sampler("chain starts outside the posterior support".into()));
    }

    let total = config.burn_in + config.samples * config.thin;
    let mut accepted = vec![0usize; p];
    let mut rejected = vec![0usize; p];
    let mut kept_accepts = 0usize;
    let mut kept_proposals = 0usize;
    let mut chain: Vec<Vec<f64>> = Vec::with_capacity(config.samples);

    for iter in 0..total {
        let burning = iter < config.burn_in;
        for i in 0..p {
            let z: f64 = rng.sample(StandardNormal);
            let old = x[i];
            x[i] = old + widths[i] * z;
            let lp_new = log_posterior(model, data, &x, config);
            let u: f64 = rng.gen_range(0.0..1.0);
            if lp_new.is_finite() && u.ln() < lp_new - lp {
                lp = lp_new;
                accepted[i] += 1;
                if !burning {
                    kept_accepts += 1;
                }
            } else {
                x[i] = old;
                rejected[i] += 1;
            }
            if !burning {
                kept_proposals += 1;
            }
        }

        if burning && (iter + 1) % config.adapt_every == 0 {
            for i in 0..p {
                widths[i] *= ((1.0 + accepted[i] as f64) / (1.0 + rejected[i] as f64)).sqrt();
                accepted[i] = 0;
                rejected[i] = 0;
            }
        }

        if !burning && (iter - config.burn_in) % config.thin == 0 {
            chain.push(x.clone());
        }
    }

    if chain.is_empty() {
        return Err(FitError::Sampler("no samples were kept".into()));
    }

    let n = chain.len();
    let mut mean = vec![0.0; p];
    for s in &chain {
        for (m, v) in mean.iter_mut().zip(s) {
            *m += v / n as f64;
        }
    }
    let mut covariance = DMatrix::<f64>::zeros(p, p);
    if n > 1 {
        for s in &chain {
            for a in 0..p {
                let da = s[a] - mean[a];
                for b in a..p {
                    covariance[(a, b)] += da * (s[b] - mean[b]);
                }
            }
        }
        for a in 0..p {
            for b in a..p {
                let v = covariance[(a, b)] / (n - 1) as f64;
                covariance[(a, b)] = v;
                covariance[(b, a)] = v;
            }
        }
    }

    let acceptance_rate = if kept_proposals > 0 {
        kept_accepts as f64 / kept_proposals as f64
    } else {
        0.0
    };
    debug!(samples = n, acceptance_rate, "mh chain finished");

    Ok(ChainSummary {
        mean,
        covariance,
        samples: n,
        acceptance_rate,
        iterations: total,
    })
}
