//! Step-size and covariance adaptation rules, run once per generation after
//! selection.

use crate::individual::Individual;
use crate::linalg::{norm, outer};
use crate::parameters::Parameters;
use ndarray::{Array1, Array2};

/// One-fifth rule factor
const ONE_FIFTH_FACTOR: f64 = 0.817;
/// Largest exponent accepted for a multiplicative step-size change
const MAX_LOG_STEP: f64 = 700.0;

/// Updates step size / covariance / evolution paths from the new parents.
pub trait ParameterAdapter: Send {
    fn adapt(&mut self, parents: &[Individual], params: &mut Parameters);
}

/// Leading `k` weights, renormalized.
fn leading_weights(weights: &Array1<f64>, k: usize) -> Array1<f64> {
    let head = weights.slice(ndarray::s![..k.min(weights.len())]).to_owned();
    let total = head.sum();
    if total > 0.0 {
        head / total
    } else {
        head
    }
}

/// Multiply sigma by `exp(log_step)`, repairing on overflow.
fn scale_sigma(params: &mut Parameters, log_step: f64) {
    if !log_step.is_finite() || log_step.abs() > MAX_LOG_STEP {
        params.repair("step-size exponent overflow");
        return;
    }
    params.sigma *= log_step.exp();
}

/// Rechenberg's one-fifth success rule for the (1+1)-ES.
#[derive(Clone, Copy, Debug, Default)]
pub struct OneFifthRule;

impl ParameterAdapter for OneFifthRule {
    fn adapt(&mut self, _parents: &[Individual], params: &mut Parameters) {
        params.generation += 1;
        if params.success {
            params.sigma /= ONE_FIFTH_FACTOR;
        } else {
            params.sigma *= ONE_FIFTH_FACTOR.powf(0.25);
        }
        params.sigma = params.sigma.max(f64::MIN_POSITIVE);
        params.sigma_mean = params.sigma;
    }
}

/// Rank-one plus rank-mu covariance matrix adaptation with cumulative
/// step-size adaptation.
///
/// With `params.active` the worst `mu` steps of the ranked pool are
/// subtracted as well. With `params.two_point` the step size follows the
/// two-point rule instead of the evolution path length.
#[derive(Clone, Copy, Debug, Default)]
pub struct CovarianceMatrixAdaptation;

impl CovarianceMatrixAdaptation {
    fn update_paths(params: &mut Parameters) -> f64 {
        let nf = params.n as f64;
        let cs = params.c_sigma;
        let cc = params.c_c;
        params.generation += 1;

        let step = (&params.wcm - &params.wcm_old) / params.sigma;
        let ps_rate = (cs * (2.0 - cs) * params.mu_eff).sqrt();
        params.p_sigma = &params.p_sigma * (1.0 - cs) + &(params.inv_sqrt_c.dot(&step) * ps_rate);

        let decay = 1.0 - (1.0 - cs).powi(2 * params.generation as i32);
        let hsig_ratio = norm(&params.p_sigma) / decay.max(f64::MIN_POSITIVE).sqrt() / params.chi_n;
        let hsig = if hsig_ratio < 1.4 + 2.0 / (nf + 1.0) { 1.0 } else { 0.0 };

        let pc_rate = hsig * (cc * (2.0 - cc) * params.mu_eff).sqrt();
        params.p_c = &params.p_c * (1.0 - cc) + &(step * pc_rate);
        hsig
    }

    fn update_covariance(parents: &[Individual], params: &mut Parameters, hsig: f64) {
        let cc = params.c_c;
        let c1 = params.c_1;
        let cmu = params.c_mu;
        let n = params.n;

        let weights = leading_weights(&params.weights, parents.len());
        let mut rank_mu = Array2::zeros((n, n));
        for (ind, &w) in parents.iter().zip(weights.iter()) {
            rank_mu.scaled_add(w, &outer(&ind.mutation_vector, &ind.mutation_vector));
        }

        let rank_one = outer(&params.p_c, &params.p_c) + &(&params.c * ((1.0 - hsig) * cc * (2.0 - cc)));
        params.c = &params.c * (1.0 - c1 - cmu) + &(rank_one * c1) + &(rank_mu * cmu);

        if params.active && params.ranked_y.len() >= 2 * params.mu {
            let mut negative = Array2::zeros((n, n));
            for (y, &w) in params.ranked_y.iter().rev().zip(params.weights.iter()) {
                negative.scaled_add(w, &outer(y, y));
            }
            params.c.scaled_add(-cmu, &negative);
        }
    }

    fn update_sigma(params: &mut Parameters) {
        match (params.two_point, params.tpa_result) {
            (true, Some(result)) => {
                let mut alpha_act = result * params.alpha;
                if result > 0.0 {
                    alpha_act += params.beta_tpa;
                }
                params.alpha_s += params.c_alpha * (alpha_act - params.alpha_s);
                let alpha_s = params.alpha_s;
                scale_sigma(params, alpha_s);
            }
            _ => {
                let ratio = norm(&params.p_sigma) / params.chi_n - 1.0;
                let log_step = ratio * params.c_sigma / params.d_sigma;
                scale_sigma(params, log_step);
            }
        }
    }
}

impl ParameterAdapter for CovarianceMatrixAdaptation {
    fn adapt(&mut self, parents: &[Individual], params: &mut Parameters) {
        let hsig = Self::update_paths(params);
        Self::update_covariance(parents, params, hsig);
        Self::update_sigma(params);
        params.sigma_mean = params.sigma;
        params.ensure_healthy();
    }
}

/// Success-probability step-size rule shared by the (1+1) Cholesky variants.
fn success_rule(params: &mut Parameters) {
    let success = if params.success { 1.0 } else { 0.0 };
    params.p_success = (1.0 - params.c_p) * params.p_success + params.c_p * success;
    let log_step = (params.p_success - params.p_target) / (params.d_one * (1.0 - params.p_target));
    scale_sigma(params, log_step);
}

/// Evolution path update after a successful mutation `y = A·z`.
fn update_cholesky_path(params: &mut Parameters, y: &Array1<f64>) {
    let c = params.c_a;
    params.p_c = &params.p_c * (1.0 - c) + &(y * (c * (2.0 - c)).sqrt());
}

/// Rank-one update of `A` and `A_inv` towards the evolution path.
fn positive_cholesky_update(params: &mut Parameters, c_cov: f64) {
    let w = params.a_inv.dot(&params.p_c);
    let w_sq = w.dot(&w);
    if w_sq <= 0.0 {
        return;
    }
    let a = (1.0 - c_cov).sqrt();
    let r = (1.0 + c_cov * w_sq / (1.0 - c_cov)).sqrt();

    let a_update = outer(&params.p_c, &w) * (a / w_sq * (r - 1.0));
    let w_t_ainv = w.dot(&params.a_inv);
    let inv_update = outer(&w, &w_t_ainv) * ((1.0 - 1.0 / r) / (a * w_sq));

    params.a = &params.a * a + &a_update;
    params.a_inv = &params.a_inv / a - &inv_update;
}

/// Rank-one reduction of the variance along `A·z`.
fn negative_cholesky_update(params: &mut Parameters, z: &Array1<f64>, c_cov_neg: f64) {
    let z_sq = z.dot(z);
    if z_sq <= 0.0 {
        return;
    }
    let mut c_neg = c_cov_neg;
    if 1.0 < c_neg * (2.0 * z_sq - 1.0) {
        c_neg = 1.0 / (2.0 * z_sq - 1.0);
    }
    let r_sq = 1.0 - c_neg * z_sq / (1.0 + c_neg);
    if r_sq <= 0.0 {
        return;
    }
    let a = (1.0 + c_neg).sqrt();
    let r = r_sq.sqrt();

    let az = params.a.dot(z);
    let a_update = outer(&az, z) * (a / z_sq * (r - 1.0));
    let z_t_ainv = z.dot(&params.a_inv);
    let inv_update = outer(z, &z_t_ainv) * ((1.0 / r - 1.0) / (a * z_sq));

    params.a = &params.a * a + &a_update;
    params.a_inv = &params.a_inv / a + &inv_update;
}

fn check_cholesky(params: &mut Parameters) {
    if params.is_degenerate() {
        params.repair("non-finite Cholesky factor or sigma out of range");
    }
    params.sigma_mean = params.sigma;
}

/// (1+1)-CMA-ES with incremental Cholesky factor updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct CholeskyAdaptation;

impl ParameterAdapter for CholeskyAdaptation {
    fn adapt(&mut self, _parents: &[Individual], params: &mut Parameters) {
        params.generation += 1;
        success_rule(params);
        if params.success {
            if params.p_success < params.p_thresh {
                if let Some(y) = params.ranked_y.first().cloned() {
                    update_cholesky_path(params, &y);
                    let c_cov = params.c_cov;
                    positive_cholesky_update(params, c_cov);
                }
            } else {
                params.p_c *= 1.0 - params.c_a;
            }
        }
        check_cholesky(params);
    }
}

/// (1+1)-CMA-ES with active covariance reduction: successful steps grow the
/// distribution along the evolution path, steps worse than the fifth-order
/// ancestor shrink it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActiveCholeskyAdaptation;

impl ParameterAdapter for ActiveCholeskyAdaptation {
    fn adapt(&mut self, _parents: &[Individual], params: &mut Parameters) {
        params.generation += 1;
        success_rule(params);
        if params.success {
            if params.p_success < params.p_thresh {
                if let Some(y) = params.ranked_y.first().cloned() {
                    update_cholesky_path(params, &y);
                    let c_cov = params.c_cov_pos;
                    positive_cholesky_update(params, c_cov);
                }
            } else {
                params.p_c *= 1.0 - params.c_a;
            }
        } else if params.worse_than_ancestor {
            if let Some(z) = params.ranked_z.first().cloned() {
                let c_cov = params.c_cov_neg;
                negative_cholesky_update(params, &z, c_cov);
            }
        }
        check_cholesky(params);
    }
}

/// Covariance matrix self-adaptation (CMSA-ES).
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfAdaptiveAdaptation;

impl ParameterAdapter for SelfAdaptiveAdaptation {
    fn adapt(&mut self, parents: &[Individual], params: &mut Parameters) {
        params.generation += 1;
        if parents.is_empty() {
            return;
        }
        let n = params.n;
        let weights = leading_weights(&params.weights, parents.len());
        let mut rank_mu = Array2::zeros((n, n));
        let mut sigma_mean = 0.0;
        for (ind, &w) in parents.iter().zip(weights.iter()) {
            rank_mu.scaled_add(w, &outer(&ind.mutation_vector, &ind.mutation_vector));
            sigma_mean += w * ind.sigma;
        }
        let rate = 1.0 / params.tau_c;
        params.c = &params.c * (1.0 - rate) + &(rank_mu * rate);
        params.sigma_mean = sigma_mean;
        params.sigma = sigma_mean;
        params.ensure_healthy();
    }
}
