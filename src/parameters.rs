//! Mutable optimizer state shared by every strategy of one run.

use crate::config::{EsOptions, PopulationSizes, ResolvedOptions, RestartMode, SelectionKind, WeightScheme};
use crate::error::{EsError, EsResult};
use crate::linalg::{all_finite, compose, symmetric_eigen, symmetrize};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Smallest eigenvalue kept when clipping the covariance matrix
pub const EIGEN_FLOOR: f64 = 1e-20;
/// Step sizes outside `(SIGMA_MIN, SIGMA_MAX)` count as degenerate
pub const SIGMA_MIN: f64 = 1e-16;
pub const SIGMA_MAX: f64 = 1e16;
/// Default per-coordinate search bounds used by the threshold schedule
pub const DEFAULT_BOUNDS: (f64, f64) = (-5.0, 5.0);
/// Number of parent fitness values remembered by the active (1+1) variant
pub const ANCESTOR_DEPTH: usize = 5;

/// Population regime of a BIPOP run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopulationRegime {
    Small,
    #[default]
    Large,
}

/// Generations allotted to a regime before a budget-triggered restart.
pub fn max_iter(n: usize, lambda: usize) -> f64 {
    let n3 = (n + 3) as f64;
    100.0 + 50.0 * n3 * n3 / (lambda.max(1) as f64).sqrt()
}

/// Evaluations allotted to a `lambda`-sized regime.
pub fn regime_budget(n: usize, lambda: usize) -> usize {
    (max_iter(n, lambda) * lambda as f64).ceil() as usize
}

/// Recombination weights for `mu` parents out of `lambda` offspring,
/// non-negative and summing to one.
pub fn recombination_weights(scheme: WeightScheme, mu: usize, lambda: usize) -> Array1<f64> {
    let mu = mu.max(1);
    let raw: Array1<f64> = match scheme {
        WeightScheme::LogLinear => {
            // With mu close to lambda the plain log-linear weights turn
            // negative; the base never drops below mu + 1/2.
            let base = ((lambda as f64 + 1.0) / 2.0).max(mu as f64 + 0.5).ln();
            (1..=mu).map(|i| base - (i as f64).ln()).collect()
        }
        WeightScheme::Equal => Array1::from_elem(mu, 1.0 / mu as f64),
        WeightScheme::Halving => {
            let rest = 0.5f64.powi(mu as i32) / mu as f64;
            (1..=mu).map(|i| 0.5f64.powi(i as i32) + rest).collect()
        }
    };
    let total = raw.sum();
    raw / total
}

/// All state of one optimization run.
#[derive(Clone, Debug)]
pub struct Parameters {
    pub n: usize,
    pub budget: usize,
    pub mu: usize,
    pub lambda: usize,
    pub selection: SelectionKind,
    pub elitist: bool,
    pub active: bool,
    pub two_point: bool,
    pub sequential: bool,
    pub weight_scheme: WeightScheme,

    // Step size
    pub sigma: f64,
    /// Value `sigma` is reset to on degeneracy (changes on BIPOP restarts)
    pub sigma_init: f64,
    /// User-supplied initial step size
    pub sigma0: f64,
    /// Reported step size; differs from `sigma` for self-adaptation only
    pub sigma_mean: f64,

    // Distribution
    pub wcm: Array1<f64>,
    pub wcm_old: Array1<f64>,
    pub c: Array2<f64>,
    pub b: Array2<f64>,
    pub d: Array1<f64>,
    pub inv_sqrt_c: Array2<f64>,
    /// Cholesky factor of C and its inverse, (1+1) Cholesky variants
    pub a: Array2<f64>,
    pub a_inv: Array2<f64>,
    pub p_sigma: Array1<f64>,
    pub p_c: Array1<f64>,

    // Learning rates
    pub weights: Array1<f64>,
    pub mu_eff: f64,
    pub c_sigma: f64,
    pub d_sigma: f64,
    pub c_c: f64,
    pub c_1: f64,
    pub c_mu: f64,
    pub chi_n: f64,

    /// Mutation vectors (`y`) of the last ranked selection pool, best first
    pub ranked_y: Vec<Array1<f64>>,
    /// Raw samples (`z`) of the last ranked selection pool, best first
    pub ranked_z: Vec<Array1<f64>>,
    /// Fitness values of the last ranked selection pool, best first
    pub ranked_fitness: Vec<f64>,
    /// Generations since the last (re)start
    pub generation: usize,

    // Budget
    pub used_budget: usize,
    pub used_budget_at_last_restart: usize,
    pub restart_budget: usize,

    // Restarts
    pub restart_mode: RestartMode,
    pub last_pop: PopulationRegime,
    pub mu_orig: usize,
    pub lambda_orig: usize,
    pub lambda_large: usize,
    pub lambda_small: usize,
    pub restarts: usize,

    // Two-point step-size adaptation
    pub tpa_factor: f64,
    pub tpa_result: Option<f64>,
    pub alpha: f64,
    pub beta_tpa: f64,
    pub c_alpha: f64,
    pub alpha_s: f64,

    pub seq_cutoff: usize,
    pub count_degenerations: usize,

    // Threshold convergence
    pub threshold: f64,
    pub diameter: f64,
    pub init_threshold: f64,
    pub decay_factor: f64,

    // (1+1) bookkeeping
    pub success: bool,
    /// Offspring was worse than the `ANCESTOR_DEPTH`-th ancestor (active (1+1))
    pub worse_than_ancestor: bool,
    pub ancestor_fitness: VecDeque<f64>,
    pub p_success: f64,
    pub p_target: f64,
    pub p_thresh: f64,
    pub c_p: f64,
    pub c_cov: f64,
    pub c_cov_pos: f64,
    pub c_cov_neg: f64,
    /// Step-size damping of the (1+1) Cholesky variants
    pub d_one: f64,
    /// Evolution path learning rate of the (1+1) Cholesky variants
    pub c_a: f64,

    // Self-adaptation
    pub tau: f64,
    pub tau_c: f64,

    // Stagnation histories
    pub best_history: VecDeque<f64>,
    pub median_history: VecDeque<f64>,
}

impl Parameters {
    /// State for `mu`/`lambda` with default options.
    pub fn new(n: usize, budget: usize, mu: usize, lambda: usize) -> EsResult<Self> {
        let options = EsOptions {
            mu: Some(mu),
            lambda: Some(lambda),
            ..Default::default()
        };
        Self::from_resolved(&options.resolve(n)?, budget)
    }

    pub fn from_resolved(resolved: &ResolvedOptions, budget: usize) -> EsResult<Self> {
        if budget == 0 {
            return Err(EsError::InvalidConfig("budget must be positive".into()));
        }
        let opts = &resolved.options;
        let n = resolved.n;
        let nf = n as f64;
        let lambda = resolved.lambda;
        let mu = resolved.mu;
        let (lb, ub) = DEFAULT_BOUNDS;
        let diameter = (nf * (ub - lb).powi(2)).sqrt();

        let mut params = Self {
            n,
            budget,
            mu,
            lambda,
            selection: opts.selection,
            elitist: opts.elitism,
            active: opts.active,
            two_point: opts.two_point,
            sequential: opts.sequential,
            weight_scheme: opts.weights,

            sigma: resolved.sigma,
            sigma_init: resolved.sigma,
            sigma0: resolved.sigma,
            sigma_mean: resolved.sigma,

            wcm: Array1::zeros(n),
            wcm_old: Array1::zeros(n),
            c: Array2::eye(n),
            b: Array2::eye(n),
            d: Array1::ones(n),
            inv_sqrt_c: Array2::eye(n),
            a: Array2::eye(n),
            a_inv: Array2::eye(n),
            p_sigma: Array1::zeros(n),
            p_c: Array1::zeros(n),

            weights: Array1::zeros(mu),
            mu_eff: 1.0,
            c_sigma: 0.0,
            d_sigma: 1.0,
            c_c: 0.0,
            c_1: 0.0,
            c_mu: 0.0,
            chi_n: nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf)),

            ranked_y: Vec::new(),
            ranked_z: Vec::new(),
            ranked_fitness: Vec::new(),
            generation: 0,

            used_budget: 0,
            used_budget_at_last_restart: 0,
            restart_budget: regime_budget(n, lambda),

            restart_mode: opts.ipop,
            last_pop: PopulationRegime::Large,
            mu_orig: mu,
            lambda_orig: lambda,
            lambda_large: lambda,
            lambda_small: lambda,
            restarts: 0,

            tpa_factor: 0.5,
            tpa_result: None,
            alpha: 0.5,
            beta_tpa: 0.0,
            c_alpha: 0.3,
            alpha_s: 0.0,

            seq_cutoff: resolved.seq_cutoff,
            count_degenerations: 0,

            threshold: 0.0,
            diameter,
            init_threshold: 0.2,
            decay_factor: 0.995,

            success: false,
            worse_than_ancestor: false,
            ancestor_fitness: VecDeque::with_capacity(ANCESTOR_DEPTH),
            p_success: 2.0 / 11.0,
            p_target: 2.0 / 11.0,
            p_thresh: 0.44,
            c_p: 1.0 / 12.0,
            c_cov: 2.0 / (nf * nf + 6.0),
            c_cov_pos: 2.0 / (nf * nf + 6.0),
            c_cov_neg: 0.4 / (nf.powf(1.6) + 1.0),
            d_one: 1.0 + nf / 2.0,
            c_a: 2.0 / (nf + 2.0),

            tau: 1.0 / (2.0 * nf).sqrt(),
            tau_c: 1.0,

            best_history: VecDeque::new(),
            median_history: VecDeque::new(),
        };
        params.recompute_constants();
        params.update_threshold();
        Ok(params)
    }

    /// Offspring produced by recombination per generation.
    pub fn eff_lambda(&self) -> usize {
        if self.two_point {
            self.lambda.saturating_sub(2).max(1)
        } else {
            self.lambda
        }
    }

    pub fn remaining_budget(&self) -> usize {
        self.budget.saturating_sub(self.used_budget)
    }

    pub fn budget_exhausted(&self) -> bool {
        self.used_budget >= self.budget
    }

    /// Recompute weights and every learning rate that depends on `mu`/`lambda`.
    pub fn recompute_constants(&mut self) {
        let nf = self.n as f64;
        self.weights = recombination_weights(self.weight_scheme, self.mu, self.lambda);
        self.mu_eff = 1.0 / self.weights.dot(&self.weights);
        let mu_eff = self.mu_eff;

        self.c_sigma = (mu_eff + 2.0) / (mu_eff + nf + 5.0);
        self.d_sigma =
            1.0 + 2.0 * (((mu_eff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + self.c_sigma;
        self.c_c = if self.active {
            2.0 / (nf + 2f64.sqrt()).powi(2)
        } else {
            (4.0 + mu_eff / nf) / (nf + 4.0 + 2.0 * mu_eff / nf)
        };
        self.c_1 = 2.0 / ((nf + 1.3).powi(2) + mu_eff);
        self.c_mu = (1.0 - self.c_1)
            .min(2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((nf + 2.0).powi(2) + mu_eff))
            .max(0.0);
        self.tau_c = 1.0 + (nf * nf + nf) / (2.0 * self.mu as f64);
        self.seq_cutoff = match self.selection {
            SelectionKind::Pairwise => 2 * self.mu,
            SelectionKind::Best => self.mu,
        };
    }

    /// Threshold-convergence length for the current budget consumption.
    pub fn update_threshold(&mut self) {
        let remaining = self.remaining_budget() as f64 / self.budget as f64;
        self.threshold = self.init_threshold * self.diameter * remaining.powf(self.decay_factor);
    }

    /// Refresh `B`, `D` and `C^-1/2` from `C`, clipping eigenvalues at
    /// `EIGEN_FLOOR`. Returns `false` if the decomposition failed.
    pub fn update_eigen(&mut self) -> bool {
        symmetrize(&mut self.c);
        let Some(eig) = symmetric_eigen(&self.c) else {
            return false;
        };
        let clipped = eig.values.iter().any(|&v| v < EIGEN_FLOOR);
        let values = eig.values.mapv(|v| v.max(EIGEN_FLOOR));
        if clipped {
            self.c = compose(&eig.vectors, &values);
            symmetrize(&mut self.c);
        }
        self.d = values.mapv(f64::sqrt);
        self.inv_sqrt_c = compose(&eig.vectors, &self.d.mapv(|x| 1.0 / x));
        self.b = eig.vectors;
        true
    }

    /// Whether the state needs repair.
    pub fn is_degenerate(&self) -> bool {
        !all_finite(&self.c)
            || !all_finite(&self.a)
            || !all_finite(&self.a_inv)
            || !self.sigma.is_finite()
            || self.sigma <= SIGMA_MIN
            || self.sigma >= SIGMA_MAX
            || self.p_sigma.iter().chain(self.p_c.iter()).any(|x| !x.is_finite())
    }

    /// Reset the distribution to the isotropic start state.
    pub fn repair(&mut self, reason: &str) {
        self.count_degenerations += 1;
        debug!(
            "Degenerate state ({}), resetting covariance and sigma={} (degenerations={})",
            reason, self.sigma_init, self.count_degenerations
        );
        let n = self.n;
        self.c = Array2::eye(n);
        self.b = Array2::eye(n);
        self.d = Array1::ones(n);
        self.inv_sqrt_c = Array2::eye(n);
        self.a = Array2::eye(n);
        self.a_inv = Array2::eye(n);
        self.sigma = self.sigma_init;
        self.sigma_mean = self.sigma_init;
        self.p_sigma = Array1::zeros(n);
        self.p_c = Array1::zeros(n);
        self.alpha_s = 0.0;
    }

    /// Refresh the eigen-decomposition and repair the state if anything
    /// degenerated. Called at the end of every covariance update.
    pub fn ensure_healthy(&mut self) {
        if self.is_degenerate() {
            self.repair("non-finite state or sigma out of range");
        } else if !self.update_eigen() {
            self.repair("eigen-decomposition failed");
        }
    }

    /// Apply new population sizes and reset the distribution around `centroid`.
    ///
    /// Budget bookkeeping, regime sizes and the degeneration counter carry
    /// over.
    pub fn reinitialize(&mut self, sizes: PopulationSizes, sigma: f64, centroid: Array1<f64>) {
        let n = self.n;
        self.mu = sizes.mu;
        self.lambda = sizes.lambda;
        self.recompute_constants();

        self.sigma = sigma;
        self.sigma_init = sigma;
        self.sigma_mean = sigma;
        self.wcm_old = centroid.clone();
        self.wcm = centroid;
        self.c = Array2::eye(n);
        self.b = Array2::eye(n);
        self.d = Array1::ones(n);
        self.inv_sqrt_c = Array2::eye(n);
        self.a = Array2::eye(n);
        self.a_inv = Array2::eye(n);
        self.p_sigma = Array1::zeros(n);
        self.p_c = Array1::zeros(n);

        self.ranked_y.clear();
        self.ranked_z.clear();
        self.ranked_fitness.clear();
        self.generation = 0;
        self.tpa_result = None;
        self.alpha_s = 0.0;
        self.success = false;
        self.worse_than_ancestor = false;
        self.ancestor_fitness.clear();
        self.p_success = self.p_target;
        self.best_history.clear();
        self.median_history.clear();
    }

    /// Push a parent fitness into the ancestor history.
    pub fn record_ancestor(&mut self, fitness: f64) {
        if self.ancestor_fitness.len() == ANCESTOR_DEPTH {
            self.ancestor_fitness.pop_front();
        }
        self.ancestor_fitness.push_back(fitness);
    }
}
