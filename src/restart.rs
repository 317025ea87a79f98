//! IPOP / BIPOP restart control.
//!
//! After every adaptation the controller checks whether the current regime
//! ran out of its budget share or stagnated. A restart reseeds the search
//! around a fresh random centroid with a new population size while the run's
//! budget bookkeeping carries on.

use crate::config::{PopulationSizes, RestartMode};
use crate::parameters::{regime_budget, Parameters, PopulationRegime};
use ndarray::Array1;
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::info;

const TOL_FUN: f64 = 1e-12;
const TOL_X: f64 = 1e-12;
const TOL_UP_SIGMA: f64 = 1e20;
const MAX_CONDITION: f64 = 1e14;

/// Why a restart fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartTrigger {
    /// The regime used more than its share of the budget
    BudgetExceeded,
    /// The best fitness equals the `ceil(0.1 + lambda/4)`-th best
    FlatFitness,
    /// Recent best-fitness history and current generation are flat
    TolFun,
    /// Steps became negligible relative to the initial step size
    TolX,
    /// Step size blew up relative to the distribution's principal axis
    TolUpSigma,
    /// Covariance condition number above the limit
    ConditionCov,
    /// A principal-axis step no longer changes the centroid
    NoEffectAxis,
    /// A coordinate step no longer changes the centroid
    NoEffectCoord,
    /// Best and median fitness stopped improving over a long window
    Stagnation,
}

impl fmt::Display for RestartTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestartTrigger::BudgetExceeded => "budget exceeded",
            RestartTrigger::FlatFitness => "flat fitness",
            RestartTrigger::TolFun => "tolfun",
            RestartTrigger::TolX => "tolx",
            RestartTrigger::TolUpSigma => "tolupsigma",
            RestartTrigger::ConditionCov => "condition number",
            RestartTrigger::NoEffectAxis => "no effect axis",
            RestartTrigger::NoEffectCoord => "no effect coordinate",
            RestartTrigger::Stagnation => "stagnation",
        };
        f.write_str(name)
    }
}

/// One restart as recorded in the run result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestartEvent {
    pub used_budget: usize,
    pub trigger: RestartTrigger,
    pub regime: PopulationRegime,
    pub mu: usize,
    pub lambda: usize,
    pub sigma: f64,
}

/// Generations of best-fitness history checked by TolFun.
pub fn tolfun_window(n: usize, lambda: usize) -> usize {
    10 + (30.0 * n as f64 / lambda.max(1) as f64).ceil() as usize
}

/// Generations of history compared by the stagnation test.
pub fn stagnation_window(n: usize, lambda: usize) -> usize {
    120 + (30.0 * n as f64 / lambda.max(1) as f64).ceil() as usize
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64, capacity: usize) {
    history.push_back(value);
    while history.len() > capacity {
        history.pop_front();
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RestartController {
    pub mode: RestartMode,
}

impl RestartController {
    pub fn new(mode: RestartMode) -> Self {
        Self { mode }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != RestartMode::Off
    }

    /// Record the last generation and report a restart trigger, if any.
    pub fn check(&self, params: &mut Parameters) -> Option<RestartTrigger> {
        if !self.is_enabled() {
            return None;
        }
        self.record_generation(params);

        let used_since = params.used_budget - params.used_budget_at_last_restart;
        if used_since > params.restart_budget {
            return Some(RestartTrigger::BudgetExceeded);
        }
        self.stagnation_trigger(params)
    }

    fn record_generation(&self, params: &mut Parameters) {
        let Some(&best) = params.ranked_fitness.first() else {
            return;
        };
        let mut fitness = params.ranked_fitness.clone();
        let med = median(&mut fitness);
        let capacity = tolfun_window(params.n, params.lambda).max(stagnation_window(params.n, params.lambda));
        push_bounded(&mut params.best_history, best, capacity);
        push_bounded(&mut params.median_history, med, capacity);
    }

    /// The stagnation heuristics, cheapest first.
    pub fn stagnation_trigger(&self, params: &Parameters) -> Option<RestartTrigger> {
        let n = params.n;
        let fitness = &params.ranked_fitness;

        let flat_index = (0.1 + params.lambda as f64 / 4.0).ceil() as usize;
        if flat_index < fitness.len() && fitness[0] == fitness[flat_index] {
            return Some(RestartTrigger::FlatFitness);
        }

        let window = tolfun_window(n, params.lambda);
        if params.best_history.len() >= window && !fitness.is_empty() {
            let recent = params.best_history.iter().rev().take(window);
            let (lo, hi) = recent.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &f| {
                (lo.min(f), hi.max(f))
            });
            let span = fitness[fitness.len() - 1] - fitness[0];
            if hi - lo < TOL_FUN && span < TOL_FUN {
                return Some(RestartTrigger::TolFun);
            }
        }

        let tol_x = TOL_X * params.sigma0;
        if (0..n).all(|i| params.sigma * params.p_c[i].abs().max(params.c[[i, i]].sqrt()) < tol_x) {
            return Some(RestartTrigger::TolX);
        }

        let max_d = params.d.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
        let min_d = params.d.fold(f64::INFINITY, |m, &x| m.min(x));
        if params.sigma / params.sigma0 > TOL_UP_SIGMA * max_d {
            return Some(RestartTrigger::TolUpSigma);
        }
        if (max_d / min_d).powi(2) > MAX_CONDITION {
            return Some(RestartTrigger::ConditionCov);
        }

        let axis = params.generation % n;
        let axis_step = params.b.column(axis).to_owned() * (0.1 * params.sigma * params.d[axis]);
        if params.generation > 0 && (&params.wcm + &axis_step) == params.wcm {
            return Some(RestartTrigger::NoEffectAxis);
        }
        if (0..n).any(|i| params.wcm[i] + 0.2 * params.sigma * params.c[[i, i]].sqrt() == params.wcm[i]) {
            return Some(RestartTrigger::NoEffectCoord);
        }

        let window = stagnation_window(n, params.lambda);
        if params.best_history.len() >= window {
            let part = ((window as f64) * 0.3).ceil() as usize;
            let start = params.best_history.len() - window;
            let slice = |h: &VecDeque<f64>, from: usize| -> Vec<f64> {
                h.iter().skip(from).take(part).copied().collect()
            };
            let old_best = median(&mut slice(&params.best_history, start));
            let new_best = median(&mut slice(&params.best_history, params.best_history.len() - part));
            let old_med = median(&mut slice(&params.median_history, start));
            let new_med = median(&mut slice(&params.median_history, params.median_history.len() - part));
            if new_best >= old_best && new_med >= old_med {
                return Some(RestartTrigger::Stagnation);
            }
        }
        None
    }

    /// Switch to the next population regime and reset the distribution.
    ///
    /// Returns the new random centroid. `used_budget` is never reset.
    pub fn restart(
        &self,
        params: &mut Parameters,
        trigger: RestartTrigger,
        rng: &mut dyn RngCore,
    ) -> RestartEvent {
        let used_since = params.used_budget - params.used_budget_at_last_restart;
        let go_small = self.mode == RestartMode::Bipop
            && params.last_pop == PopulationRegime::Large
            && used_since / 2 < params.remaining_budget();

        let (lambda, sigma, restart_budget, regime) = if go_small {
            let u: f64 = rng.gen();
            let ratio = 0.5 * params.lambda_large as f64 / params.lambda_orig as f64;
            let lambda_small = (params.lambda_orig as f64 * ratio.powf(u * u)).floor() as usize;
            params.lambda_small = lambda_small.max(1);
            let sigma = params.sigma0 * 10f64.powf(-2.0 * u);
            (params.lambda_small, sigma, used_since / 2, PopulationRegime::Small)
        } else {
            params.lambda_large *= 2;
            let lambda = params.lambda_large;
            (lambda, params.sigma0, regime_budget(params.n, lambda), PopulationRegime::Large)
        };

        let mu = ((lambda as f64 * params.mu_orig as f64 / params.lambda_orig as f64).floor() as usize).max(1);
        let sizes = PopulationSizes::clamped(mu, lambda, params.selection, params.two_point);
        let centroid: Array1<f64> = Array1::from_shape_fn(params.n, |_| rng.sample(StandardNormal));

        params.reinitialize(sizes, sigma, centroid);
        params.last_pop = regime;
        params.restart_budget = restart_budget;
        params.used_budget_at_last_restart = params.used_budget;
        params.restarts += 1;

        info!(
            "Restart {} ({}): {:?} regime, mu={} lambda={} sigma={:.3e} at {}/{} evaluations",
            params.restarts,
            trigger,
            regime,
            params.mu,
            params.lambda,
            sigma,
            params.used_budget,
            params.budget
        );

        RestartEvent {
            used_budget: params.used_budget,
            trigger,
            regime,
            mu: params.mu,
            lambda: params.lambda,
            sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EsOptions;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params_with(mode: RestartMode, budget: usize) -> Parameters {
        let options = EsOptions {
            ipop: mode,
            lambda: Some(8),
            mu: Some(4),
            ..Default::default()
        };
        Parameters::from_resolved(&options.resolve(3).unwrap(), budget).unwrap()
    }

    #[test]
    fn test_disabled_controller_never_fires() {
        let mut params = params_with(RestartMode::Off, 1000);
        params.used_budget = 999;
        params.restart_budget = 1;
        assert_eq!(RestartController::new(RestartMode::Off).check(&mut params), None);
    }

    #[test]
    fn test_budget_trigger() {
        let mut params = params_with(RestartMode::Ipop, 100_000);
        params.ranked_fitness = (0..8).map(|i| i as f64).collect();
        params.restart_budget = 10;
        params.used_budget = 11;
        let controller = RestartController::new(RestartMode::Ipop);
        assert_eq!(controller.check(&mut params), Some(RestartTrigger::BudgetExceeded));
    }

    #[test]
    fn test_flat_fitness_trigger() {
        let mut params = params_with(RestartMode::Ipop, 100_000);
        params.ranked_fitness = vec![1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let controller = RestartController::new(RestartMode::Ipop);
        assert_eq!(controller.check(&mut params), Some(RestartTrigger::FlatFitness));
    }

    #[test]
    fn test_condition_trigger() {
        let mut params = params_with(RestartMode::Ipop, 100_000);
        params.ranked_fitness = (0..8).map(|i| i as f64).collect();
        params.d = ndarray::array![1e-8, 1.0, 1.0];
        let controller = RestartController::new(RestartMode::Ipop);
        assert_eq!(controller.stagnation_trigger(&params), Some(RestartTrigger::ConditionCov));
    }

    #[test]
    fn test_ipop_doubles_population() {
        let mut params = params_with(RestartMode::Ipop, 100_000);
        let mut rng = StdRng::seed_from_u64(1);
        let controller = RestartController::new(RestartMode::Ipop);
        params.used_budget = 500;
        let event = controller.restart(&mut params, RestartTrigger::BudgetExceeded, &mut rng);
        assert_eq!(event.lambda, 16);
        assert_eq!(event.mu, 8);
        assert_eq!(params.used_budget_at_last_restart, 500);
        assert_eq!(params.used_budget, 500);
        assert_eq!(params.sigma, params.sigma0);
        let event = controller.restart(&mut params, RestartTrigger::TolFun, &mut rng);
        assert_eq!(event.lambda, 32);
        assert_eq!(params.restarts, 2);
    }

    #[test]
    fn test_bipop_alternates_regimes() {
        let mut params = params_with(RestartMode::Bipop, 1_000_000);
        let mut rng = StdRng::seed_from_u64(9);
        let controller = RestartController::new(RestartMode::Bipop);
        let mut regimes = Vec::new();
        for step in 1..=4 {
            params.used_budget = step * 1000;
            let event = controller.restart(&mut params, RestartTrigger::BudgetExceeded, &mut rng);
            assert_eq!(params.used_budget_at_last_restart, params.used_budget);
            regimes.push(event.regime);
            if event.regime == PopulationRegime::Small {
                assert!(event.lambda <= params.lambda_large);
                assert!(event.sigma <= params.sigma0);
                assert_eq!(params.restart_budget, 500);
            }
        }
        assert_eq!(
            regimes,
            vec![
                PopulationRegime::Small,
                PopulationRegime::Large,
                PopulationRegime::Small,
                PopulationRegime::Large
            ]
        );
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
