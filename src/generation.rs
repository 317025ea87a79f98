//! The budget-bounded generation loop.
//!
//! One generation runs EVALUATE → SELECT → TRACK → RECOMBINE → TPA PROBE →
//! ADAPT → RESTART CHECK. The next generation's seeds are recombined before
//! the probes and the adaptation so that both see the latest centroid shift.
//! The loop terminates only through the evaluation budget.

use crate::adaptation::ParameterAdapter;
use crate::error::{EsError, EsResult};
use crate::evaluator::BatchEvaluator;
use crate::fitness::FitnessFunction;
use crate::individual::Individual;
use crate::mutation::Mutator;
use crate::parameters::Parameters;
use crate::recombination::Recombiner;
use crate::restart::{RestartController, RestartEvent, RestartTrigger};
use crate::selection::Selector;
use ndarray::Array1;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Everything recorded during one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    /// Evaluations consumed by each generation, TPA probes included
    pub generation_sizes: Vec<usize>,
    /// Step size after each evaluation
    pub sigma_over_time: Vec<f64>,
    /// Best-so-far fitness after each evaluation
    pub best_fitness_over_time: Vec<f64>,
    pub best_individual: Individual,
    pub final_population: Vec<Individual>,
    pub used_budget: usize,
    pub restarts: Vec<RestartEvent>,
    pub count_degenerations: usize,
}

impl RunResult {
    pub fn best_fitness(&self) -> f64 {
        self.best_individual.fitness
    }

    pub fn generations(&self) -> usize {
        self.generation_sizes.len()
    }

    pub fn to_json(&self) -> EsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(s: &str) -> EsResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> EsResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Repeat the last value of a trace until it has `len` entries.
fn extend_trace(trace: &mut Vec<f64>, len: usize, value: f64) {
    if trace.len() < len {
        trace.resize(len, value);
    }
}

fn checked_fitness(value: f64, evaluation: usize) -> EsResult<f64> {
    if !value.is_finite() {
        return Err(EsError::NonFiniteFitness { evaluation });
    }
    Ok(value)
}

/// Wires the strategies of one optimizer variant around a `Parameters`
/// instance and runs them until the budget is spent.
pub struct GenerationLoop {
    params: Parameters,
    recombiner: Box<dyn Recombiner>,
    mutator: Box<dyn Mutator>,
    selector: Box<dyn Selector>,
    adapter: Box<dyn ParameterAdapter>,
    restart: RestartController,
    evaluator: Option<Box<dyn BatchEvaluator>>,
    rng: StdRng,
    population: Vec<Individual>,
    improvement_found: bool,
}

impl GenerationLoop {
    /// The initial parent sits at `params.wcm`, unevaluated.
    pub fn new(
        params: Parameters,
        recombiner: Box<dyn Recombiner>,
        mutator: Box<dyn Mutator>,
        selector: Box<dyn Selector>,
        adapter: Box<dyn ParameterAdapter>,
        rng: StdRng,
    ) -> Self {
        let population = vec![Individual::at(params.wcm.clone())];
        Self {
            params,
            recombiner,
            mutator,
            selector,
            adapter,
            restart: RestartController::default(),
            evaluator: None,
            rng,
            population,
            improvement_found: false,
        }
    }

    pub fn with_restarts(mut self, restart: RestartController) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn BatchEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Minimize `fitness` until the budget is exhausted.
    pub fn run(mut self, fitness: &dyn FitnessFunction) -> EsResult<RunResult> {
        info!(
            "Starting ES run: n={} budget={} mu={} lambda={} sigma={}",
            self.params.n, self.params.budget, self.params.mu, self.params.lambda, self.params.sigma
        );

        let mut best = Individual::at(self.params.wcm.clone());
        let mut sigma_trace = Vec::new();
        let mut best_trace = Vec::new();
        let mut generation_sizes = Vec::new();
        let mut restarts = Vec::new();

        let mut seeds = self.recombiner.recombine(&self.population, &mut self.params);
        loop {
            // EVALUATE
            let used_before = self.params.used_budget;
            let offspring = self.evaluate_generation(seeds, fitness, best.fitness)?;

            // SELECT
            let parents = std::mem::take(&mut self.population);
            self.population = self.selector.select(parents, offspring, &mut self.params);
            if self.population.len() != self.params.mu {
                warn!(
                    "Selection returned {} individuals, expected mu={}",
                    self.population.len(),
                    self.params.mu
                );
            }

            // TRACK
            if let Some(top) = self.population.iter().min_by(|a, b| a.cmp_fitness(b)) {
                if top.fitness < best.fitness {
                    best = top.clone();
                }
            }
            extend_trace(&mut sigma_trace, self.params.used_budget, self.params.sigma_mean);
            extend_trace(&mut best_trace, self.params.used_budget, best.fitness);
            generation_sizes.push(self.params.used_budget - used_before);
            debug!(
                "Generation {}: used {}/{} best={:e} sigma={:e}",
                generation_sizes.len(),
                self.params.used_budget,
                self.params.budget,
                best.fitness,
                self.params.sigma_mean
            );
            if self.params.budget_exhausted() {
                break;
            }

            // RECOMBINE
            seeds = self.recombiner.recombine(&self.population, &mut self.params);

            // TPA PROBE
            if self.params.two_point {
                let spent = self.two_point_probe(fitness)?;
                if let Some(last) = generation_sizes.last_mut() {
                    *last += spent;
                }
            }

            // ADAPT
            self.adapter.adapt(&self.population, &mut self.params);
            self.params.update_threshold();

            // RESTART CHECK
            if let Some(trigger) = self.restart.check(&mut self.params) {
                let (event, fresh) = self.apply_restart(trigger);
                seeds = fresh;
                restarts.push(event);
            }

            if self.params.budget_exhausted() {
                break;
            }
        }

        let used = self.params.used_budget;
        extend_trace(&mut sigma_trace, used, self.params.sigma_mean);
        extend_trace(&mut best_trace, used, best.fitness);

        let result = RunResult {
            generation_sizes,
            sigma_over_time: sigma_trace,
            best_fitness_over_time: best_trace,
            best_individual: best,
            final_population: self.population,
            used_budget: used,
            restarts,
            count_degenerations: self.params.count_degenerations,
        };
        info!(
            "ES run finished: {} evaluations, {} generations, best={:e}, {} restarts, {} degenerations",
            result.used_budget,
            result.generations(),
            result.best_fitness(),
            result.restarts.len(),
            result.count_degenerations
        );
        Ok(result)
    }

    /// Restart the distribution and replace the population and the pending
    /// seeds with copies of the new centroid.
    fn apply_restart(&mut self, trigger: RestartTrigger) -> (RestartEvent, Vec<Individual>) {
        let event = self.restart.restart(&mut self.params, trigger, &mut self.rng);
        self.mutator.reset(&self.params);
        self.population = vec![Individual::at(self.params.wcm.clone())];
        let seeds = self.recombiner.recombine(&self.population, &mut self.params);
        (event, seeds)
    }

    /// Mutate and evaluate `seeds` in order. Stops at the budget and, in
    /// sequential mode, once `seq_cutoff` offspring were evaluated and one of
    /// them beat `best_fitness`.
    fn evaluate_generation(
        &mut self,
        seeds: Vec<Individual>,
        fitness: &dyn FitnessFunction,
        best_fitness: f64,
    ) -> EsResult<Vec<Individual>> {
        if let Some(evaluator) = self.evaluator.take() {
            let offspring = self.evaluate_batch(evaluator.as_ref(), seeds, fitness, best_fitness);
            self.evaluator = Some(evaluator);
            return offspring;
        }

        let mut offspring = Vec::with_capacity(seeds.len());
        for mut ind in seeds {
            if self.params.budget_exhausted() {
                break;
            }
            self.mutator.mutate(&mut ind, &self.params, &mut self.rng);
            let value = fitness.evaluate(&ind.dna).map_err(EsError::Fitness)?;
            self.params.used_budget += 1;
            ind.fitness = checked_fitness(value, self.params.used_budget)?;
            offspring.push(ind);
            if self.sequential_stop(&offspring, best_fitness) {
                break;
            }
        }
        Ok(offspring)
    }

    /// Batch variant: mutate serially, evaluate in one call, replay the
    /// sequential rule. Only the offspring kept by the replay are charged.
    fn evaluate_batch(
        &mut self,
        evaluator: &dyn BatchEvaluator,
        seeds: Vec<Individual>,
        fitness: &dyn FitnessFunction,
        best_fitness: f64,
    ) -> EsResult<Vec<Individual>> {
        let count = seeds.len().min(self.params.remaining_budget());
        let mut batch: Vec<Individual> = seeds.into_iter().take(count).collect();
        for ind in batch.iter_mut() {
            self.mutator.mutate(ind, &self.params, &mut self.rng);
        }
        let designs: Vec<Array1<f64>> = batch.iter().map(|ind| ind.dna.clone()).collect();
        let values = evaluator.evaluate(fitness, &designs)?;
        if values.len() != designs.len() {
            return Err(EsError::BatchSizeMismatch {
                expected: designs.len(),
                got: values.len(),
            });
        }

        let mut offspring = Vec::with_capacity(count);
        for (mut ind, value) in batch.into_iter().zip(values) {
            ind.fitness = checked_fitness(value, self.params.used_budget + offspring.len() + 1)?;
            offspring.push(ind);
            if self.sequential_stop(&offspring, best_fitness) {
                break;
            }
        }
        self.params.used_budget += offspring.len();
        Ok(offspring)
    }

    /// Update the improvement flag with the newest offspring and decide
    /// whether sequential evaluation stops here.
    fn sequential_stop(&mut self, offspring: &[Individual], best_fitness: f64) -> bool {
        if !self.params.sequential {
            return false;
        }
        if offspring.last().is_some_and(|ind| ind.fitness < best_fitness) {
            self.improvement_found = true;
        }
        if self.improvement_found && offspring.len() >= self.params.seq_cutoff {
            self.improvement_found = false;
            return true;
        }
        false
    }

    /// Evaluate `wcm ± tpa_factor·(wcm - wcm_old)` and record which side won.
    /// Returns the evaluations charged.
    fn two_point_probe(&mut self, fitness: &dyn FitnessFunction) -> EsResult<usize> {
        let params = &mut self.params;
        let shift = (&params.wcm - &params.wcm_old) * params.tpa_factor;
        let plus = &params.wcm + &shift;
        let minus = &params.wcm - &shift;

        let f_plus = fitness.evaluate(&plus).map_err(EsError::Fitness)?;
        let f_plus = checked_fitness(f_plus, params.used_budget + 1)?;
        let f_minus = fitness.evaluate(&minus).map_err(EsError::Fitness)?;
        let f_minus = checked_fitness(f_minus, params.used_budget + 2)?;

        let before = params.used_budget;
        params.used_budget += 2;
        if params.sequential {
            params.used_budget = params.used_budget.min(params.budget);
        }
        params.tpa_result = Some(if f_plus < f_minus { 1.0 } else { -1.0 });
        Ok(params.used_budget - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptation::OneFifthRule;
    use crate::algorithms::customized_es;
    use crate::config::{EsOptions, RestartMode};
    use crate::evaluator::VectorizedEvaluator;
    use crate::fitness::sphere;
    use crate::mutation::{IsotropicMutation, StepSource};
    use crate::recombination::OnePlusOneRecombination;
    use crate::selection::OnePlusOneSelection;
    use evolving_es_sampling::{build_sampler, SamplerConfig};
    use rand::SeedableRng;

    fn one_plus_one(n: usize, budget: usize) -> GenerationLoop {
        let mut params = Parameters::new(n, budget, 1, 1).unwrap();
        params.wcm = Array1::from_elem(n, 2.0);
        let sampler = build_sampler(n, 1, SamplerConfig::gaussian()).unwrap();
        GenerationLoop::new(
            params,
            Box::new(OnePlusOneRecombination),
            Box::new(IsotropicMutation::new(StepSource::new(sampler, false))),
            Box::new(OnePlusOneSelection::new()),
            Box::new(OneFifthRule),
            StdRng::seed_from_u64(42),
        )
    }

    fn customized_loop(n: usize, budget: usize, restarts: bool) -> GenerationLoop {
        let options = EsOptions {
            ipop: if restarts { RestartMode::Ipop } else { RestartMode::Off },
            seed: Some(17),
            ..Default::default()
        };
        customized_es(n, budget, &options).unwrap()
    }

    #[test]
    fn test_extend_trace() {
        let mut trace = vec![1.0];
        extend_trace(&mut trace, 3, 2.0);
        assert_eq!(trace, vec![1.0, 2.0, 2.0]);
        extend_trace(&mut trace, 2, 5.0);
        assert_eq!(trace.len(), 3);
    }

    #[test]
    fn test_traces_cover_budget() {
        let result = one_plus_one(3, 40).run(&sphere).unwrap();
        assert_eq!(result.used_budget, 40);
        assert_eq!(result.sigma_over_time.len(), 40);
        assert_eq!(result.best_fitness_over_time.len(), 40);
        assert_eq!(result.generation_sizes.iter().sum::<usize>(), 40);
        assert_eq!(result.final_population.len(), 1);
    }

    #[test]
    fn test_nan_fitness_aborts() {
        let nan = |_: &Array1<f64>| f64::NAN;
        let err = one_plus_one(2, 10).run(&nan).unwrap_err();
        assert!(matches!(err, EsError::NonFiniteFitness { evaluation: 1 }));
    }

    #[test]
    fn test_infinite_fitness_aborts() {
        let inf = |_: &Array1<f64>| f64::INFINITY;
        let err = one_plus_one(2, 10).run(&inf).unwrap_err();
        assert!(matches!(err, EsError::NonFiniteFitness { evaluation: 1 }));

        let neg = |_: &Array1<f64>| f64::NEG_INFINITY;
        let err = customized_loop(3, 50, false).run(&neg).unwrap_err();
        assert!(matches!(err, EsError::NonFiniteFitness { evaluation: 1 }));
    }

    #[test]
    fn test_batch_infinite_fitness_aborts() {
        let inf = |_: &Array1<f64>| f64::INFINITY;
        let err = customized_loop(3, 50, false)
            .with_evaluator(Box::new(VectorizedEvaluator))
            .run(&inf)
            .unwrap_err();
        assert!(matches!(err, EsError::NonFiniteFitness { evaluation: 1 }));
    }

    #[test]
    fn test_restart_replaces_pending_seeds() {
        let mut es = customized_loop(4, 10_000, true);
        let before = es.params.wcm.clone();
        let lambda_before = es.params.lambda;

        let (event, seeds) = es.apply_restart(RestartTrigger::FlatFitness);
        assert_eq!(event.lambda, 2 * lambda_before);
        assert_ne!(es.params.wcm, before);
        assert_eq!(seeds.len(), es.params.eff_lambda());
        for seed in &seeds {
            assert_eq!(seed.dna, es.params.wcm);
            assert!(!seed.is_evaluated());
        }
        assert_eq!(es.population.len(), 1);
        assert_eq!(es.population[0].dna, es.params.wcm);
    }

    #[test]
    fn test_best_is_a_snapshot() {
        let result = one_plus_one(2, 30).run(&sphere).unwrap();
        assert_eq!(sphere(&result.best_individual.dna), result.best_fitness());
        let last = *result.best_fitness_over_time.last().unwrap();
        assert_eq!(last, result.best_fitness());
    }

    #[test]
    fn test_result_json_round_trip() {
        let result = one_plus_one(2, 20).run(&sphere).unwrap();
        let text = result.to_json().unwrap();
        let back = RunResult::from_json_str(&text).unwrap();
        assert_eq!(back.used_budget, 20);
        assert_eq!(back.generation_sizes, result.generation_sizes);
        assert_eq!(back.generations(), result.generations());
        for (a, b) in back.best_fitness_over_time.iter().zip(&result.best_fitness_over_time) {
            assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
        }
    }
}
