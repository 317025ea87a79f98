//! Evolving ES
//!
//! A modular evolution strategy engine for black-box continuous
//! minimization under a fixed evaluation budget.
//!
//! # Architecture
//!
//! Every optimizer is one [`GenerationLoop`] wired from interchangeable
//! strategies:
//!
//! - [`Recombiner`]: offspring seeds from the parents
//! - [`Mutator`]: sampler output shaped by step size and covariance
//! - [`Selector`]: next parent set
//! - [`ParameterAdapter`]: step-size / covariance update
//! - [`RestartController`]: IPOP / BIPOP restarts
//! - [`BatchEvaluator`]: optional parallel or vectorized evaluation
//!
//! The loop owns the run state ([`Parameters`]) and lends it to the
//! strategies. Samplers live in the `evolving-es-sampling` crate.
//!
//! # Variants
//!
//! - (1+1)-ES with the one-fifth rule
//! - (mu +/, lambda)-CMA-ES
//! - (1+1)-CMA-ES with Cholesky updates, plain and active
//! - CMSA-ES
//! - the customized ES: active update, elitism, mirrored / orthogonal /
//!   quasi-random sampling, sequential evaluation, threshold convergence,
//!   two-point step-size adaptation, pairwise selection, IPOP / BIPOP
//!
//! # Example
//!
//! ```
//! use evolving_es::{run_one_plus_one_es, sphere};
//!
//! let result = run_one_plus_one_es(5, &sphere, 200, Some(1)).unwrap();
//! assert_eq!(result.used_budget, 200);
//! assert!(result.best_fitness() < result.best_fitness_over_time[0]);
//! ```

pub mod adaptation;
pub mod algorithms;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod fitness;
pub mod generation;
pub mod individual;
pub mod linalg;
pub mod mutation;
pub mod parameters;
pub mod recombination;
pub mod restart;
pub mod selection;

pub use adaptation::{
    ActiveCholeskyAdaptation, CholeskyAdaptation, CovarianceMatrixAdaptation, OneFifthRule,
    ParameterAdapter, SelfAdaptiveAdaptation,
};
pub use algorithms::{
    cma_es, cmsa_es, customized_es, one_plus_one_active_cma_es, one_plus_one_cholesky_cma_es,
    one_plus_one_es, rng_from_seed, run_cma_es, run_cmsa_es, run_customized_es,
    run_one_plus_one_active_cma_es, run_one_plus_one_cholesky_cma_es, run_one_plus_one_es,
    Algorithm,
};
pub use config::{EsOptions, PopulationSizes, ResolvedOptions, RestartMode, SelectionKind, WeightScheme};
pub use error::{EsError, EsResult};
pub use evaluator::{BatchEvaluator, RayonEvaluator, VectorizedEvaluator};
pub use fitness::{sphere, BatchFitness, FallibleFitness, FitnessFunction};
pub use generation::{GenerationLoop, RunResult};
pub use individual::Individual;
pub use mutation::{
    CholeskyMutation, CmaMutation, IsotropicMutation, Mutator, SelfAdaptiveMutation, StepSource,
};
pub use parameters::{Parameters, PopulationRegime};
pub use recombination::{OnePlusOneRecombination, Recombiner, WeightedRecombination};
pub use restart::{RestartController, RestartEvent, RestartTrigger};
pub use selection::{BestSelection, OnePlusOneSelection, PairwiseSelection, Selector};

pub use evolving_es_sampling as sampling;

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
