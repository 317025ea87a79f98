//! Named optimizer variants, each a particular wiring of recombination,
//! mutation, selection and adaptation into one `GenerationLoop`.

use crate::adaptation::{
    ActiveCholeskyAdaptation, CholeskyAdaptation, CovarianceMatrixAdaptation, OneFifthRule,
    SelfAdaptiveAdaptation,
};
use crate::config::{EsOptions, SelectionKind, WeightScheme};
use crate::error::{EsError, EsResult};
use crate::fitness::FitnessFunction;
use crate::generation::{GenerationLoop, RunResult};
use crate::mutation::{
    CholeskyMutation, CmaMutation, IsotropicMutation, SelfAdaptiveMutation, StepSource,
};
use crate::parameters::Parameters;
use crate::recombination::{OnePlusOneRecombination, WeightedRecombination};
use crate::restart::RestartController;
use crate::selection::{BestSelection, OnePlusOneSelection, PairwiseSelection, Selector};
use evolving_es_sampling::{build_sampler, SamplerConfig};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available optimizer variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    OnePlusOneEs,
    CmaEs,
    OnePlusOneCholeskyCmaEs,
    OnePlusOneActiveCmaEs,
    CmsaEs,
    CustomizedEs,
}

impl FromStr for Algorithm {
    type Err = EsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "11es" | "oneplusonees" => Ok(Algorithm::OnePlusOneEs),
            "cmaes" => Ok(Algorithm::CmaEs),
            "11choleskycmaes" | "oneplusonecholeskycmaes" => Ok(Algorithm::OnePlusOneCholeskyCmaEs),
            "11activecmaes" | "oneplusoneactivecmaes" => Ok(Algorithm::OnePlusOneActiveCmaEs),
            "cmsaes" => Ok(Algorithm::CmsaEs),
            "customizedes" | "customes" => Ok(Algorithm::CustomizedEs),
            _ => Err(EsError::InvalidConfig(format!("unknown algorithm: {}", s))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::OnePlusOneEs => "(1+1)-ES",
            Algorithm::CmaEs => "CMA-ES",
            Algorithm::OnePlusOneCholeskyCmaEs => "(1+1)-Cholesky-CMA-ES",
            Algorithm::OnePlusOneActiveCmaEs => "(1+1)-active-CMA-ES",
            Algorithm::CmsaEs => "CMSA-ES",
            Algorithm::CustomizedEs => "customized ES",
        };
        f.write_str(name)
    }
}

impl Algorithm {
    /// Build the variant. The (1+1) variants use only `options.seed` and
    /// `options.sigma`; CMA-ES and CMSA-ES also use `mu`, `lambda` and
    /// `elitism`; the customized ES uses every option.
    pub fn build(self, n: usize, budget: usize, options: &EsOptions) -> EsResult<GenerationLoop> {
        match self {
            Algorithm::OnePlusOneEs => one_plus_one_variant(n, budget, options, OnePlusOneKind::Plain),
            Algorithm::CmaEs => cma_es(n, budget, options.mu, options.lambda, options.elitism, options.seed),
            Algorithm::OnePlusOneCholeskyCmaEs => {
                one_plus_one_variant(n, budget, options, OnePlusOneKind::Cholesky)
            }
            Algorithm::OnePlusOneActiveCmaEs => {
                one_plus_one_variant(n, budget, options, OnePlusOneKind::Active)
            }
            Algorithm::CmsaEs => cmsa_es(n, budget, options.mu, options.lambda, options.elitism, options.seed),
            Algorithm::CustomizedEs => customized_es(n, budget, options),
        }
    }

    pub fn run(
        self,
        n: usize,
        fitness: &dyn FitnessFunction,
        budget: usize,
        options: &EsOptions,
    ) -> EsResult<RunResult> {
        self.build(n, budget, options)?.run(fitness)
    }
}

/// Seeded RNG, or one seeded from system entropy.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Random standard-normal starting centroid.
fn start_point(n: usize, rng: &mut StdRng) -> Array1<f64> {
    Array1::from_shape_fn(n, |_| rng.sample(StandardNormal))
}

fn gaussian_source(n: usize, batch: usize, threshold: bool) -> EsResult<StepSource> {
    Ok(StepSource::new(build_sampler(n, batch, SamplerConfig::gaussian())?, threshold))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OnePlusOneKind {
    Plain,
    Cholesky,
    Active,
}

fn one_plus_one_variant(
    n: usize,
    budget: usize,
    options: &EsOptions,
    kind: OnePlusOneKind,
) -> EsResult<GenerationLoop> {
    let single = EsOptions {
        mu: Some(1),
        lambda: Some(1),
        sigma: options.sigma,
        seed: options.seed,
        ..Default::default()
    };
    let mut params = Parameters::from_resolved(&single.resolve(n)?, budget)?;
    let mut rng = rng_from_seed(options.seed);
    params.wcm = start_point(n, &mut rng);
    params.wcm_old = params.wcm.clone();

    let source = gaussian_source(n, 1, false)?;
    let es = match kind {
        OnePlusOneKind::Plain => GenerationLoop::new(
            params,
            Box::new(OnePlusOneRecombination),
            Box::new(IsotropicMutation::new(source)),
            Box::new(OnePlusOneSelection::new()),
            Box::new(OneFifthRule),
            rng,
        ),
        OnePlusOneKind::Cholesky => GenerationLoop::new(
            params,
            Box::new(OnePlusOneRecombination),
            Box::new(CholeskyMutation::new(source)),
            Box::new(OnePlusOneSelection::new()),
            Box::new(CholeskyAdaptation),
            rng,
        ),
        OnePlusOneKind::Active => GenerationLoop::new(
            params,
            Box::new(OnePlusOneRecombination),
            Box::new(CholeskyMutation::new(source)),
            Box::new(OnePlusOneSelection::with_ancestor_tracking()),
            Box::new(ActiveCholeskyAdaptation),
            rng,
        ),
    };
    Ok(es)
}

/// (1+1)-ES with the one-fifth success rule.
pub fn one_plus_one_es(n: usize, budget: usize, seed: Option<u64>) -> EsResult<GenerationLoop> {
    let options = EsOptions { seed, ..Default::default() };
    one_plus_one_variant(n, budget, &options, OnePlusOneKind::Plain)
}

/// (1+1)-CMA-ES with Cholesky factor updates.
pub fn one_plus_one_cholesky_cma_es(
    n: usize,
    budget: usize,
    seed: Option<u64>,
) -> EsResult<GenerationLoop> {
    let options = EsOptions { seed, ..Default::default() };
    one_plus_one_variant(n, budget, &options, OnePlusOneKind::Cholesky)
}

/// (1+1)-CMA-ES with active covariance reduction.
pub fn one_plus_one_active_cma_es(
    n: usize,
    budget: usize,
    seed: Option<u64>,
) -> EsResult<GenerationLoop> {
    let options = EsOptions { seed, ..Default::default() };
    one_plus_one_variant(n, budget, &options, OnePlusOneKind::Active)
}

/// (mu +/, lambda)-CMA-ES.
pub fn cma_es(
    n: usize,
    budget: usize,
    mu: Option<usize>,
    lambda: Option<usize>,
    elitist: bool,
    seed: Option<u64>,
) -> EsResult<GenerationLoop> {
    let options = EsOptions {
        mu,
        lambda,
        elitism: elitist,
        seed,
        ..Default::default()
    };
    customized_es(n, budget, &options)
}

/// (mu +/, lambda)-CMSA-ES with equal recombination weights.
pub fn cmsa_es(
    n: usize,
    budget: usize,
    mu: Option<usize>,
    lambda: Option<usize>,
    elitist: bool,
    seed: Option<u64>,
) -> EsResult<GenerationLoop> {
    let options = EsOptions {
        mu,
        lambda,
        elitism: elitist,
        seed,
        weights: WeightScheme::Equal,
        ..Default::default()
    };
    let resolved = options.resolve(n)?;
    let mut params = Parameters::from_resolved(&resolved, budget)?;
    let mut rng = rng_from_seed(seed);
    params.wcm = start_point(n, &mut rng);
    params.wcm_old = params.wcm.clone();

    let source = gaussian_source(n, params.eff_lambda(), false)?;
    Ok(GenerationLoop::new(
        params,
        Box::new(WeightedRecombination),
        Box::new(SelfAdaptiveMutation::new(source)),
        Box::new(BestSelection::new(elitist)),
        Box::new(SelfAdaptiveAdaptation),
        rng,
    ))
}

/// The fully configurable CMA-ES: every module switched through `options`.
pub fn customized_es(n: usize, budget: usize, options: &EsOptions) -> EsResult<GenerationLoop> {
    let resolved = options.resolve(n)?;
    let mut params = Parameters::from_resolved(&resolved, budget)?;
    let mut rng = rng_from_seed(options.seed);
    params.wcm = start_point(n, &mut rng);
    params.wcm_old = params.wcm.clone();

    let sampler = build_sampler(n, params.eff_lambda(), options.sampler_config())?;
    let mutator = CmaMutation::new(StepSource::new(sampler, options.threshold));
    let selector: Box<dyn Selector> = match options.selection {
        SelectionKind::Best => Box::new(BestSelection::new(options.elitism)),
        SelectionKind::Pairwise => Box::new(PairwiseSelection::new(options.elitism)),
    };

    Ok(GenerationLoop::new(
        params,
        Box::new(WeightedRecombination),
        Box::new(mutator),
        selector,
        Box::new(CovarianceMatrixAdaptation),
        rng,
    )
    .with_restarts(RestartController::new(options.ipop)))
}

pub fn run_one_plus_one_es(
    n: usize,
    fitness: &dyn FitnessFunction,
    budget: usize,
    seed: Option<u64>,
) -> EsResult<RunResult> {
    one_plus_one_es(n, budget, seed)?.run(fitness)
}

pub fn run_cma_es(
    n: usize,
    fitness: &dyn FitnessFunction,
    budget: usize,
    mu: Option<usize>,
    lambda: Option<usize>,
    elitist: bool,
) -> EsResult<RunResult> {
    cma_es(n, budget, mu, lambda, elitist, None)?.run(fitness)
}

pub fn run_one_plus_one_cholesky_cma_es(
    n: usize,
    fitness: &dyn FitnessFunction,
    budget: usize,
    seed: Option<u64>,
) -> EsResult<RunResult> {
    one_plus_one_cholesky_cma_es(n, budget, seed)?.run(fitness)
}

pub fn run_one_plus_one_active_cma_es(
    n: usize,
    fitness: &dyn FitnessFunction,
    budget: usize,
    seed: Option<u64>,
) -> EsResult<RunResult> {
    one_plus_one_active_cma_es(n, budget, seed)?.run(fitness)
}

pub fn run_cmsa_es(
    n: usize,
    fitness: &dyn FitnessFunction,
    budget: usize,
    mu: Option<usize>,
    lambda: Option<usize>,
    elitist: bool,
) -> EsResult<RunResult> {
    cmsa_es(n, budget, mu, lambda, elitist, None)?.run(fitness)
}

pub fn run_customized_es(
    n: usize,
    fitness: &dyn FitnessFunction,
    budget: usize,
    options: &EsOptions,
) -> EsResult<RunResult> {
    customized_es(n, budget, options)?.run(fitness)
}
