//! Mutation operators: draw a sample, shape it by the current distribution
//! and add it to an offspring seed.

use crate::individual::Individual;
use crate::linalg::norm;
use crate::parameters::Parameters;
use evolving_es_sampling::Sampler;
use ndarray::Array1;
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

/// Perturbs one offspring seed in place.
pub trait Mutator: Send {
    fn mutate(&mut self, individual: &mut Individual, params: &Parameters, rng: &mut dyn RngCore);

    /// Called after a restart changed the population size.
    fn reset(&mut self, _params: &Parameters) {}
}

/// Sampler plus the optional threshold-convergence rescaling.
pub struct StepSource {
    sampler: Box<dyn Sampler>,
    threshold: bool,
}

impl StepSource {
    pub fn new(sampler: Box<dyn Sampler>, threshold: bool) -> Self {
        Self { sampler, threshold }
    }

    /// Next raw sample. Under threshold convergence, samples shorter than
    /// `params.threshold` are scaled up to exactly that length.
    pub fn draw(&mut self, params: &Parameters, rng: &mut dyn RngCore) -> Array1<f64> {
        let mut z = self.sampler.next(rng);
        if self.threshold {
            scale_to_threshold(&mut z, params.threshold);
        }
        z
    }

    pub fn reset(&mut self, batch: usize) {
        self.sampler.reset(batch);
    }
}

/// Lengthen `z` to `threshold` if it is shorter.
pub fn scale_to_threshold(z: &mut Array1<f64>, threshold: f64) {
    let length = norm(z);
    if length < threshold && length > 0.0 {
        *z *= threshold / length;
    }
}

fn apply_step(individual: &mut Individual, z: Array1<f64>, y: Array1<f64>, sigma: f64) {
    individual.dna.scaled_add(sigma, &y);
    individual.last_z = z;
    individual.mutation_vector = y;
}

/// `x + sigma·z`, the plain (1+1)-ES step.
pub struct IsotropicMutation {
    source: StepSource,
}

impl IsotropicMutation {
    pub fn new(source: StepSource) -> Self {
        Self { source }
    }
}

impl Mutator for IsotropicMutation {
    fn mutate(&mut self, individual: &mut Individual, params: &Parameters, rng: &mut dyn RngCore) {
        let z = self.source.draw(params, rng);
        apply_step(individual, z.clone(), z, params.sigma);
    }

    fn reset(&mut self, params: &Parameters) {
        self.source.reset(params.eff_lambda());
    }
}

/// `x + sigma·B·D·z`
pub struct CmaMutation {
    source: StepSource,
}

impl CmaMutation {
    pub fn new(source: StepSource) -> Self {
        Self { source }
    }
}

impl Mutator for CmaMutation {
    fn mutate(&mut self, individual: &mut Individual, params: &Parameters, rng: &mut dyn RngCore) {
        let z = self.source.draw(params, rng);
        let y = params.b.dot(&(&params.d * &z));
        apply_step(individual, z, y, params.sigma);
    }

    fn reset(&mut self, params: &Parameters) {
        self.source.reset(params.eff_lambda());
    }
}

/// `x + sigma·A·z` with `A` the Cholesky factor of C.
pub struct CholeskyMutation {
    source: StepSource,
}

impl CholeskyMutation {
    pub fn new(source: StepSource) -> Self {
        Self { source }
    }
}

impl Mutator for CholeskyMutation {
    fn mutate(&mut self, individual: &mut Individual, params: &Parameters, rng: &mut dyn RngCore) {
        let z = self.source.draw(params, rng);
        let y = params.a.dot(&z);
        apply_step(individual, z, y, params.sigma);
    }

    fn reset(&mut self, params: &Parameters) {
        self.source.reset(params.eff_lambda());
    }
}

/// Log-normal self-adaptation: every offspring carries its own step size
/// `sigma_mean·exp(tau·N(0,1))`.
pub struct SelfAdaptiveMutation {
    source: StepSource,
}

impl SelfAdaptiveMutation {
    pub fn new(source: StepSource) -> Self {
        Self { source }
    }
}

impl Mutator for SelfAdaptiveMutation {
    fn mutate(&mut self, individual: &mut Individual, params: &Parameters, rng: &mut dyn RngCore) {
        let xi: f64 = rng.sample(StandardNormal);
        let sigma = params.sigma_mean * (params.tau * xi).exp();
        let z = self.source.draw(params, rng);
        let y = params.b.dot(&(&params.d * &z));
        apply_step(individual, z, y, sigma);
        individual.sigma = sigma;
    }

    fn reset(&mut self, params: &Parameters) {
        self.source.reset(params.eff_lambda());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolving_es_sampling::{build_sampler, SamplerConfig};
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn source(n: usize, threshold: bool) -> StepSource {
        StepSource::new(build_sampler(n, 4, SamplerConfig::gaussian()).unwrap(), threshold)
    }

    #[test]
    fn test_scale_to_threshold() {
        let mut z = array![0.3, 0.4];
        scale_to_threshold(&mut z, 2.0);
        assert!((norm(&z) - 2.0).abs() < 1e-12);
        let mut long = array![3.0, 4.0];
        scale_to_threshold(&mut long, 2.0);
        assert_eq!(long, array![3.0, 4.0]);
    }

    #[test]
    fn test_isotropic_step() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut params = Parameters::new(3, 100, 1, 1).unwrap();
        params.sigma = 0.5;
        let mut mutation = IsotropicMutation::new(source(3, false));
        let mut ind = Individual::new(3);
        mutation.mutate(&mut ind, &params, &mut rng);
        assert_eq!(ind.dna, &ind.last_z * 0.5);
    }

    #[test]
    fn test_cma_step_uses_covariance() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut params = Parameters::new(2, 100, 2, 4).unwrap();
        params.c = array![[4.0, 0.0], [0.0, 1.0]];
        assert!(params.update_eigen());
        let mut mutation = CmaMutation::new(source(2, false));
        let mut ind = Individual::at(array![1.0, 1.0]);
        mutation.mutate(&mut ind, &params, &mut rng);
        let y = &ind.mutation_vector;
        // y = B·D·z has Mahalanobis length |z| under C.
        let mahalanobis = y[0] * y[0] / 4.0 + y[1] * y[1];
        assert!((mahalanobis - ind.last_z.dot(&ind.last_z)).abs() < 1e-9);
        assert!((&ind.dna - &(array![1.0, 1.0] + y)).iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn test_threshold_enforces_minimum_step() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = Parameters::new(4, 100, 2, 4).unwrap();
        let mut mutation = CmaMutation::new(source(4, true));
        for _ in 0..20 {
            let mut ind = Individual::new(4);
            mutation.mutate(&mut ind, &params, &mut rng);
            assert!(norm(&ind.last_z) >= params.threshold - 1e-9);
        }
    }

    #[test]
    fn test_cholesky_step() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut params = Parameters::new(2, 100, 1, 1).unwrap();
        params.a = Array2::eye(2) * 3.0;
        let mut mutation = CholeskyMutation::new(source(2, false));
        let mut ind = Individual::new(2);
        mutation.mutate(&mut ind, &params, &mut rng);
        assert_eq!(ind.mutation_vector, &ind.last_z * 3.0);
    }

    #[test]
    fn test_self_adaptive_sets_individual_sigma() {
        let mut rng = StdRng::seed_from_u64(5);
        let params = Parameters::new(3, 100, 2, 4).unwrap();
        let mut mutation = SelfAdaptiveMutation::new(source(3, false));
        let sigmas: Vec<f64> = (0..4)
            .map(|_| {
                let mut ind = Individual::new(3);
                mutation.mutate(&mut ind, &params, &mut rng);
                ind.sigma
            })
            .collect();
        assert!(sigmas.iter().all(|&s| s > 0.0));
        assert!(sigmas.windows(2).any(|w| w[0] != w[1]));
    }
}
