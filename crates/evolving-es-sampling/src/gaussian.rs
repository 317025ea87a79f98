use crate::common::{Sampler, SamplerError, SamplerResult};
use ndarray::Array1;
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

/// Independent standard-normal samples.
#[derive(Clone, Debug)]
pub struct GaussianSampler {
    n: usize,
}

impl GaussianSampler {
    pub fn new(n: usize) -> SamplerResult<Self> {
        if n == 0 {
            return Err(SamplerError::ZeroDimension);
        }
        Ok(Self { n })
    }
}

impl Sampler for GaussianSampler {
    fn dim(&self) -> usize {
        self.n
    }

    fn next(&mut self, rng: &mut dyn RngCore) -> Array1<f64> {
        Array1::from_shape_fn(self.n, |_| rng.sample::<f64, _>(StandardNormal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gaussian_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sampler = GaussianSampler::new(4).unwrap();
        let samples = sampler.sample(5000, &mut rng);
        let all: Vec<f64> = samples.iter().flat_map(|s| s.iter().copied()).collect();
        let mean = all.iter().sum::<f64>() / all.len() as f64;
        let var = all.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / all.len() as f64;
        assert!(mean.abs() < 0.05, "mean too far from zero: {}", mean);
        assert!((var - 1.0).abs() < 0.1, "variance too far from one: {}", var);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert_eq!(GaussianSampler::new(0).unwrap_err(), SamplerError::ZeroDimension);
    }
}
