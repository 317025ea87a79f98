//! Whole-generation evaluation back ends.

use crate::error::{EsError, EsResult};
use crate::fitness::FitnessFunction;
use ndarray::Array1;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Evaluates one generation of designs; results keep the input order.
pub trait BatchEvaluator: Send + Sync {
    fn evaluate(&self, fitness: &dyn FitnessFunction, designs: &[Array1<f64>]) -> EsResult<Vec<f64>>;
}

/// Evaluates designs concurrently on a rayon thread pool.
pub struct RayonEvaluator {
    pool: Option<ThreadPool>,
}

impl RayonEvaluator {
    /// Dedicated pool of `threads` workers, or rayon's global pool for `None`.
    pub fn new(threads: Option<usize>) -> EsResult<Self> {
        let pool = match threads {
            Some(0) => {
                return Err(EsError::InvalidConfig("thread count must be positive".into()));
            }
            Some(t) => {
                debug!("Building rayon pool with {} threads", t);
                Some(ThreadPoolBuilder::new().num_threads(t).build()?)
            }
            None => None,
        };
        Ok(Self { pool })
    }

    fn run(fitness: &dyn FitnessFunction, designs: &[Array1<f64>]) -> EsResult<Vec<f64>> {
        designs
            .par_iter()
            .map(|d| fitness.evaluate(d))
            .collect::<anyhow::Result<Vec<f64>>>()
            .map_err(EsError::Fitness)
    }
}

impl BatchEvaluator for RayonEvaluator {
    fn evaluate(&self, fitness: &dyn FitnessFunction, designs: &[Array1<f64>]) -> EsResult<Vec<f64>> {
        match &self.pool {
            Some(pool) => pool.install(|| Self::run(fitness, designs)),
            None => Self::run(fitness, designs),
        }
    }
}

/// Hands the whole generation to `FitnessFunction::evaluate_batch` in one
/// call, for back ends that distribute work themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct VectorizedEvaluator;

impl BatchEvaluator for VectorizedEvaluator {
    fn evaluate(&self, fitness: &dyn FitnessFunction, designs: &[Array1<f64>]) -> EsResult<Vec<f64>> {
        let values = fitness.evaluate_batch(designs).map_err(EsError::Fitness)?;
        if values.len() != designs.len() {
            return Err(EsError::BatchSizeMismatch {
                expected: designs.len(),
                got: values.len(),
            });
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::{sphere, BatchFitness, FallibleFitness};
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn designs() -> Vec<Array1<f64>> {
        (0..16).map(|i| array![i as f64, 1.0]).collect()
    }

    #[test]
    fn test_rayon_preserves_order() {
        let evaluator = RayonEvaluator::new(Some(4)).unwrap();
        let values = evaluator.evaluate(&sphere, &designs()).unwrap();
        let expected: Vec<f64> = designs().iter().map(sphere).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_rayon_global_pool() {
        let evaluator = RayonEvaluator::new(None).unwrap();
        assert_eq!(evaluator.evaluate(&sphere, &designs()).unwrap().len(), 16);
        assert!(RayonEvaluator::new(Some(0)).is_err());
    }

    #[test]
    fn test_rayon_propagates_failure() {
        let failing = FallibleFitness::new(|x: &Array1<f64>| {
            if x[0] > 10.0 {
                anyhow::bail!("out of domain")
            }
            Ok(x[0])
        });
        let evaluator = RayonEvaluator::new(Some(2)).unwrap();
        assert!(matches!(evaluator.evaluate(&failing, &designs()), Err(EsError::Fitness(_))));
    }

    #[test]
    fn test_vectorized_single_call() {
        let calls = AtomicUsize::new(0);
        let batch = BatchFitness::new(|xs: &[Array1<f64>]| {
            calls.fetch_add(1, Ordering::SeqCst);
            xs.iter().map(sphere).collect()
        });
        let values = VectorizedEvaluator.evaluate(&batch, &designs()).unwrap();
        assert_eq!(values.len(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_vectorized_size_mismatch() {
        let short = BatchFitness::new(|_: &[Array1<f64>]| vec![1.0]);
        assert!(matches!(
            VectorizedEvaluator.evaluate(&short, &designs()),
            Err(EsError::BatchSizeMismatch { expected: 16, got: 1 })
        ));
    }
}
