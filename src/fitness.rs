use ndarray::Array1;

/// Black-box objective to minimize.
pub trait FitnessFunction: Send + Sync {
    /// Fitness of one design vector (lower is better).
    fn evaluate(&self, dna: &Array1<f64>) -> anyhow::Result<f64>;

    /// Fitness of a batch of design vectors, order preserved.
    ///
    /// Back ends that ship a whole generation elsewhere in one call (a
    /// message-passing cluster, a vectorized simulator) override this.
    fn evaluate_batch(&self, designs: &[Array1<f64>]) -> anyhow::Result<Vec<f64>> {
        designs.iter().map(|d| self.evaluate(d)).collect()
    }
}

impl<F> FitnessFunction for F
where
    F: Fn(&Array1<f64>) -> f64 + Send + Sync,
{
    fn evaluate(&self, dna: &Array1<f64>) -> anyhow::Result<f64> {
        Ok(self(dna))
    }
}

/// A fitness function defined by a closure that can fail.
pub struct FallibleFitness<F>
where
    F: Fn(&Array1<f64>) -> anyhow::Result<f64> + Send + Sync,
{
    pub func: F,
}

impl<F> FallibleFitness<F>
where
    F: Fn(&Array1<f64>) -> anyhow::Result<f64> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> FitnessFunction for FallibleFitness<F>
where
    F: Fn(&Array1<f64>) -> anyhow::Result<f64> + Send + Sync,
{
    fn evaluate(&self, dna: &Array1<f64>) -> anyhow::Result<f64> {
        (self.func)(dna)
    }
}

/// A fitness function whose natural interface is a whole batch.
pub struct BatchFitness<F>
where
    F: Fn(&[Array1<f64>]) -> Vec<f64> + Send + Sync,
{
    pub func: F,
}

impl<F> BatchFitness<F>
where
    F: Fn(&[Array1<f64>]) -> Vec<f64> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> FitnessFunction for BatchFitness<F>
where
    F: Fn(&[Array1<f64>]) -> Vec<f64> + Send + Sync,
{
    fn evaluate(&self, dna: &Array1<f64>) -> anyhow::Result<f64> {
        let values = (self.func)(std::slice::from_ref(dna));
        values
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("batch fitness returned no value"))
    }

    fn evaluate_batch(&self, designs: &[Array1<f64>]) -> anyhow::Result<Vec<f64>> {
        Ok((self.func)(designs))
    }
}

/// Squared Euclidean norm, the reference test function.
pub fn sphere(x: &Array1<f64>) -> f64 {
    x.dot(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_closure_fitness() {
        let f = |x: &Array1<f64>| x.sum();
        assert_eq!(f.evaluate(&array![1.0, 2.0]).unwrap(), 3.0);
        let batch = f.evaluate_batch(&[array![1.0], array![4.0]]).unwrap();
        assert_eq!(batch, vec![1.0, 4.0]);
    }

    #[test]
    fn test_fallible_fitness_propagates() {
        let f = FallibleFitness::new(|x: &Array1<f64>| {
            if x[0] < 0.0 {
                anyhow::bail!("negative input")
            }
            Ok(x[0])
        });
        assert!(f.evaluate(&array![-1.0]).is_err());
        assert_eq!(f.evaluate(&array![2.0]).unwrap(), 2.0);
    }

    #[test]
    fn test_batch_fitness_single_call() {
        let f = BatchFitness::new(|xs: &[Array1<f64>]| xs.iter().map(sphere).collect());
        assert_eq!(f.evaluate(&array![3.0, 4.0]).unwrap(), 25.0);
        assert_eq!(f.evaluate_batch(&[array![1.0], array![2.0]]).unwrap(), vec![1.0, 4.0]);
    }
}
