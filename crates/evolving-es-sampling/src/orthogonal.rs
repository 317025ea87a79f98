use crate::common::Sampler;
use ndarray::Array1;
use rand::RngCore;
use std::collections::VecDeque;

/// Draws blocks of base samples and orthogonalizes each block with
/// Gram-Schmidt, keeping the original sample lengths.
pub struct OrthogonalSampler {
    base: Box<dyn Sampler>,
    batch: usize,
    buffer: VecDeque<Array1<f64>>,
}

impl OrthogonalSampler {
    /// `batch` is the number of samples requested per generation.
    pub fn new(base: Box<dyn Sampler>, batch: usize) -> Self {
        Self {
            base,
            batch: batch.max(1),
            buffer: VecDeque::new(),
        }
    }

    fn refill(&mut self, rng: &mut dyn RngCore) {
        let n = self.base.dim();
        let mut remaining = self.batch;
        while remaining > 0 {
            let block = remaining.min(n);
            let raw = self.base.sample(block, rng);
            let lengths: Vec<f64> = raw.iter().map(norm).collect();
            let basis = gram_schmidt(&raw);
            for (q, len) in basis.into_iter().zip(lengths) {
                self.buffer.push_back(q * len);
            }
            remaining -= block;
        }
    }
}

fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// Orthonormalizes `vectors` in order. A vector that becomes numerically
/// dependent on its predecessors is kept normalized but not orthogonalized.
fn gram_schmidt(vectors: &[Array1<f64>]) -> Vec<Array1<f64>> {
    let mut basis: Vec<Array1<f64>> = Vec::with_capacity(vectors.len());
    for v in vectors {
        let mut u = v.clone();
        for q in &basis {
            let proj = u.dot(q);
            u.scaled_add(-proj, q);
        }
        let len = norm(&u);
        if len > 1e-12 {
            basis.push(u / len);
        } else {
            let len = norm(v).max(f64::MIN_POSITIVE);
            basis.push(v / len);
        }
    }
    basis
}

impl Sampler for OrthogonalSampler {
    fn dim(&self) -> usize {
        self.base.dim()
    }

    fn next(&mut self, rng: &mut dyn RngCore) -> Array1<f64> {
        if self.buffer.is_empty() {
            self.refill(rng);
        }
        match self.buffer.pop_front() {
            Some(sample) => sample,
            None => self.base.next(rng),
        }
    }

    fn reset(&mut self, batch: usize) {
        self.batch = batch.max(1);
        self.buffer.clear();
        self.base.reset(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian::GaussianSampler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_block_is_orthogonal() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut sampler = OrthogonalSampler::new(Box::new(GaussianSampler::new(5).unwrap()), 4);
        let samples = sampler.sample(4, &mut rng);
        for i in 0..4 {
            for j in (i + 1)..4 {
                let dot = samples[i].dot(&samples[j]);
                assert!(dot.abs() < 1e-9, "samples {} and {} not orthogonal: {}", i, j, dot);
            }
        }
    }

    #[test]
    fn test_batch_larger_than_dimension() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut sampler = OrthogonalSampler::new(Box::new(GaussianSampler::new(2).unwrap()), 5);
        let samples = sampler.sample(5, &mut rng);
        assert_eq!(samples.len(), 5);
        assert!(samples[0].dot(&samples[1]).abs() < 1e-9);
        assert!(samples[2].dot(&samples[3]).abs() < 1e-9);
        assert!(samples.iter().all(|s| norm(s) > 0.0));
    }
}
