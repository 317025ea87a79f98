use crate::common::Sampler;
use ndarray::Array1;
use rand::RngCore;

/// Antithetic sampling: every second vector is the negation of the previous one.
pub struct MirroredSampler {
    base: Box<dyn Sampler>,
    pending: Option<Array1<f64>>,
}

impl MirroredSampler {
    pub fn new(base: Box<dyn Sampler>) -> Self {
        Self {
            base,
            pending: None,
        }
    }
}

impl Sampler for MirroredSampler {
    fn dim(&self) -> usize {
        self.base.dim()
    }

    fn next(&mut self, rng: &mut dyn RngCore) -> Array1<f64> {
        match self.pending.take() {
            Some(last) => -last,
            None => {
                let sample = self.base.next(rng);
                self.pending = Some(sample.clone());
                sample
            }
        }
    }

    fn reset(&mut self, batch: usize) {
        self.pending = None;
        self.base.reset(batch.div_ceil(2));
    }
}
