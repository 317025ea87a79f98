//! Perturbation samplers for evolution strategies.
//!
//! Every sampler yields `n`-dimensional vectors distributed (approximately)
//! as a standard normal. Composite samplers wrap a base sampler:
//! orthogonal blocks first, mirroring on top.

pub mod common;
pub mod gaussian;
pub mod mirrored;
pub mod orthogonal;
pub mod quasi;

/// Re-export common types
pub use common::*;
pub use gaussian::GaussianSampler;
pub use mirrored::MirroredSampler;
pub use orthogonal::OrthogonalSampler;
pub use quasi::{QuasiGaussianHaltonSampler, QuasiGaussianSobolSampler, MAX_SOBOL_DIM};

/// Build the sampler described by `config` for `n` dimensions, drawing `batch`
/// samples per generation.
pub fn build_sampler(n: usize, batch: usize, config: SamplerConfig) -> SamplerResult<Box<dyn Sampler>> {
    if batch == 0 {
        return Err(SamplerError::ZeroBatch);
    }

    let mut sampler: Box<dyn Sampler> = match config.base {
        BaseSampler::Gaussian => Box::new(GaussianSampler::new(n)?),
        BaseSampler::QuasiSobol => Box::new(QuasiGaussianSobolSampler::new(n)?),
        BaseSampler::QuasiHalton => Box::new(QuasiGaussianHaltonSampler::new(n)?),
    };

    if config.orthogonal {
        // Mirroring halves the number of fresh samples per generation.
        let fresh = if config.mirrored { batch.div_ceil(2) } else { batch };
        sampler = Box::new(OrthogonalSampler::new(sampler, fresh));
    }

    if config.mirrored {
        sampler = Box::new(MirroredSampler::new(sampler));
    }

    tracing::debug!(
        "Built {} sampler (orthogonal={}, mirrored={}) for n={}",
        config.base,
        config.orthogonal,
        config.mirrored,
        n
    );
    Ok(sampler)
}
