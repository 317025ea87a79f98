use ndarray::Array1;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sampler construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    /// Zero-dimensional sampling makes no sense
    #[error("Sampler dimension must be positive")]
    ZeroDimension,

    /// Batch size used by block samplers must be positive
    #[error("Sampler batch size must be positive")]
    ZeroBatch,

    /// Unrecognized base sampler name
    #[error("Unknown base sampler: {0}")]
    UnknownBaseSampler(String),
}

pub type SamplerResult<T> = Result<T, SamplerError>;

/// Produces raw perturbation vectors for the mutation operator.
pub trait Sampler: Send {
    /// Dimension of the produced vectors.
    fn dim(&self) -> usize;

    /// Draw the next vector.
    fn next(&mut self, rng: &mut dyn RngCore) -> Array1<f64>;

    /// Draw `count` vectors in order.
    fn sample(&mut self, count: usize, rng: &mut dyn RngCore) -> Vec<Array1<f64>> {
        (0..count).map(|_| self.next(rng)).collect()
    }

    /// Called when the number of samples drawn per generation changes (restarts).
    /// Samplers that work in blocks discard any buffered samples.
    fn reset(&mut self, _batch: usize) {}
}

/// The lowest-level sampler a composite sampler is built on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseSampler {
    #[default]
    #[serde(rename = "gaussian", alias = "none")]
    Gaussian,
    #[serde(rename = "quasi-sobol")]
    QuasiSobol,
    #[serde(rename = "quasi-halton")]
    QuasiHalton,
}

impl FromStr for BaseSampler {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gaussian" | "normal" | "none" => Ok(BaseSampler::Gaussian),
            "quasi-sobol" | "quasi_sobol" | "sobol" => Ok(BaseSampler::QuasiSobol),
            "quasi-halton" | "quasi_halton" | "halton" => Ok(BaseSampler::QuasiHalton),
            _ => Err(SamplerError::UnknownBaseSampler(s.to_string())),
        }
    }
}

impl fmt::Display for BaseSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseSampler::Gaussian => "gaussian",
            BaseSampler::QuasiSobol => "quasi-sobol",
            BaseSampler::QuasiHalton => "quasi-halton",
        };
        f.write_str(name)
    }
}

/// Full description of a (possibly composite) sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub base: BaseSampler,
    pub orthogonal: bool,
    pub mirrored: bool,
}

impl SamplerConfig {
    pub fn gaussian() -> Self {
        Self::default()
    }
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// relative error below 1.15e-9 on (0, 1)).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_quantile_symmetry() {
        assert_eq!(normal_quantile(0.5), 0.0);
        for &p in &[0.001, 0.01, 0.1, 0.3] {
            let lo = normal_quantile(p);
            let hi = normal_quantile(1.0 - p);
            assert!((lo + hi).abs() < 1e-8, "asymmetric quantile at {}", p);
        }
    }

    #[test]
    fn test_normal_quantile_known_values() {
        assert!((normal_quantile(0.975) - 1.959_963_985).abs() < 1e-6);
        assert!((normal_quantile(0.841_344_746) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_base_sampler_parsing() {
        assert_eq!("quasi-sobol".parse::<BaseSampler>().unwrap(), BaseSampler::QuasiSobol);
        assert_eq!("Halton".parse::<BaseSampler>().unwrap(), BaseSampler::QuasiHalton);
        assert!("latin".parse::<BaseSampler>().is_err());
    }
}
