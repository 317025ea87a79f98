//! Quasi-random (low-discrepancy) samplers mapped to the standard normal
//! distribution through the inverse CDF.

use crate::common::{normal_quantile, Sampler, SamplerError, SamplerResult};
use ndarray::Array1;
use rand::RngCore;
use tracing::warn;

const SOBOL_BITS: usize = 32;

/// Primitive polynomial degree, coefficient bits and initial direction
/// numbers for Sobol dimensions 2..=21.
const SOBOL_TABLE: [(u32, u32, &[u32]); 20] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
    (4, 4, &[1, 3, 5, 13]),
    (5, 2, &[1, 1, 5, 5, 17]),
    (5, 4, &[1, 1, 5, 5, 5]),
    (5, 7, &[1, 1, 7, 11, 19]),
    (5, 11, &[1, 1, 5, 1, 1]),
    (5, 13, &[1, 1, 1, 3, 11]),
    (5, 14, &[1, 3, 5, 5, 31]),
    (6, 1, &[1, 3, 3, 9, 7, 49]),
    (6, 13, &[1, 1, 1, 15, 21, 21]),
    (6, 16, &[1, 3, 1, 13, 27, 49]),
    (6, 19, &[1, 1, 1, 15, 7, 5]),
    (6, 22, &[1, 3, 1, 15, 13, 25]),
    (6, 25, &[1, 1, 5, 5, 19, 61]),
    (7, 1, &[1, 3, 7, 11, 23, 15, 103]),
    (7, 4, &[1, 3, 7, 13, 13, 15, 69]),
];

/// Highest dimension the Sobol direction table supports.
pub const MAX_SOBOL_DIM: usize = SOBOL_TABLE.len() + 1;

/// Gray-code Sobol sequence in [0, 1)^n.
#[derive(Clone, Debug)]
struct SobolSequence {
    directions: Vec<[u32; SOBOL_BITS]>,
    state: Vec<u32>,
    index: u64,
}

impl SobolSequence {
    fn new(n: usize) -> Self {
        let mut directions = Vec::with_capacity(n);

        let mut first = [0u32; SOBOL_BITS];
        for (k, v) in first.iter_mut().enumerate() {
            *v = 1u32 << (SOBOL_BITS - 1 - k);
        }
        directions.push(first);

        for &(s, a, m) in SOBOL_TABLE.iter().take(n.saturating_sub(1)) {
            let s = s as usize;
            let mut v = [0u32; SOBOL_BITS];
            for k in 0..SOBOL_BITS {
                if k < s {
                    v[k] = m[k] << (SOBOL_BITS - 1 - k);
                } else {
                    let mut value = v[k - s] ^ (v[k - s] >> s);
                    for i in 1..s {
                        if (a >> (s - 1 - i)) & 1 == 1 {
                            value ^= v[k - i];
                        }
                    }
                    v[k] = value;
                }
            }
            directions.push(v);
        }

        Self {
            directions,
            state: vec![0; n],
            index: 0,
        }
    }

    /// Advances to the next point; the origin (index 0) is never returned.
    fn next_point(&mut self) -> Array1<f64> {
        let c = self.index.trailing_ones() as usize;
        self.index += 1;
        for (x, dir) in self.state.iter_mut().zip(&self.directions) {
            *x ^= dir[c.min(SOBOL_BITS - 1)];
        }
        let scale = (1u64 << SOBOL_BITS) as f64;
        self.state.iter().map(|&x| x as f64 / scale).collect()
    }
}

/// Halton sequence over the first `n` primes.
#[derive(Clone, Debug)]
struct HaltonSequence {
    bases: Vec<u64>,
    index: u64,
}

impl HaltonSequence {
    fn new(n: usize) -> Self {
        Self {
            bases: first_primes(n),
            index: 0,
        }
    }

    fn next_point(&mut self) -> Array1<f64> {
        self.index += 1;
        let i = self.index;
        self.bases.iter().map(|&b| radical_inverse(i, b)).collect()
    }
}

fn radical_inverse(mut i: u64, base: u64) -> f64 {
    let inv = 1.0 / base as f64;
    let mut f = inv;
    let mut r = 0.0;
    while i > 0 {
        r += f * (i % base) as f64;
        i /= base;
        f *= inv;
    }
    r
}

fn first_primes(n: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(n);
    let mut candidate = 2u64;
    while primes.len() < n {
        if primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

#[derive(Clone, Debug)]
enum Sequence {
    Sobol(SobolSequence),
    Halton(HaltonSequence),
}

impl Sequence {
    fn next_gaussian(&mut self) -> Array1<f64> {
        let u = match self {
            Sequence::Sobol(s) => s.next_point(),
            Sequence::Halton(h) => h.next_point(),
        };
        u.mapv(normal_quantile)
    }
}

/// Sobol points pushed through the normal quantile.
///
/// Falls back to the Halton sequence when `n` exceeds [`MAX_SOBOL_DIM`].
#[derive(Clone, Debug)]
pub struct QuasiGaussianSobolSampler {
    n: usize,
    sequence: Sequence,
}

impl QuasiGaussianSobolSampler {
    pub fn new(n: usize) -> SamplerResult<Self> {
        if n == 0 {
            return Err(SamplerError::ZeroDimension);
        }
        let sequence = if n <= MAX_SOBOL_DIM {
            Sequence::Sobol(SobolSequence::new(n))
        } else {
            warn!(
                "Sobol directions available up to {} dimensions, using Halton for n={}",
                MAX_SOBOL_DIM, n
            );
            Sequence::Halton(HaltonSequence::new(n))
        };
        Ok(Self { n, sequence })
    }

    /// Whether the Halton fallback is in use.
    pub fn is_halton_fallback(&self) -> bool {
        matches!(self.sequence, Sequence::Halton(_))
    }
}

impl Sampler for QuasiGaussianSobolSampler {
    fn dim(&self) -> usize {
        self.n
    }

    fn next(&mut self, _rng: &mut dyn RngCore) -> Array1<f64> {
        self.sequence.next_gaussian()
    }
}

/// Halton points pushed through the normal quantile.
#[derive(Clone, Debug)]
pub struct QuasiGaussianHaltonSampler {
    n: usize,
    sequence: Sequence,
}

impl QuasiGaussianHaltonSampler {
    pub fn new(n: usize) -> SamplerResult<Self> {
        if n == 0 {
            return Err(SamplerError::ZeroDimension);
        }
        Ok(Self {
            n,
            sequence: Sequence::Halton(HaltonSequence::new(n)),
        })
    }
}

impl Sampler for QuasiGaussianHaltonSampler {
    fn dim(&self) -> usize {
        self.n
    }

    fn next(&mut self, _rng: &mut dyn RngCore) -> Array1<f64> {
        self.sequence.next_gaussian()
    }
}
