use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A candidate solution.
///
/// `fitness` is `+inf` until the individual has been evaluated. The remaining
/// fields record how the last mutation was produced so that the parameter
/// adapters can reuse the step after selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Individual {
    pub dna: Array1<f64>,
    pub fitness: f64,
    /// Raw sampler output used in the last mutation
    pub last_z: Array1<f64>,
    /// Transformed step (`B·D·z` or `A·z`) before scaling by sigma
    pub mutation_vector: Array1<f64>,
    /// Individual step size (self-adaptive variants only)
    pub sigma: f64,
}

impl Individual {
    /// Unevaluated individual at the origin.
    pub fn new(n: usize) -> Self {
        Self::at(Array1::zeros(n))
    }

    /// Unevaluated individual at `dna`.
    pub fn at(dna: Array1<f64>) -> Self {
        let n = dna.len();
        Self {
            dna,
            fitness: f64::INFINITY,
            last_z: Array1::zeros(n),
            mutation_vector: Array1::zeros(n),
            sigma: 1.0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dna.len()
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_finite()
    }

    /// Ascending fitness order, NaN last.
    pub fn cmp_fitness(&self, other: &Self) -> Ordering {
        self.fitness
            .partial_cmp(&other.fitness)
            .unwrap_or_else(|| self.fitness.is_nan().cmp(&other.fitness.is_nan()))
    }
}

/// Sort ascending by fitness; stable, so equal fitness keeps insertion order.
pub fn sort_by_fitness(population: &mut [Individual]) {
    population.sort_by(|a, b| a.cmp_fitness(b));
}
