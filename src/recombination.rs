//! Offspring seeds from the current parents.

use crate::individual::Individual;
use crate::parameters::Parameters;
use ndarray::Array1;

/// Builds the unmutated offspring of the next generation.
pub trait Recombiner: Send {
    /// Returns `params.eff_lambda()` seeds (one for the (1+1) family).
    fn recombine(&self, parents: &[Individual], params: &mut Parameters) -> Vec<Individual>;
}

/// The (1+1) family: one seed, a copy of the sole parent.
#[derive(Clone, Copy, Debug, Default)]
pub struct OnePlusOneRecombination;

impl Recombiner for OnePlusOneRecombination {
    fn recombine(&self, parents: &[Individual], params: &mut Parameters) -> Vec<Individual> {
        let parent = match parents.first() {
            Some(p) => p.dna.clone(),
            None => params.wcm.clone(),
        };
        params.wcm_old = std::mem::replace(&mut params.wcm, parent.clone());
        vec![Individual::at(parent)]
    }
}

/// Weighted intermediate recombination around the weighted centroid.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedRecombination;

impl WeightedRecombination {
    /// Weighted mean of the parents. With fewer parents than weights the
    /// leading weights are renormalized.
    pub fn centroid(parents: &[Individual], weights: &Array1<f64>) -> Option<Array1<f64>> {
        let k = parents.len().min(weights.len());
        let first = parents.first()?;
        let total: f64 = weights.iter().take(k).sum();
        let mut wcm = Array1::zeros(first.dim());
        for (parent, &w) in parents.iter().zip(weights.iter()).take(k) {
            wcm.scaled_add(w / total, &parent.dna);
        }
        Some(wcm)
    }
}

impl Recombiner for WeightedRecombination {
    fn recombine(&self, parents: &[Individual], params: &mut Parameters) -> Vec<Individual> {
        let wcm = Self::centroid(parents, &params.weights).unwrap_or_else(|| params.wcm.clone());
        params.wcm_old = std::mem::replace(&mut params.wcm, wcm);
        (0..params.eff_lambda())
            .map(|_| Individual::at(params.wcm.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn parent(dna: Array1<f64>, fitness: f64) -> Individual {
        let mut ind = Individual::at(dna);
        ind.fitness = fitness;
        ind
    }

    #[test]
    fn test_one_plus_one_copies_parent() {
        let mut params = Parameters::new(2, 100, 1, 1).unwrap();
        let seeds = OnePlusOneRecombination.recombine(&[parent(array![1.0, 2.0], 5.0)], &mut params);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].dna, array![1.0, 2.0]);
        assert!(!seeds[0].is_evaluated());
        assert_eq!(params.wcm, array![1.0, 2.0]);
    }

    #[test]
    fn test_weighted_recombination_records_old_centroid() {
        let mut params = Parameters::new(2, 100, 2, 4).unwrap();
        params.wcm = array![9.0, 9.0];
        let parents = vec![parent(array![0.0, 0.0], 1.0), parent(array![2.0, 2.0], 2.0)];
        let seeds = WeightedRecombination.recombine(&parents, &mut params);
        assert_eq!(seeds.len(), 4);
        assert_eq!(params.wcm_old, array![9.0, 9.0]);
        let expected = params.weights[1] * 2.0;
        assert!((params.wcm[0] - expected).abs() < 1e-12);
        assert!(seeds.iter().all(|s| s.dna == params.wcm));
    }

    #[test]
    fn test_fewer_parents_renormalizes_weights() {
        let weights = array![0.5, 0.3, 0.2];
        let parents = vec![parent(array![1.0], 0.0), parent(array![4.0], 0.0)];
        let wcm = WeightedRecombination::centroid(&parents, &weights).unwrap();
        assert!((wcm[0] - (0.5 + 4.0 * 0.3) / 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_two_point_reserves_probe_evaluations() {
        let options = crate::config::EsOptions {
            two_point: true,
            lambda: Some(6),
            ..Default::default()
        };
        let mut params = Parameters::from_resolved(&options.resolve(3).unwrap(), 100).unwrap();
        let parents = vec![parent(array![0.0, 0.0, 0.0], 0.0)];
        assert_eq!(WeightedRecombination.recombine(&parents, &mut params).len(), 4);
    }
}
