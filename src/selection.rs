//! Parent selection for the next generation.

use crate::individual::{sort_by_fitness, Individual};
use crate::parameters::{Parameters, ANCESTOR_DEPTH};

/// Chooses the next parent set from the parents and the evaluated offspring.
pub trait Selector: Send {
    /// Returns `params.mu` individuals when the pool holds at least that many.
    fn select(
        &self,
        parents: Vec<Individual>,
        offspring: Vec<Individual>,
        params: &mut Parameters,
    ) -> Vec<Individual>;
}

/// Sort the pool, remember its steps and fitness for the covariance
/// updates, keep the `mu` best.
fn rank_and_truncate(mut pool: Vec<Individual>, params: &mut Parameters) -> Vec<Individual> {
    sort_by_fitness(&mut pool);
    params.ranked_y = pool.iter().map(|ind| ind.mutation_vector.clone()).collect();
    params.ranked_z = pool.iter().map(|ind| ind.last_z.clone()).collect();
    params.ranked_fitness = pool.iter().map(|ind| ind.fitness).collect();
    pool.truncate(params.mu);
    pool
}

/// (mu, lambda) or, when elitist, (mu + lambda) truncation selection.
#[derive(Clone, Copy, Debug, Default)]
pub struct BestSelection {
    pub elitist: bool,
}

impl BestSelection {
    pub fn new(elitist: bool) -> Self {
        Self { elitist }
    }
}

impl Selector for BestSelection {
    fn select(
        &self,
        parents: Vec<Individual>,
        offspring: Vec<Individual>,
        params: &mut Parameters,
    ) -> Vec<Individual> {
        let mut pool = offspring;
        if self.elitist {
            pool.extend(parents.into_iter().filter(Individual::is_evaluated));
        }
        rank_and_truncate(pool, params)
    }
}

/// Keeps the better offspring of every consecutive (mirrored) pair, then
/// applies truncation selection.
#[derive(Clone, Copy, Debug, Default)]
pub struct PairwiseSelection {
    pub elitist: bool,
}

impl PairwiseSelection {
    pub fn new(elitist: bool) -> Self {
        Self { elitist }
    }

    /// Winner of each pair `(2i, 2i+1)`; an unpaired trailing offspring is kept.
    pub fn pair_winners(offspring: Vec<Individual>) -> Vec<Individual> {
        let mut winners = Vec::with_capacity(offspring.len().div_ceil(2));
        let mut iter = offspring.into_iter();
        while let Some(first) = iter.next() {
            match iter.next() {
                Some(second) if second.fitness < first.fitness => winners.push(second),
                _ => winners.push(first),
            }
        }
        winners
    }
}

impl Selector for PairwiseSelection {
    fn select(
        &self,
        parents: Vec<Individual>,
        offspring: Vec<Individual>,
        params: &mut Parameters,
    ) -> Vec<Individual> {
        BestSelection::new(self.elitist).select(parents, Self::pair_winners(offspring), params)
    }
}

/// Plus-selection of the (1+1) family: the offspring replaces the parent
/// when it is at least as good.
///
/// With ancestor tracking (active (1+1)-CMA-ES) it also flags offspring that
/// are worse than the parent `ANCESTOR_DEPTH` generations back.
#[derive(Clone, Copy, Debug, Default)]
pub struct OnePlusOneSelection {
    pub track_ancestors: bool,
}

impl OnePlusOneSelection {
    pub fn new() -> Self {
        Self { track_ancestors: false }
    }

    pub fn with_ancestor_tracking() -> Self {
        Self { track_ancestors: true }
    }
}

impl Selector for OnePlusOneSelection {
    fn select(
        &self,
        parents: Vec<Individual>,
        offspring: Vec<Individual>,
        params: &mut Parameters,
    ) -> Vec<Individual> {
        let mut parents = parents.into_iter();
        let parent = parents.next();
        let Some(child) = offspring.into_iter().next() else {
            params.success = false;
            params.worse_than_ancestor = false;
            return parent.into_iter().collect();
        };

        let parent_fitness = parent.as_ref().map_or(f64::INFINITY, |p| p.fitness);
        params.success = child.fitness <= parent_fitness;
        params.ranked_y = vec![child.mutation_vector.clone()];
        params.ranked_z = vec![child.last_z.clone()];
        params.ranked_fitness = vec![
            child.fitness.min(parent_fitness),
            child.fitness.max(parent_fitness),
        ];

        if self.track_ancestors {
            params.worse_than_ancestor = params.ancestor_fitness.len() == ANCESTOR_DEPTH
                && params
                    .ancestor_fitness
                    .front()
                    .is_some_and(|&oldest| child.fitness > oldest);
        }

        let survivor = match parent {
            Some(parent) if !params.success => parent,
            _ => child,
        };
        if self.track_ancestors {
            params.record_ancestor(survivor.fitness);
        }
        vec![survivor]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn evaluated(x: f64, fitness: f64) -> Individual {
        let mut ind = Individual::at(array![x]);
        ind.fitness = fitness;
        ind
    }

    #[test]
    fn test_best_selection_returns_mu() {
        let mut params = Parameters::new(1, 100, 3, 6).unwrap();
        let offspring: Vec<Individual> =
            [5.0, 1.0, 4.0, 2.0, 6.0, 3.0].iter().map(|&f| evaluated(f, f)).collect();
        let selected = BestSelection::new(false).select(Vec::new(), offspring, &mut params);
        let fitness: Vec<f64> = selected.iter().map(|i| i.fitness).collect();
        assert_eq!(fitness, vec![1.0, 2.0, 3.0]);
        assert_eq!(params.ranked_fitness.len(), 6);
    }

    #[test]
    fn test_elitist_keeps_better_parent() {
        let mut params = Parameters::new(1, 100, 1, 2).unwrap();
        let parents = vec![evaluated(0.0, 0.5)];
        let offspring = vec![evaluated(1.0, 1.0), evaluated(2.0, 2.0)];
        let selected = BestSelection::new(true).select(parents.clone(), offspring.clone(), &mut params);
        assert_eq!(selected[0].fitness, 0.5);
        let selected = BestSelection::new(false).select(parents, offspring, &mut params);
        assert_eq!(selected[0].fitness, 1.0);
    }

    #[test]
    fn test_pair_winners() {
        let offspring: Vec<Individual> =
            [3.0, 1.0, 2.0, 5.0, 4.0].iter().map(|&f| evaluated(f, f)).collect();
        let winners: Vec<f64> = PairwiseSelection::pair_winners(offspring)
            .iter()
            .map(|i| i.fitness)
            .collect();
        assert_eq!(winners, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_pairwise_selects_from_winners_only() {
        let mut params = Parameters::new(1, 100, 2, 4).unwrap();
        let offspring: Vec<Individual> =
            [1.0, 2.0, 3.0, 4.0].iter().map(|&f| evaluated(f, f)).collect();
        let selected = PairwiseSelection::new(false).select(Vec::new(), offspring, &mut params);
        let fitness: Vec<f64> = selected.iter().map(|i| i.fitness).collect();
        assert_eq!(fitness, vec![1.0, 3.0]);
    }

    #[test]
    fn test_one_plus_one_accepts_equal() {
        let mut params = Parameters::new(1, 100, 1, 1).unwrap();
        let selector = OnePlusOneSelection::new();
        let kept = selector.select(vec![evaluated(0.0, 1.0)], vec![evaluated(1.0, 1.0)], &mut params);
        assert!(params.success);
        assert_eq!(kept[0].dna[0], 1.0);

        let kept = selector.select(vec![evaluated(0.0, 1.0)], vec![evaluated(1.0, 2.0)], &mut params);
        assert!(!params.success);
        assert_eq!(kept[0].dna[0], 0.0);
    }

    #[test]
    fn test_ancestor_tracking() {
        let mut params = Parameters::new(1, 100, 1, 1).unwrap();
        let selector = OnePlusOneSelection::with_ancestor_tracking();
        let mut parent = evaluated(0.0, 10.0);
        for f in [9.0, 8.0, 7.0, 6.0, 5.0] {
            parent = selector
                .select(vec![parent], vec![evaluated(f, f)], &mut params)
                .remove(0);
            assert!(!params.worse_than_ancestor);
        }
        // Oldest remembered ancestor has fitness 9.
        selector.select(vec![parent.clone()], vec![evaluated(0.0, 9.5)], &mut params);
        assert!(!params.success);
        assert!(params.worse_than_ancestor);
        selector.select(vec![parent], vec![evaluated(0.0, 5.5)], &mut params);
        assert!(!params.worse_than_ancestor);
    }
}
