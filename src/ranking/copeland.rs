//! Copeland ranking from pairwise win probabilities
//!
//! An item's Copeland score is the fraction of opponents it is predicted to
//! beat, i.e. `predict_preference(i, j) > 0.5`. Items are ordered by
//! descending score with ties broken by ascending index, so the ranking is a
//! pure function of the model state.

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::RankingConfig;
use crate::error::PboResult;
use crate::model::PreferenceModel;

/// Items in rank order with their Copeland scores
///
/// `scores[k]` belongs to `order[k]`. Always a permutation of `0..n`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    order: Vec<usize>,
    scores: Vec<f64>,
}

impl Ranking {
    /// Build a ranking from per-item scores (indexed by item)
    pub fn from_item_scores(item_scores: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..item_scores.len()).collect();
        order.sort_by(|&a, &b| {
            item_scores[b]
                .total_cmp(&item_scores[a])
                .then_with(|| a.cmp(&b))
        });
        let scores = order.iter().map(|&i| item_scores[i]).collect();
        Self { order, scores }
    }

    /// Index order with zero scores, used before any model exists
    pub fn unranked(n_items: usize) -> Self {
        Self {
            order: (0..n_items).collect(),
            scores: vec![0.0; n_items],
        }
    }

    /// Item indices, best first
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Scores parallel to [`Ranking::order`]
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Number of ranked items
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true for an empty pool
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Best item
    pub fn leader(&self) -> Option<usize> {
        self.order.first().copied()
    }

    /// Top `k` items in rank order (all items if `k` exceeds the pool)
    pub fn top_k(&self, k: usize) -> &[usize] {
        &self.order[..k.min(self.order.len())]
    }

    /// Top `k` items as an unordered set
    pub fn top_k_set(&self, k: usize) -> BTreeSet<usize> {
        self.top_k(k).iter().copied().collect()
    }

    /// Rank position of `item` (0 = best)
    pub fn position_of(&self, item: usize) -> Option<usize> {
        self.order.iter().position(|&i| i == item)
    }

    /// Score of `item`
    pub fn score_of(&self, item: usize) -> Option<f64> {
        self.position_of(item).map(|p| self.scores[p])
    }

    /// `(item, score)` pairs in rank order
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.order.iter().copied().zip(self.scores.iter().copied())
    }

    /// Returns true if `order` is a permutation of `0..len`
    pub fn is_permutation(&self) -> bool {
        let mut seen = vec![false; self.order.len()];
        for &i in &self.order {
            if i >= seen.len() || seen[i] {
                return false;
            }
            seen[i] = true;
        }
        self.scores.len() == self.order.len()
    }
}

/// Ranks a pool by Copeland score under a trained model
#[derive(Clone, Debug, Default)]
pub struct CopelandRanker {
    config: RankingConfig,
}

impl CopelandRanker {
    /// Create a new ranker
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Rank every item in the model's pool
    pub fn rank(&self, model: &PreferenceModel) -> PboResult<Ranking> {
        let n = model.n_items();
        let item_scores = self.item_scores(model, n)?;
        Ok(Ranking::from_item_scores(&item_scores))
    }

    #[cfg(feature = "parallel")]
    fn item_scores(&self, model: &PreferenceModel, n: usize) -> PboResult<Vec<f64>> {
        (0..n)
            .into_par_iter()
            .map(|i| self.copeland_score(model, i, n))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn item_scores(&self, model: &PreferenceModel, n: usize) -> PboResult<Vec<f64>> {
        (0..n).map(|i| self.copeland_score(model, i, n)).collect()
    }

    fn copeland_score(&self, model: &PreferenceModel, item: usize, n: usize) -> PboResult<f64> {
        let opponents = self.opponents(item, n);
        if opponents.is_empty() {
            return Ok(0.0);
        }
        let mut wins = 0usize;
        for &j in &opponents {
            if model.predict_preference(item, j)? > 0.5 {
                wins += 1;
            }
        }
        Ok(wins as f64 / opponents.len() as f64)
    }

    /// Opponents of `item`: everyone else, or a seeded sample of them
    fn opponents(&self, item: usize, n: usize) -> Vec<usize> {
        let others = (0..n).filter(|&j| j != item);
        match self.config.max_opponents {
            Some(limit) if limit < n.saturating_sub(1) => {
                let seed = self.config.seed ^ (item as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                let mut rng = StdRng::seed_from_u64(seed);
                let others: Vec<usize> = others.collect();
                let mut sample: Vec<usize> =
                    others.choose_multiple(&mut rng, limit).copied().collect();
                sample.sort_unstable();
                sample
            }
            _ => others.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::model::PreferenceTrainer;
    use crate::pool::FeatureMatrix;
    use crate::preference::{LabeledPair, Pair};
    use approx::assert_relative_eq;

    fn chain_model(n: usize) -> PreferenceModel {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![(n - i) as f64]).collect();
        let features = FeatureMatrix::from_rows(&rows).unwrap();
        let mut obs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                obs.push(LabeledPair {
                    pair: Pair::new(i, j).unwrap(),
                    first_wins: true,
                });
            }
        }
        PreferenceTrainer::new(TrainingConfig::default())
            .fit(&obs, &features, None, 0)
            .unwrap()
    }

    #[test]
    fn test_from_item_scores_breaks_ties_by_index() {
        let ranking = Ranking::from_item_scores(&[0.5, 1.0, 0.5, 0.0]);
        assert_eq!(ranking.order(), &[1, 0, 2, 3]);
        assert_eq!(ranking.scores(), &[1.0, 0.5, 0.5, 0.0]);
        assert_eq!(ranking.leader(), Some(1));
        assert_eq!(ranking.position_of(2), Some(2));
        assert_eq!(ranking.score_of(3), Some(0.0));
        assert!(ranking.is_permutation());
    }

    #[test]
    fn test_top_k() {
        let ranking = Ranking::from_item_scores(&[0.1, 0.9, 0.4]);
        assert_eq!(ranking.top_k(2), &[1, 2]);
        assert_eq!(ranking.top_k(10).len(), 3);
        assert_eq!(ranking.top_k_set(2), [1, 2].into_iter().collect());
    }

    #[test]
    fn test_unranked() {
        let ranking = Ranking::unranked(3);
        assert_eq!(ranking.order(), &[0, 1, 2]);
        assert!(ranking.scores().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_copeland_on_consistent_chain() {
        let model = chain_model(4);
        let ranking = CopelandRanker::default().rank(&model).unwrap();
        assert_eq!(ranking.order(), &[0, 1, 2, 3]);
        let expected = [1.0, 2.0 / 3.0, 1.0 / 3.0, 0.0];
        for (got, want) in ranking.scores().iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rank_is_deterministic() {
        let model = chain_model(5);
        let ranker = CopelandRanker::default();
        assert_eq!(ranker.rank(&model).unwrap(), ranker.rank(&model).unwrap());
    }

    #[test]
    fn test_sampled_opponents() {
        let model = chain_model(6);
        let ranker = CopelandRanker::new(RankingConfig {
            max_opponents: Some(2),
            seed: 3,
        });
        let ranking = ranker.rank(&model).unwrap();
        assert!(ranking.is_permutation());
        assert_eq!(ranking.len(), 6);
        assert_eq!(ranker.opponents(0, 6).len(), 2);
        assert!(!ranker.opponents(4, 6).contains(&4));
        assert_eq!(ranker.opponents(1, 6), ranker.opponents(1, 6));
    }
}
