//! Acquisition strategies for choosing the next pairs to judge
//!
//! # Available Strategies
//!
//! - **Random**: uniform sampling without replacement over unordered pairs
//! - **ThompsonSampling**: pair items adjacent in the order of a posterior sample
//! - **Ucb**: pair the highest `mean + beta * std` items
//! - **ExpectedImprovement**: challenge the current Copeland leader
//! - **Variance**: pair items whose difference has the largest predictive variance
//!
//! Without a trained model every strategy behaves like `Random`.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::pairs::{all_pairs, order_by_score, BatchBuilder};
use crate::error::{PboError, PboResult};
use crate::model::link::expected_improvement;
use crate::model::PreferenceModel;
use crate::preference::{pair_count, Pair, PairSet};
use crate::ranking::{CopelandRanker, Ranking};

/// Pair-selection policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AcquisitionStrategy {
    /// Uniform random pairs
    Random,

    /// Thompson sampling
    ///
    /// Draws one joint posterior utility sample per pair and pairs items that
    /// are adjacent in the sampled order, so comparisons concentrate where the
    /// posterior is unsure about local order.
    ThompsonSampling,

    /// Upper confidence bound on item utility
    Ucb {
        /// Exploration weight on the posterior standard deviation (default: 2.0)
        beta: f64,
    },

    /// Expected improvement over the current Copeland leader
    ///
    /// Each challenger `c` is scored by `E[max(f(x̃_c − x̃_b) − xi, 0)]` where
    /// `b` is the leader.
    ExpectedImprovement {
        /// Improvement margin (default: 0.01)
        xi: f64,
    },

    /// Maximum predictive variance of the difference (pure exploration)
    Variance {
        /// Cap on pairs scored per batch; larger pools score the most
        /// uncertain items first (default: 20000)
        max_pair_evaluations: usize,
    },
}

impl Default for AcquisitionStrategy {
    fn default() -> Self {
        Self::ThompsonSampling
    }
}

/// Inputs a strategy may consult besides the model
#[derive(Clone, Copy, Debug)]
pub struct SelectionContext<'a> {
    /// Pairs that already have a definitive observation
    pub exhausted: &'a PairSet,
    /// Current ranking, if one has been computed
    pub ranking: Option<&'a Ranking>,
}

/// Pairs chosen for one batch
#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionBatch {
    /// Distinct canonical pairs, in priority order
    pub pairs: Vec<Pair>,
    /// How many of them repeat an already-answered pair
    pub repeated: usize,
    /// True when the random rule was used because no model exists
    pub cold_start: bool,
}

impl AcquisitionStrategy {
    /// Create a UCB strategy
    pub fn ucb(beta: f64) -> Self {
        Self::Ucb { beta }
    }

    /// Create an expected-improvement strategy
    pub fn expected_improvement(xi: f64) -> Self {
        Self::ExpectedImprovement { xi }
    }

    /// Create a variance strategy
    pub fn variance(max_pair_evaluations: usize) -> Self {
        Self::Variance {
            max_pair_evaluations,
        }
    }

    /// Canonical registry name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::ThompsonSampling => "thompson_sampling",
            Self::Ucb { .. } => "ucb",
            Self::ExpectedImprovement { .. } => "expected_improvement",
            Self::Variance { .. } => "variance",
        }
    }

    /// Choose `n_pairs` distinct unordered pairs over `candidates`
    ///
    /// Fresh pairs are always preferred. Already-answered pairs are repeated
    /// only when the candidates have too few fresh pairs left, and the count
    /// is reported in [`AcquisitionBatch::repeated`].
    ///
    /// # Errors
    ///
    /// - `InsufficientPool` with fewer than two distinct candidates
    /// - `Acquisition` when `n_pairs` exceeds the number of unordered pairs
    /// - `Validation` when a candidate lies outside the model's pool
    pub fn select(
        &self,
        model: Option<&PreferenceModel>,
        candidates: &[usize],
        n_pairs: usize,
        context: &SelectionContext<'_>,
        rng: &mut StdRng,
    ) -> PboResult<AcquisitionBatch> {
        let mut candidates = candidates.to_vec();
        candidates.sort_unstable();
        candidates.dedup();

        if candidates.len() < 2 {
            return Err(PboError::InsufficientPool(candidates.len()));
        }
        let total = pair_count(candidates.len());
        if n_pairs > total {
            return Err(PboError::Acquisition(format!(
                "requested {} pairs but {} candidates only form {}",
                n_pairs,
                candidates.len(),
                total
            )));
        }
        if let Some(model) = model {
            if let Some(&bad) = candidates.iter().find(|&&c| c >= model.n_items()) {
                return Err(PboError::Validation(format!(
                    "candidate {} is outside the pool of {} items",
                    bad,
                    model.n_items()
                )));
            }
        }

        let mut builder = BatchBuilder::new(context.exhausted, n_pairs);
        let cold_start = model.is_none() && !matches!(self, Self::Random);

        match (model, self) {
            (None, _) | (_, Self::Random) => {}
            (Some(model), Self::ThompsonSampling) => {
                thompson(model, &candidates, &mut builder, rng)
            }
            (Some(model), Self::Ucb { beta }) => ucb(model, &candidates, *beta, &mut builder),
            (Some(model), Self::ExpectedImprovement { xi }) => {
                expected_improvement_pairs(model, &candidates, *xi, context.ranking, &mut builder)?
            }
            (Some(model), Self::Variance {
                max_pair_evaluations,
            }) => variance(model, &candidates, *max_pair_evaluations, &mut builder)?,
        }

        builder.fill_random_fresh(&candidates, rng);
        let repeated = builder.fill_repeats(&candidates, rng);
        if repeated > 0 {
            tracing::warn!(
                repeated,
                n_pairs,
                candidates = candidates.len(),
                "not enough fresh pairs, batch repeats answered pairs"
            );
        }
        if cold_start {
            tracing::debug!(strategy = self.name(), "no model yet, using random pairs");
        }

        Ok(AcquisitionBatch {
            pairs: builder.finish(),
            repeated,
            cold_start,
        })
    }
}

fn thompson(
    model: &PreferenceModel,
    candidates: &[usize],
    builder: &mut BatchBuilder<'_>,
    rng: &mut StdRng,
) {
    while !builder.is_full() {
        let sample = model.sample_utilities(rng);
        let order = order_by_score(candidates, |i| sample[i]);

        let mut found = false;
        'gaps: for gap in 1..order.len() {
            for k in 0..(order.len() - gap) {
                if builder.offer(order[k], order[k + gap]) {
                    found = true;
                    break 'gaps;
                }
            }
        }
        if !found {
            break;
        }
    }
}

fn ucb(model: &PreferenceModel, candidates: &[usize], beta: f64, builder: &mut BatchBuilder<'_>) {
    let mean = model.utility_mean();
    let var = model.utility_variance();
    let order = order_by_score(candidates, |i| mean[i] + beta * var[i].sqrt());
    builder.offer_in_rank_order(&order);
}

fn expected_improvement_pairs(
    model: &PreferenceModel,
    candidates: &[usize],
    xi: f64,
    ranking: Option<&Ranking>,
    builder: &mut BatchBuilder<'_>,
) -> PboResult<()> {
    let computed;
    let ranking = match ranking {
        Some(r) if r.len() == model.n_items() => r,
        _ => {
            computed = CopelandRanker::default().rank(model)?;
            &computed
        }
    };
    let Some(leader) = ranking
        .order()
        .iter()
        .copied()
        .find(|i| candidates.binary_search(i).is_ok())
    else {
        return Ok(());
    };

    let challengers: Vec<usize> = candidates.iter().copied().filter(|&c| c != leader).collect();
    let mut scores = vec![0.0; model.n_items()];
    for &c in &challengers {
        let (mean, var) = model.predict_difference(c, leader)?;
        scores[c] = expected_improvement(mean, var, xi);
    }
    let order = order_by_score(&challengers, |c| scores[c]);

    for &c in &order {
        if builder.is_full() {
            return Ok(());
        }
        builder.offer(leader, c);
    }
    builder.offer_in_rank_order(&order);
    Ok(())
}

fn variance(
    model: &PreferenceModel,
    candidates: &[usize],
    max_pair_evaluations: usize,
    builder: &mut BatchBuilder<'_>,
) -> PboResult<()> {
    let pool: Vec<usize> = if pair_count(candidates.len()) <= max_pair_evaluations {
        candidates.to_vec()
    } else {
        let utility_var = model.utility_variance();
        let mut keep = 2;
        while pair_count(keep + 1) <= max_pair_evaluations && keep < candidates.len() {
            keep += 1;
        }
        let mut top = order_by_score(candidates, |i| utility_var[i]);
        top.truncate(keep);
        top.sort_unstable();
        top
    };

    let mut scored: Vec<(Pair, f64)> = Vec::new();
    for pair in all_pairs(&pool) {
        if !builder.is_fresh(pair.first(), pair.second()) {
            continue;
        }
        let (_, var) = model.predict_difference(pair.first(), pair.second())?;
        scored.push((pair, var));
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (pair, _) in scored {
        if builder.is_full() {
            break;
        }
        builder.offer(pair.first(), pair.second());
    }
    Ok(())
}
