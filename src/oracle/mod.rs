//! Simulated judges
//!
//! An [`Oracle`] answers "which of items `i` and `j` is better?". The loop
//! never calls one itself; callers collect judgments from a human or from
//! one of these simulated judges and pass them to `add_preferences`.
//!
//! - [`RankingOracle`]: always consistent with a fixed strict order
//! - [`LinearUtilityOracle`]: weighted feature sum with logistic noise
//! - [`RandomOracle`]: fair coin, a no-signal baseline

use rand::prelude::*;

use crate::error::{PboError, PboResult};
use crate::model::link::sigmoid;
use crate::pool::FeatureMatrix;
use crate::preference::Outcome;

/// Logistic argument clamp, matching the usual overflow guard
const MAX_LOGIT: f64 = 50.0;

/// Source of pairwise judgments
pub trait Oracle {
    /// Judge `i` against `j`; the outcome is relative to `(i, j)` as given
    fn judge(&mut self, i: usize, j: usize, features: &FeatureMatrix) -> PboResult<Outcome>;

    /// Human-readable name
    fn name(&self) -> &str;
}

fn check_items(i: usize, j: usize, features: &FeatureMatrix) -> PboResult<()> {
    let n = features.n_items();
    if i >= n || j >= n {
        return Err(PboError::Validation(format!(
            "pair ({}, {}) is outside a pool of {}",
            i, j, n
        )));
    }
    if i == j {
        return Err(PboError::Validation(format!(
            "pair ({}, {}) compares an item with itself",
            i, j
        )));
    }
    Ok(())
}

/// Oracle consistent with a fixed strict order, best item first
#[derive(Clone, Debug)]
pub struct RankingOracle {
    position: Vec<usize>,
}

impl RankingOracle {
    /// Create from an order listing every item exactly once
    pub fn new(order: &[usize]) -> PboResult<Self> {
        let mut position = vec![usize::MAX; order.len()];
        for (rank, &item) in order.iter().enumerate() {
            if item >= order.len() || position[item] != usize::MAX {
                return Err(PboError::Configuration(format!(
                    "order must be a permutation of 0..{}",
                    order.len()
                )));
            }
            position[item] = rank;
        }
        Ok(Self { position })
    }

    /// Oracle that prefers lower indices
    pub fn by_index(n_items: usize) -> Self {
        Self {
            position: (0..n_items).collect(),
        }
    }
}

impl Oracle for RankingOracle {
    fn judge(&mut self, i: usize, j: usize, features: &FeatureMatrix) -> PboResult<Outcome> {
        check_items(i, j, features)?;
        match (self.position.get(i), self.position.get(j)) {
            (Some(pi), Some(pj)) if pi < pj => Ok(Outcome::PrefersFirst),
            (Some(_), Some(_)) => Ok(Outcome::PrefersSecond),
            _ => Err(PboError::Validation(format!(
                "pair ({}, {}) is outside the oracle's order of {} items",
                i,
                j,
                self.position.len()
            ))),
        }
    }

    fn name(&self) -> &str {
        "ranking"
    }
}

/// Bradley-Terry judge over a linear utility `U(x) = w · x`
///
/// `P(i ≻ j) = σ((U_i − U_j) / noise)`. Differences smaller than the tie
/// band are answered with [`Outcome::Tie`].
#[derive(Clone, Debug)]
pub struct LinearUtilityOracle {
    weights: Vec<f64>,
    noise: f64,
    tie_band: f64,
    rng: StdRng,
}

impl LinearUtilityOracle {
    /// Create with feature weights, noise level and seed
    pub fn new(weights: Vec<f64>, noise: f64, seed: u64) -> PboResult<Self> {
        if !(noise.is_finite() && noise > 0.0) {
            return Err(PboError::Configuration(format!(
                "noise must be positive, got {}",
                noise
            )));
        }
        Ok(Self {
            weights,
            noise,
            tie_band: 0.0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Answer `Tie` when `|U_i − U_j| < band`
    pub fn with_tie_band(mut self, band: f64) -> Self {
        self.tie_band = band.max(0.0);
        self
    }

    /// Adjust one feature weight
    pub fn set_weight(&mut self, feature: usize, value: f64) -> PboResult<()> {
        let dim = self.weights.len();
        let slot = self.weights.get_mut(feature).ok_or_else(|| {
            PboError::Configuration(format!("feature {} out of range (dimension {})", feature, dim))
        })?;
        *slot = value;
        Ok(())
    }

    /// Current weights
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Latent utility of item `i`
    pub fn utility(&self, i: usize, features: &FeatureMatrix) -> PboResult<f64> {
        if self.weights.len() != features.dimension() {
            return Err(PboError::Validation(format!(
                "oracle has {} weights but features have dimension {}",
                self.weights.len(),
                features.dimension()
            )));
        }
        if i >= features.n_items() {
            return Err(PboError::Validation(format!(
                "item {} is outside a pool of {}",
                i,
                features.n_items()
            )));
        }
        Ok(features
            .row(i)
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| x * w)
            .sum())
    }

    /// Probability that `i` is preferred over `j`
    pub fn prefer_probability(&self, i: usize, j: usize, features: &FeatureMatrix) -> PboResult<f64> {
        let diff = (self.utility(i, features)? - self.utility(j, features)?) / self.noise;
        Ok(sigmoid(diff.clamp(-MAX_LOGIT, MAX_LOGIT)))
    }

    /// Items ordered by true utility, best first
    pub fn true_ranking(&self, features: &FeatureMatrix) -> PboResult<Vec<usize>> {
        let mut scored = (0..features.n_items())
            .map(|i| self.utility(i, features).map(|u| (i, u)))
            .collect::<PboResult<Vec<_>>>()?;
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(scored.into_iter().map(|(i, _)| i).collect())
    }
}

impl Oracle for LinearUtilityOracle {
    fn judge(&mut self, i: usize, j: usize, features: &FeatureMatrix) -> PboResult<Outcome> {
        check_items(i, j, features)?;
        let gap = self.utility(i, features)? - self.utility(j, features)?;
        if gap.abs() < self.tie_band {
            return Ok(Outcome::Tie);
        }
        let p = self.prefer_probability(i, j, features)?;
        if self.rng.gen::<f64>() < p {
            Ok(Outcome::PrefersFirst)
        } else {
            Ok(Outcome::PrefersSecond)
        }
    }

    fn name(&self) -> &str {
        "linear_utility"
    }
}

/// Fair-coin judge
#[derive(Clone, Debug)]
pub struct RandomOracle {
    rng: StdRng,
}

impl RandomOracle {
    /// Create a seeded random oracle
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Oracle for RandomOracle {
    fn judge(&mut self, i: usize, j: usize, features: &FeatureMatrix) -> PboResult<Outcome> {
        check_items(i, j, features)?;
        if self.rng.gen_bool(0.5) {
            Ok(Outcome::PrefersFirst)
        } else {
            Ok(Outcome::PrefersSecond)
        }
    }

    fn name(&self) -> &str {
        "random"
    }
}
