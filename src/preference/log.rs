//! Append-only preference observation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pair::{Outcome, Pair, PairSet};
use crate::error::PboResult;

/// One recorded judgment, stored against the canonical pair
///
/// `outcome` is always relative to `pair` in canonical order, whatever order
/// the pair was presented in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreferenceObservation {
    /// Canonical pair
    pub pair: Pair,
    /// Outcome relative to `pair.first()` / `pair.second()`
    pub outcome: Outcome,
    /// Loop iteration that ingested this observation
    pub iteration: usize,
    /// Ingestion time
    pub recorded_at: DateTime<Utc>,
}

impl PreferenceObservation {
    /// Record an outcome for `(i, j)` as presented
    pub fn new(i: usize, j: usize, outcome: Outcome, iteration: usize) -> PboResult<Self> {
        let (pair, swapped) = Pair::canonical(i, j)?;
        let outcome = if swapped { outcome.flipped() } else { outcome };
        Ok(Self {
            pair,
            outcome,
            iteration,
            recorded_at: Utc::now(),
        })
    }

    /// Winner and loser, if the outcome is definitive
    pub fn winner_loser(&self) -> Option<(usize, usize)> {
        self.outcome.first_wins().map(|first| {
            if first {
                (self.pair.first(), self.pair.second())
            } else {
                (self.pair.second(), self.pair.first())
            }
        })
    }
}

/// Training example derived from a definitive observation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabeledPair {
    /// Canonical pair
    pub pair: Pair,
    /// True if `pair.first()` won
    pub first_wins: bool,
}

/// Full judgment history of a session
///
/// Observations are never mutated or removed. Ties and skips stay in the log
/// and are filtered out only when training examples are derived.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceLog {
    observations: Vec<PreferenceObservation>,
}

impl PreferenceLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation
    pub fn push(&mut self, observation: PreferenceObservation) {
        self.observations.push(observation);
    }

    /// Record `(i, j, outcome)` as presented
    pub fn record(&mut self, i: usize, j: usize, outcome: Outcome, iteration: usize) -> PboResult<()> {
        self.push(PreferenceObservation::new(i, j, outcome, iteration)?);
        Ok(())
    }

    /// Number of observations, ties and skips included
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Returns true if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Iterate in ingestion order
    pub fn iter(&self) -> impl Iterator<Item = &PreferenceObservation> {
        self.observations.iter()
    }

    /// Observations as a slice
    pub fn as_slice(&self) -> &[PreferenceObservation] {
        &self.observations
    }

    /// Definitive observations as training examples, in ingestion order
    pub fn labeled_pairs(&self) -> Vec<LabeledPair> {
        self.observations
            .iter()
            .filter_map(|obs| {
                obs.outcome.first_wins().map(|first_wins| LabeledPair {
                    pair: obs.pair,
                    first_wins,
                })
            })
            .collect()
    }

    /// Number of distinct pairs with at least one definitive outcome
    pub fn distinct_definitive(&self) -> usize {
        self.exhausted_pairs().len()
    }

    /// Pairs that already have a definitive outcome
    pub fn exhausted_pairs(&self) -> PairSet {
        self.observations
            .iter()
            .filter(|obs| obs.outcome.is_definitive())
            .map(|obs| obs.pair)
            .collect()
    }

    /// Count of observations per outcome kind
    pub fn outcome_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for obs in &self.observations {
            let key = match obs.outcome {
                Outcome::PrefersFirst | Outcome::PrefersSecond => "definitive",
                Outcome::Tie => "tie",
                Outcome::Skip => "skip",
            };
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Highest item index referenced by any observation
    pub fn max_index(&self) -> Option<usize> {
        self.observations.iter().map(|obs| obs.pair.second()).max()
    }
}
