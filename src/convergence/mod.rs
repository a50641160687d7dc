//! Convergence detection for active learning sessions
//!
//! A session stops when its top-K set has settled or when the iteration cap
//! is hit. Settling is judged over the last `window` recorded top-K sets: an
//! item is *stable* when it appears in at least `threshold` of them, and the
//! session has converged once `min(K, N)` items are stable.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::LoopConfig;

/// Result of a convergence check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Keep collecting judgments
    NotConverged,
    /// Stop, with the reason
    Converged(ConvergenceReason),
}

impl ConvergenceStatus {
    /// Check if converged
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }
}

/// Why a session converged
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConvergenceReason {
    /// Enough items stayed in the top set across the window
    TopKStable {
        /// Items meeting the agreement threshold
        stable: usize,
        /// Items required
        required: usize,
        /// Window inspected
        window: usize,
    },
    /// Iteration cap reached
    MaxIterations {
        /// Completed iterations
        iterations: usize,
    },
}

/// Stopping rule parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Number of recent top-K sets inspected
    pub window: usize,
    /// Appearances within the window that make an item stable
    pub threshold: usize,
    /// Size of the tracked top set
    pub top_k: usize,
    /// Iteration cap
    pub max_iterations: usize,
}

impl ConvergenceConfig {
    /// Extract the stopping rule from a loop configuration
    pub fn from_loop(config: &LoopConfig) -> Self {
        Self {
            window: config.convergence_window,
            threshold: config.convergence_threshold,
            top_k: config.top_k,
            max_iterations: config.max_iterations,
        }
    }
}

/// One recorded top-K set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Iteration that produced this ranking
    pub iteration: usize,
    /// Top items, best first
    pub top_k: Vec<usize>,
}

/// Append-only history of top-K sets
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceHistory {
    entries: Vec<HistoryEntry>,
}

impl ConvergenceHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the top set produced at `iteration`
    pub fn record(&mut self, iteration: usize, top_k: &[usize]) {
        self.entries.push(HistoryEntry {
            iteration,
            top_k: top_k.to_vec(),
        });
    }

    /// Number of recorded sets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// The last `window` entries (fewer if the history is shorter)
    pub fn recent(&self, window: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(window);
        &self.entries[start..]
    }
}

/// Applies the stopping rule to a history
#[derive(Clone, Debug)]
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
}

impl ConvergenceDetector {
    /// Create a new detector
    pub fn new(config: ConvergenceConfig) -> Self {
        Self { config }
    }

    /// Detector configured from a loop configuration
    pub fn from_loop(config: &LoopConfig) -> Self {
        Self::new(ConvergenceConfig::from_loop(config))
    }

    /// Get the configuration
    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Appearance count per item over the last `window` sets
    pub fn membership_counts(&self, history: &ConvergenceHistory) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for entry in history.recent(self.config.window) {
            let unique: BTreeSet<usize> = entry.top_k.iter().copied().collect();
            for item in unique {
                *counts.entry(item).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Check the stopping rule
    ///
    /// `iteration` is the number of completed iterations and `n_items` the
    /// pool size; the tracked set size is `min(top_k, n_items)`.
    pub fn check(
        &self,
        history: &ConvergenceHistory,
        iteration: usize,
        n_items: usize,
    ) -> ConvergenceStatus {
        if iteration >= self.config.max_iterations {
            return ConvergenceStatus::Converged(ConvergenceReason::MaxIterations {
                iterations: iteration,
            });
        }

        if history.len() < self.config.window {
            return ConvergenceStatus::NotConverged;
        }

        let required = self.config.top_k.min(n_items);
        if required == 0 {
            return ConvergenceStatus::NotConverged;
        }

        let stable = self
            .membership_counts(history)
            .values()
            .filter(|&&count| count >= self.config.threshold)
            .count();

        if stable >= required {
            ConvergenceStatus::Converged(ConvergenceReason::TopKStable {
                stable,
                required,
                window: self.config.window,
            })
        } else {
            ConvergenceStatus::NotConverged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(window: usize, threshold: usize, top_k: usize, max: usize) -> ConvergenceDetector {
        ConvergenceDetector::new(ConvergenceConfig {
            window,
            threshold,
            top_k,
            max_iterations: max,
        })
    }

    #[test]
    fn test_short_history_not_converged() {
        let det = detector(3, 2, 2, 100);
        let mut history = ConvergenceHistory::new();
        history.record(1, &[0, 1]);
        history.record(2, &[0, 1]);
        assert_eq!(det.check(&history, 2, 4), ConvergenceStatus::NotConverged);
    }

    #[test]
    fn test_stable_top_k_converges() {
        let det = detector(3, 2, 2, 100);
        let mut history = ConvergenceHistory::new();
        history.record(1, &[2, 3]);
        history.record(2, &[0, 1]);
        history.record(3, &[1, 0]);

        let status = det.check(&history, 3, 4);
        assert_eq!(
            status,
            ConvergenceStatus::Converged(ConvergenceReason::TopKStable {
                stable: 2,
                required: 2,
                window: 3
            })
        );
    }

    #[test]
    fn test_churning_top_k_not_converged() {
        let det = detector(3, 3, 2, 100);
        let mut history = ConvergenceHistory::new();
        history.record(1, &[0, 1]);
        history.record(2, &[0, 2]);
        history.record(3, &[0, 3]);
        // only item 0 appears in all three
        assert!(!det.check(&history, 3, 4).is_converged());
        assert_eq!(det.membership_counts(&history).get(&0), Some(&3));
    }

    #[test]
    fn test_window_ignores_old_entries() {
        let det = detector(2, 2, 1, 100);
        let mut history = ConvergenceHistory::new();
        history.record(1, &[5]);
        history.record(2, &[5]);
        history.record(3, &[1]);
        history.record(4, &[2]);
        assert!(!det.check(&history, 4, 6).is_converged());
        history.record(5, &[2]);
        assert!(det.check(&history, 5, 6).is_converged());
    }

    #[test]
    fn test_max_iterations() {
        let det = detector(5, 4, 3, 10);
        let history = ConvergenceHistory::new();
        assert_eq!(
            det.check(&history, 10, 4),
            ConvergenceStatus::Converged(ConvergenceReason::MaxIterations { iterations: 10 })
        );
        assert!(!det.check(&history, 9, 4).is_converged());
    }

    #[test]
    fn test_top_k_clamped_to_pool() {
        let det = detector(2, 2, 5, 100);
        let mut history = ConvergenceHistory::new();
        history.record(1, &[0, 1, 2]);
        history.record(2, &[2, 1, 0]);
        assert!(det.check(&history, 2, 3).is_converged());
    }

    #[test]
    fn test_history_serde() {
        let mut history = ConvergenceHistory::new();
        history.record(1, &[3, 1]);
        let json = serde_json::to_string(&history).unwrap();
        let back: ConvergenceHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
        assert_eq!(back.latest().unwrap().top_k, vec![3, 1]);
    }
}
