//! Loop lifecycle and read-only progress views

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::convergence::ConvergenceReason;
use crate::model::TrainingReport;

/// Lifecycle of an [`super::ActiveLearningLoop`]
///
/// ```text
/// Uninitialized --bind_pool--> Collecting --add_preferences--> Training
///                                   ^                             |
///                                   +-----------------------------+--> Converged | Failed
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    /// No pool bound yet
    Uninitialized,
    /// Waiting for judgments
    Collecting,
    /// Retraining inside `add_preferences`
    Training,
    /// Stopping rule satisfied; batches can still be requested
    Converged,
    /// Training failed beyond recovery
    Failed {
        /// Error that caused the failure
        reason: String,
    },
}

impl LoopState {
    /// Returns true if batches may be requested and judgments ingested
    pub fn accepts_judgments(&self) -> bool {
        matches!(self, Self::Collecting | Self::Converged)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Collecting => write!(f, "collecting"),
            Self::Training => write!(f, "training"),
            Self::Converged => write!(f, "converged"),
            Self::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Snapshot returned by `get_progress`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Completed ingestion cycles
    pub iteration: usize,
    /// Judgments recorded, ties and skips included
    pub total_comparisons: usize,
    /// Convergence flag
    pub converged: bool,
    /// Current lifecycle state
    pub state: LoopState,
    /// Iteration cap
    pub max_iterations: usize,
    /// Current top items, best first (empty before the first ranking)
    pub top_k: Vec<usize>,
    /// Why the loop converged, if it has
    pub convergence_reason: Option<ConvergenceReason>,
}

impl Progress {
    /// Fraction of the iteration cap used, in `[0, 1]`
    pub fn fraction_complete(&self) -> f64 {
        if self.converged {
            return 1.0;
        }
        (self.iteration as f64 / self.max_iterations.max(1) as f64).min(1.0)
    }
}

/// Outcome of one successful `add_preferences` call
#[derive(Clone, Debug, PartialEq)]
pub struct IterationSummary {
    /// Iteration number just completed
    pub iteration: usize,
    /// Judgments ingested in this call
    pub ingested: usize,
    /// How many of them were definitive
    pub definitive: usize,
    /// Fit report, when a model was trained
    pub training: Option<TrainingReport>,
    /// Convergence flag after this iteration
    pub converged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_judgments() {
        assert!(LoopState::Collecting.accepts_judgments());
        assert!(LoopState::Converged.accepts_judgments());
        assert!(!LoopState::Uninitialized.accepts_judgments());
        assert!(!LoopState::Failed {
            reason: "x".into()
        }
        .accepts_judgments());
    }

    #[test]
    fn test_fraction_complete() {
        let progress = Progress {
            iteration: 5,
            total_comparisons: 50,
            converged: false,
            state: LoopState::Collecting,
            max_iterations: 20,
            top_k: vec![],
            convergence_reason: None,
        };
        assert!((progress.fraction_complete() - 0.25).abs() < 1e-12);
        assert_eq!(
            Progress {
                converged: true,
                ..progress
            }
            .fraction_complete(),
            1.0
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LoopState::Collecting.to_string(), "collecting");
        assert_eq!(
            LoopState::Failed {
                reason: "diverged".into()
            }
            .to_string(),
            "failed (diverged)"
        );
    }
}
