//! Active learning loop: batch issuance, ingestion, retraining, persistence

mod engine;
mod state;

pub use engine::{ActiveLearningLoop, ActiveLearningLoopBuilder};
pub use state::{IterationSummary, LoopState, Progress};

/// Prelude for active_loop module
pub mod prelude {
    pub use super::{ActiveLearningLoop, ActiveLearningLoopBuilder, LoopState, Progress};
}
