//! Probabilistic preference model
//!
//! Pairwise outcomes are learned as binary classification over feature
//! differences with a sparse Gaussian process and a logistic link.

pub mod checkpoint;
pub mod gp;
pub mod kernel;
pub mod link;
pub mod optimizer;

pub use checkpoint::{ModelCheckpoint, CHECKPOINT_MAGIC, CHECKPOINT_VERSION};
pub use gp::{PreferenceModel, PreferenceTrainer, TrainingReport, MIN_DISTINCT_OBSERVATIONS};
pub use kernel::PreferenceKernel;
pub use optimizer::{StopReason, TrainingOptimizer};

/// Prelude for model module
pub mod prelude {
    pub use super::{
        ModelCheckpoint, PreferenceModel, PreferenceTrainer, StopReason, TrainingOptimizer,
        TrainingReport,
    };
}
