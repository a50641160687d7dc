//! # pbo-rank
//!
//! Active preference learning for Rust.
//!
//! Learn a ranking over a fixed pool of items from pairwise judgments
//! ("is A better than B?"), choosing which pairs to ask about next so that a
//! good ranking emerges from as few judgments as possible.
//!
//! ## Core Concepts
//!
//! - **Difference-vector model**: a sparse Gaussian-process classifier over
//!   feature differences with an odd kernel, so `P(i ≻ j) = 1 − P(j ≻ i)`
//! - **Copeland ranking**: items ordered by the fraction of opponents they are
//!   predicted to beat, deterministic for a fixed model
//! - **Pluggable acquisition**: random, Thompson sampling, UCB, expected
//!   improvement and variance strategies behind an explicit registry
//! - **Resumable sessions**: atomic JSON records with versioned model
//!   checkpoints and pruned backups
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pbo_rank::prelude::*;
//!
//! let features = FeatureMatrix::from_rows(&rows)?;
//! let mut oracle = LinearUtilityOracle::new(vec![1.0, -0.5], 0.3, 7)?;
//!
//! let mut pbo = ActiveLearningLoop::builder(LoopConfig::default().top_k(3))
//!     .store(Arc::new(FileSessionStore::new("sessions")?))
//!     .build()?;
//! pbo.bind_pool(features.clone())?;
//!
//! while !pbo.has_converged() {
//!     let batch = pbo.get_next_batch_default()?;
//!     let pairs: Vec<_> = batch.iter().map(|p| p.as_tuple()).collect();
//!     let outcomes = pairs
//!         .iter()
//!         .map(|&(i, j)| oracle.judge(i, j, &features))
//!         .collect::<PboResult<Vec<_>>>()?;
//!     pbo.add_preferences(&pairs, &outcomes)?;
//! }
//!
//! let ranking = pbo.get_ranking()?;
//! ```

pub mod acquisition;
pub mod active_loop;
pub mod config;
pub mod convergence;
pub mod error;
pub mod model;
pub mod oracle;
pub mod pool;
pub mod preference;
pub mod ranking;
pub mod session;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::acquisition::prelude::*;
    pub use crate::active_loop::prelude::*;
    pub use crate::config::{LoopConfig, RankingConfig, TrainingConfig};
    pub use crate::convergence::{ConvergenceDetector, ConvergenceHistory, ConvergenceReason};
    pub use crate::error::*;
    pub use crate::model::prelude::*;
    pub use crate::oracle::{LinearUtilityOracle, Oracle, RandomOracle, RankingOracle};
    pub use crate::pool::prelude::*;
    pub use crate::preference::prelude::*;
    pub use crate::ranking::prelude::*;
    pub use crate::session::prelude::*;
}
