//! Pairwise preference observations
//!
//! Pairs are stored in canonical order so `(i, j)` and `(j, i)` are the same
//! entry; outcomes are flipped accordingly on ingestion.

mod log;
mod pair;

pub use log::{LabeledPair, PreferenceLog, PreferenceObservation};
pub use pair::{pair_count, Outcome, Pair, PairSet};

/// Prelude for preference module
pub mod prelude {
    pub use super::{Outcome, Pair, PairSet, PreferenceLog, PreferenceObservation};
}
