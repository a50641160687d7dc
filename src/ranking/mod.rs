//! Ranking engine

mod copeland;

pub use copeland::{CopelandRanker, Ranking};

/// Prelude for ranking module
pub mod prelude {
    pub use super::{CopelandRanker, Ranking};
}
