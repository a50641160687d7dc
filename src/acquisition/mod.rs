//! Pair acquisition: which comparisons to ask for next

mod pairs;
pub mod registry;
pub mod strategy;

pub use registry::{AcquisitionFactory, AcquisitionParams, AcquisitionRegistry};
pub use strategy::{AcquisitionBatch, AcquisitionStrategy, SelectionContext};

/// Prelude for acquisition module
pub mod prelude {
    pub use super::{AcquisitionRegistry, AcquisitionStrategy, SelectionContext};
}
