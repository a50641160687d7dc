//! Item pool: feature vectors, standardization, and the encoder contract

mod encoder;
mod matrix;
mod scaler;

pub use encoder::FeatureEncoder;
pub use matrix::FeatureMatrix;
pub use scaler::StandardScaler;

/// Prelude for pool module
pub mod prelude {
    pub use super::{FeatureEncoder, FeatureMatrix, StandardScaler};
}
