//! Per-feature standardization
//!
//! The scaler is fit once over the whole pool and reused for the rest of
//! the session, so difference vectors are comparable across retrains.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::matrix::FeatureMatrix;
use crate::error::{PboError, PboResult};

/// Columns with a standard deviation below this keep unit scale
const MIN_SCALE: f64 = 1e-12;

/// Zero-mean, unit-variance transform fit over the item pool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Per-feature mean
    pub mean: Vec<f64>,
    /// Per-feature standard deviation (1.0 for constant features)
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on every row of the pool (population standard deviation)
    pub fn fit(features: &FeatureMatrix) -> Self {
        let data = features.as_matrix();
        let n = data.nrows() as f64;

        let mean: Vec<f64> = data.column_iter().map(|col| col.sum() / n).collect();
        let scale: Vec<f64> = data
            .column_iter()
            .zip(mean.iter())
            .map(|(col, &mu)| {
                let var = col.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std < MIN_SCALE {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Self { mean, scale }
    }

    /// Feature dimension this scaler was fit on
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Standardize the whole pool
    pub fn transform(&self, features: &FeatureMatrix) -> PboResult<FeatureMatrix> {
        self.check_dimension(features.dimension())?;
        let data = features.as_matrix();
        let scaled = DMatrix::from_fn(data.nrows(), data.ncols(), |i, j| {
            (data[(i, j)] - self.mean[j]) / self.scale[j]
        });
        FeatureMatrix::from_matrix(scaled)
    }

    /// Standardize one feature vector
    pub fn transform_vector(&self, x: &DVector<f64>) -> PboResult<DVector<f64>> {
        self.check_dimension(x.len())?;
        Ok(DVector::from_fn(x.len(), |j, _| {
            (x[j] - self.mean[j]) / self.scale[j]
        }))
    }

    fn check_dimension(&self, dim: usize) -> PboResult<()> {
        if dim != self.dimension() {
            return Err(PboError::Configuration(format!(
                "scaler fit on {} features, got {}",
                self.dimension(),
                dim
            )));
        }
        Ok(())
    }
}
