//! Fixed item pool as a dense feature matrix

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{PboError, PboResult};

/// Feature vectors for every item in the pool, one row per item
///
/// Row `i` belongs to item `i`. The matrix is assigned once when the pool is
/// loaded and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeatureRows", into = "FeatureRows")]
pub struct FeatureMatrix {
    data: DMatrix<f64>,
}

/// Row-major serialized form
#[derive(Clone, Debug, Serialize, Deserialize)]
struct FeatureRows {
    rows: Vec<Vec<f64>>,
}

impl TryFrom<FeatureRows> for FeatureMatrix {
    type Error = PboError;

    fn try_from(value: FeatureRows) -> Result<Self, Self::Error> {
        FeatureMatrix::from_rows(&value.rows)
    }
}

impl From<FeatureMatrix> for FeatureRows {
    fn from(value: FeatureMatrix) -> Self {
        FeatureRows {
            rows: value.to_rows(),
        }
    }
}

impl FeatureMatrix {
    /// Build a pool from per-item feature rows
    ///
    /// Every row must have the same non-zero length and contain only finite values.
    pub fn from_rows(rows: &[Vec<f64>]) -> PboResult<Self> {
        if rows.is_empty() {
            return Err(PboError::Configuration("feature pool is empty".into()));
        }
        let dim = rows[0].len();
        if dim == 0 {
            return Err(PboError::Configuration(
                "feature vectors must have at least one dimension".into(),
            ));
        }

        let mut flat = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(PboError::Configuration(format!(
                    "item {} has {} features, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            if let Some(bad) = row.iter().find(|v| !v.is_finite()) {
                return Err(PboError::Configuration(format!(
                    "item {} has non-finite feature value {}",
                    i, bad
                )));
            }
            flat.extend_from_slice(row);
        }

        Ok(Self {
            data: DMatrix::from_row_slice(rows.len(), dim, &flat),
        })
    }

    /// Wrap an existing matrix (rows = items)
    pub fn from_matrix(data: DMatrix<f64>) -> PboResult<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(PboError::Configuration("feature pool is empty".into()));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PboError::Configuration(
                "feature pool contains non-finite values".into(),
            ));
        }
        Ok(Self { data })
    }

    /// Number of items in the pool
    pub fn n_items(&self) -> usize {
        self.data.nrows()
    }

    /// Feature dimension
    pub fn dimension(&self) -> usize {
        self.data.ncols()
    }

    /// Feature vector of item `i`
    pub fn row(&self, i: usize) -> DVector<f64> {
        self.data.row(i).transpose()
    }

    /// Difference vector `x_i - x_j`
    pub fn difference(&self, i: usize, j: usize) -> DVector<f64> {
        (self.data.row(i) - self.data.row(j)).transpose()
    }

    /// Underlying matrix
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Copy out as row vectors
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.data.nrows())
            .map(|i| self.data.row(i).iter().copied().collect())
            .collect()
    }

    /// All item indices, in order
    pub fn indices(&self) -> Vec<usize> {
        (0..self.n_items()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let pool = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])
            .unwrap();
        assert_eq!(pool.n_items(), 3);
        assert_eq!(pool.dimension(), 2);
        assert_eq!(pool.row(1).as_slice(), &[3.0, 4.0]);
        assert_eq!(pool.difference(2, 0).as_slice(), &[4.0, 4.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(PboError::Configuration(_))));
    }

    #[test]
    fn test_non_finite_rejected() {
        let result = FeatureMatrix::from_rows(&[vec![1.0], vec![f64::NAN]]);
        assert!(matches!(result, Err(PboError::Configuration(_))));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(FeatureMatrix::from_rows(&[]).is_err());
        assert!(FeatureMatrix::from_rows(&[vec![]]).is_err());
    }

    #[test]
    fn test_serde_roundtrip_preserves_rows() {
        let pool = FeatureMatrix::from_rows(&[vec![0.5, -1.0], vec![2.0, 0.25]]).unwrap();
        let json = serde_json::to_string(&pool).unwrap();
        assert!(json.contains("rows"));
        let back: FeatureMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pool);
    }
}
