//! Feature encoder contract
//!
//! Turning raw items into vectors happens outside this crate. Encoders only
//! need to be deterministic and produce a fixed output dimension.

use super::matrix::FeatureMatrix;
use crate::error::{PboError, PboResult};

/// Maps raw items to fixed-length feature vectors
pub trait FeatureEncoder {
    /// Raw item type (image, mask, document, ...)
    type Item;

    /// Output dimension, fixed per encoder instance
    fn dimension(&self) -> usize;

    /// Encode a single item
    fn encode(&self, item: &Self::Item) -> PboResult<Vec<f64>>;

    /// Encode a pool of items; row `i` belongs to `items[i]`
    fn encode_batch(&self, items: &[Self::Item]) -> PboResult<FeatureMatrix> {
        let dim = self.dimension();
        let rows = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let row = self.encode(item)?;
                if row.len() != dim {
                    return Err(PboError::Configuration(format!(
                        "encoder produced {} features for item {}, declared {}",
                        row.len(),
                        i,
                        dim
                    )));
                }
                Ok(row)
            })
            .collect::<PboResult<Vec<_>>>()?;
        FeatureMatrix::from_rows(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEncoder;

    impl FeatureEncoder for LengthEncoder {
        type Item = String;

        fn dimension(&self) -> usize {
            2
        }

        fn encode(&self, item: &String) -> PboResult<Vec<f64>> {
            let vowels = item.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![item.len() as f64, vowels as f64])
        }
    }

    struct BrokenEncoder;

    impl FeatureEncoder for BrokenEncoder {
        type Item = u8;

        fn dimension(&self) -> usize {
            3
        }

        fn encode(&self, _item: &u8) -> PboResult<Vec<f64>> {
            Ok(vec![1.0])
        }
    }

    #[test]
    fn test_encode_batch() {
        let items = vec!["alpha".to_string(), "be".to_string(), "gamma".to_string()];
        let pool = LengthEncoder.encode_batch(&items).unwrap();
        assert_eq!(pool.n_items(), 3);
        assert_eq!(pool.row(0).as_slice(), &[5.0, 2.0]);
    }

    #[test]
    fn test_dimension_violation() {
        assert!(matches!(
            BrokenEncoder.encode_batch(&[1, 2]),
            Err(PboError::Configuration(_))
        ));
    }
}
