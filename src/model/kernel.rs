//! Odd preference kernel over difference vectors
//!
//! Built from a squared-exponential base kernel `k`:
//!
//! ```text
//! k_o(a, b) = ½ [k(a, b) − k(a, −b)]
//! ```
//!
//! `k_o(a, −b) = −k_o(a, b)`, so every function in the induced space is odd:
//! `f(−d) = −f(d)`. With a logistic link this gives
//! `P(i ≻ j) = 1 − P(j ≻ i)` for any parameter values.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Points used for the median lengthscale heuristic
const MEDIAN_HEURISTIC_POINTS: usize = 256;

/// Closest separation between points, in lengthscales, for [`separating_lengthscale`]
const SEPARATION: f64 = 3.0;

/// Antisymmetric RBF kernel hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreferenceKernel {
    /// RBF lengthscale ℓ
    pub lengthscale: f64,
    /// RBF output scale s² (signal variance)
    pub outputscale: f64,
}

impl PreferenceKernel {
    /// Create a new kernel
    pub fn new(lengthscale: f64, outputscale: f64) -> Self {
        Self {
            lengthscale,
            outputscale,
        }
    }

    /// Odd kernel value `k_o(a, b)`
    pub fn eval(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        let (minus, plus) = squared_distances(a, b);
        0.5 * (self.rbf(minus) - self.rbf(plus))
    }

    /// Prior variance `k_o(d, d)`
    pub fn diag(&self, d: &DVector<f64>) -> f64 {
        let plus = 4.0 * d.norm_squared();
        0.5 * (self.outputscale - self.rbf(plus))
    }

    /// Gram matrix over `points`
    pub fn gram(&self, points: &[DVector<f64>]) -> DMatrix<f64> {
        let m = points.len();
        let mut k = DMatrix::zeros(m, m);
        for i in 0..m {
            k[(i, i)] = self.diag(&points[i]);
            for j in (i + 1)..m {
                let v = self.eval(&points[i], &points[j]);
                k[(i, j)] = v;
                k[(j, i)] = v;
            }
        }
        k
    }

    /// Cross-covariance column `k_o(Z, d)`
    pub fn cross(&self, points: &[DVector<f64>], d: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(points.len(), points.iter().map(|z| self.eval(z, d)))
    }

    fn rbf(&self, squared_distance: f64) -> f64 {
        self.outputscale
            * (-squared_distance / (2.0 * self.lengthscale * self.lengthscale)).exp()
    }
}

/// `(‖a − b‖², ‖a + b‖²)` in a single pass
///
/// Negating `b` swaps the two sums exactly, which keeps `k_o` exactly odd in
/// floating point.
fn squared_distances(a: &DVector<f64>, b: &DVector<f64>) -> (f64, f64) {
    a.iter().zip(b.iter()).fold((0.0, 0.0), |(minus, plus), (x, y)| {
        let dm = x - y;
        let dp = x + y;
        (minus + dm * dm, plus + dp * dp)
    })
}

/// Distance that treats `d` and `−d` as the same point
pub fn sign_invariant_distance(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let (minus, plus) = squared_distances(a, b);
    minus.min(plus).sqrt()
}

/// Median pairwise distance between points, a common RBF lengthscale default
///
/// Falls back to the median norm for a single point and to 1.0 when every
/// distance is zero.
pub fn median_lengthscale(points: &[DVector<f64>]) -> f64 {
    let points = &points[..points.len().min(MEDIAN_HEURISTIC_POINTS)];
    let mut distances: Vec<f64> = Vec::new();
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = (&points[i] - &points[j]).norm();
            if d > 0.0 {
                distances.push(d);
            }
        }
    }
    if distances.is_empty() {
        distances = points.iter().map(|p| p.norm()).filter(|&n| n > 0.0).collect();
    }
    median(&mut distances).unwrap_or(1.0)
}

/// Lengthscale at which distinct points barely interact
///
/// Chosen so that every pair of points, and every point and its own mirror
/// `−z`, lie at least three lengthscales apart. Cross terms of the odd Gram
/// matrix then stay below `e^{-4.5}` of the signal variance while the
/// diagonal stays near `s²/2`, so a MAP fit on a few dozen distinct pairs
/// reproduces the majority label of each one. Zero points are ignored.
/// `None` when no nonzero point remains or two points coincide up to sign.
pub fn separating_lengthscale(points: &[DVector<f64>]) -> Option<f64> {
    let nonzero: Vec<&DVector<f64>> = points.iter().filter(|p| p.norm() > 0.0).collect();
    let mut closest = f64::INFINITY;
    for (i, a) in nonzero.iter().enumerate() {
        closest = closest.min(2.0 * a.norm());
        for b in &nonzero[(i + 1)..] {
            closest = closest.min(sign_invariant_distance(a, b));
        }
    }
    if closest.is_finite() && closest > 0.0 {
        Some(closest / SEPARATION)
    } else {
        None
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    let m = if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    };
    if m.is_finite() && m > 0.0 {
        Some(m)
    } else {
        None
    }
}

/// Farthest-point traversal under the sign-invariant distance
///
/// Starts from the point with the largest norm and greedily adds the point
/// farthest from the current selection. Stops at `max_points` or when every
/// remaining point duplicates (up to sign) one already selected. Returns
/// indices into `points`; never empty for non-empty input.
pub fn farthest_point_indices(points: &[DVector<f64>], max_points: usize) -> Vec<usize> {
    if points.is_empty() || max_points == 0 {
        return Vec::new();
    }

    let mut first = 0;
    for (i, p) in points.iter().enumerate() {
        if p.norm() > points[first].norm() {
            first = i;
        }
    }

    let mut selected = vec![first];
    let mut min_dist: Vec<f64> = points
        .iter()
        .map(|p| sign_invariant_distance(p, &points[first]))
        .collect();

    while selected.len() < max_points {
        let mut best = None;
        let mut best_dist = 0.0;
        for (i, &d) in min_dist.iter().enumerate() {
            if d > best_dist {
                best_dist = d;
                best = Some(i);
            }
        }
        let Some(next) = best else { break };
        if best_dist < 1e-12 {
            break;
        }
        selected.push(next);
        for (i, p) in points.iter().enumerate() {
            let d = sign_invariant_distance(p, &points[next]);
            if d < min_dist[i] {
                min_dist[i] = d;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn test_kernel_is_odd() {
        let kernel = PreferenceKernel::new(0.7, 1.3);
        let a = v(&[0.3, -1.2]);
        let b = v(&[1.1, 0.4]);
        assert_eq!(kernel.eval(&a, &(-&b)), -kernel.eval(&a, &b));
        assert_eq!(kernel.eval(&(-&a), &b), -kernel.eval(&a, &b));
        assert_relative_eq!(kernel.eval(&a, &b), kernel.eval(&b, &a), epsilon = 1e-15);
    }

    #[test]
    fn test_diag_matches_eval() {
        let kernel = PreferenceKernel::new(1.0, 2.0);
        let d = v(&[0.5, 0.25, -1.0]);
        assert_relative_eq!(kernel.diag(&d), kernel.eval(&d, &d), epsilon = 1e-14);
        assert_eq!(kernel.diag(&v(&[0.0, 0.0, 0.0])), 0.0);
    }

    #[test]
    fn test_gram_is_symmetric_psd_diagonal() {
        let kernel = PreferenceKernel::new(1.0, 1.0);
        let pts = vec![v(&[1.0, 0.0]), v(&[0.0, 1.0]), v(&[1.0, 1.0])];
        let k = kernel.gram(&pts);
        assert_eq!(k, k.transpose());
        for i in 0..3 {
            assert!(k[(i, i)] > 0.0);
        }
    }

    #[test]
    fn test_farthest_point_skips_sign_duplicates() {
        let pts = vec![v(&[1.0]), v(&[-1.0]), v(&[3.0]), v(&[1.0])];
        let idx = farthest_point_indices(&pts, 10);
        assert_eq!(idx, vec![2, 0]);
    }

    #[test]
    fn test_farthest_point_respects_cap() {
        let pts: Vec<_> = (1..20).map(|i| v(&[i as f64, (i * i) as f64])).collect();
        assert_eq!(farthest_point_indices(&pts, 5).len(), 5);
        assert!(farthest_point_indices(&[], 5).is_empty());
    }

    #[test]
    fn test_median_lengthscale() {
        let pts = vec![v(&[0.0]), v(&[1.0]), v(&[3.0])];
        assert_relative_eq!(median_lengthscale(&pts), 2.0);
        assert_relative_eq!(median_lengthscale(&[v(&[2.0])]), 2.0);
        assert_relative_eq!(median_lengthscale(&[v(&[0.0])]), 1.0);
    }

    #[test]
    fn test_separating_lengthscale() {
        // closest: 1.0 and -1.5 are 0.5 apart up to sign
        let pts = vec![v(&[1.0]), v(&[-1.5]), v(&[4.0])];
        assert_relative_eq!(separating_lengthscale(&pts).unwrap(), 0.5 / 3.0);

        let pts = vec![v(&[0.0, 0.0]), v(&[0.3, 0.4])];
        assert_relative_eq!(separating_lengthscale(&pts).unwrap(), 1.0 / 3.0);

        assert!(separating_lengthscale(&[v(&[0.0])]).is_none());
        assert!(separating_lengthscale(&[v(&[2.0]), v(&[-2.0])]).is_none());
    }

    #[test]
    fn test_separating_lengthscale_gives_dominant_diagonal() {
        let pts = vec![v(&[1.0, 0.2]), v(&[0.4, -0.9]), v(&[1.3, 1.1]), v(&[-0.2, 0.5])];
        let ls = separating_lengthscale(&pts).unwrap();
        let k = PreferenceKernel::new(ls, 2.0).gram(&pts);
        for i in 0..pts.len() {
            let off: f64 = (0..pts.len()).filter(|&j| j != i).map(|j| k[(i, j)].abs()).sum();
            assert!(k[(i, i)] > 0.98);
            assert!(off < 0.04);
        }
    }
}
