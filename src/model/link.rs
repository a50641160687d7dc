//! Link functions and Gaussian helpers

/// Sigmoid function: σ(x) = 1 / (1 + exp(-x))
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let ex = x.exp();
        ex / (1.0 + ex)
    }
}

/// Log sigmoid: log(σ(x)) = -log(1 + exp(-x))
pub fn log_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

/// Standard normal density
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Standard normal CDF (Abramowitz and Stegun 7.1.26)
pub fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let z = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * z);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();

    0.5 * (1.0 + sign * y)
}

/// Expected improvement of a Gaussian `N(mean, var)` over `threshold`
///
/// `E[max(X - threshold, 0)]`; degenerates to the plain excess when the
/// variance vanishes.
pub fn expected_improvement(mean: f64, var: f64, threshold: f64) -> f64 {
    let std = var.max(0.0).sqrt();
    let excess = mean - threshold;
    if std < 1e-12 {
        return excess.max(0.0);
    }
    let z = excess / std;
    excess * normal_cdf(z) + std * normal_pdf(z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(40.0) > 0.999_999);
        assert!(sigmoid(-40.0) < 1e-6);
        for x in [-3.0, -0.5, 0.25, 2.0] {
            assert_relative_eq!(sigmoid(x) + sigmoid(-x), 1.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_log_sigmoid() {
        assert_relative_eq!(log_sigmoid(0.0), 0.5f64.ln());
        assert_relative_eq!(log_sigmoid(2.0), sigmoid(2.0).ln(), epsilon = 1e-12);
        assert!(log_sigmoid(-800.0).is_finite());
    }

    #[test]
    fn test_normal_cdf() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_relative_eq!(normal_cdf(1.96), 0.975, epsilon = 1e-3);
        assert_relative_eq!(normal_cdf(-1.0) + normal_cdf(1.0), 1.0, epsilon = 1e-7);
    }

    #[test]
    fn test_expected_improvement() {
        assert_relative_eq!(expected_improvement(1.0, 0.0, 0.5), 0.5);
        assert_eq!(expected_improvement(-1.0, 0.0, 0.0), 0.0);
        let ei = expected_improvement(0.0, 1.0, 0.0);
        assert_relative_eq!(ei, normal_pdf(0.0), epsilon = 1e-7);
        assert!(expected_improvement(0.0, 4.0, 0.0) > ei);
    }
}
