//! Standard normal distribution helpers.

use statrs::distribution::{ContinuousCDF, Normal};

/// Standard normal cumulative distribution function Φ(z).
#[must_use]
pub fn cdf(z: f64) -> f64 {
    Normal::standard().cdf(z)
}

/// Probability that a normal estimate with standard error `std_error` lies within
/// `±tolerance` of its mean, i.e. `2Φ(tolerance / std_error) - 1`.
///
/// A zero standard error is treated as full confidence.
///
/// # Examples
///
/// ```
/// # use coalition_stats::normal::two_sided_confidence;
/// assert_eq!(two_sided_confidence(0.1, 0.0), 1.0);
/// assert!(two_sided_confidence(1.0, 1.0) > 0.68);
/// ```
#[must_use]
pub fn two_sided_confidence(tolerance: f64, std_error: f64) -> f64 {
    if std_error <= 0.0 {
        return 1.0;
    }
    (2.0 * cdf(tolerance / std_error) - 1.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdf_known_values() {
        assert!((cdf(0.0) - 0.5).abs() < 1e-12);
        for z in [0.3, 1.0, 1.96, 2.5] {
            assert!((cdf(z) + cdf(-z) - 1.0).abs() < 1e-12);
        }
        assert!((cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((cdf(1.0) - 0.841_344_746).abs() < 1e-8);
    }

    #[test]
    fn test_two_sided_confidence_is_monotone() {
        let tight = two_sided_confidence(0.5, 1.0);
        let loose = two_sided_confidence(2.0, 1.0);
        assert!(tight < loose);
        assert!(two_sided_confidence(0.0, 1.0).abs() < 1e-12);
        assert!((two_sided_confidence(1.96, 1.0) - 0.95).abs() < 1e-3);
    }
}
