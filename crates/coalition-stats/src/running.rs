//! Streaming mean and variance.
//!
//! [`RunningStats`] accumulates samples one at a time using Welford's update, and two
//! accumulators built on different threads can be combined with [`RunningStats::merge`]
//! (Chan et al. parallel formula). Merging is deterministic: merging the same
//! accumulators in the same order always gives bit-identical results.

/// Streaming accumulator for count, mean and variance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Adds one sample.
    #[expect(clippy::cast_precision_loss)]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Folds `other` into `self`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use coalition_stats::running::RunningStats;
    /// let mut a = RunningStats::new();
    /// let mut b = RunningStats::new();
    /// a.push(1.0);
    /// a.push(2.0);
    /// b.push(3.0);
    /// a.merge(&b);
    /// assert_eq!(a.count(), 3);
    /// assert_eq!(a.mean(), 2.0);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let n_self = self.count as f64;
        let n_other = other.count as f64;
        let n = count as f64;
        self.mean += delta * n_other / n;
        self.m2 += other.m2 + delta * delta * n_self * n_other / n;
        self.count = count;
    }

    /// Number of samples seen.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sample mean (0 when empty).
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance; `None` with fewer than two samples.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| (self.m2 / (self.count - 1) as f64).max(0.0))
    }

    /// Standard error of the mean; `None` with fewer than two samples.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn standard_error(&self) -> Option<f64> {
        self.sample_variance()
            .map(|var| (var / self.count as f64).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_values(values: &[f64]) -> RunningStats {
        let mut stats = RunningStats::new();
        for &v in values {
            stats.push(v);
        }
        stats
    }

    #[test]
    fn test_mean_and_variance() {
        let stats = from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        // population variance is 4, sample variance is 32 / 7
        assert!((stats.sample_variance().unwrap() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_samples_for_variance() {
        assert_eq!(RunningStats::new().sample_variance(), None);
        assert_eq!(from_values(&[1.0]).standard_error(), None);
    }

    #[test]
    fn test_constant_samples_have_zero_error() {
        let stats = from_values(&[0.3; 10]);
        assert_eq!(stats.standard_error(), Some(0.0));
    }

    #[test]
    fn test_merge_matches_sequential() {
        let values = [1.5, -0.5, 3.25, 8.0, 2.0, 2.0, 7.5];
        let sequential = from_values(&values);

        let mut merged = from_values(&values[..3]);
        merged.merge(&from_values(&values[3..]));

        assert_eq!(merged.count(), sequential.count());
        assert!((merged.mean() - sequential.mean()).abs() < 1e-12);
        assert!(
            (merged.sample_variance().unwrap() - sequential.sample_variance().unwrap()).abs()
                < 1e-12
        );
    }

    #[test]
    fn test_merge_with_empty() {
        let mut stats = from_values(&[1.0, 2.0]);
        let before = stats;
        stats.merge(&RunningStats::new());
        assert_eq!(stats, before);

        let mut empty = RunningStats::new();
        empty.merge(&before);
        assert_eq!(empty, before);
    }
}
