//! Numeric helpers for the coalition contribution engine.
//!
//! This crate has no knowledge of members or coalitions. It provides:
//!
//! - **Descriptive statistics**: min, max, mean, median and spread of a finished dataset
//! - **Running statistics**: streaming mean/variance (Welford) that can be merged across
//!   workers, used to track Monte Carlo convergence
//! - **Normal distribution helpers**: standard normal CDF and two-sided confidence levels
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`running`]: Streaming statistics with parallel merge
//! - [`normal`]: Standard normal CDF and confidence helpers
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use coalition_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```
//!
//! ## Tracking a running mean
//!
//! ```
//! use coalition_stats::running::RunningStats;
//!
//! let mut stats = RunningStats::new();
//! for v in [2.0, 4.0, 6.0] {
//!     stats.push(v);
//! }
//! assert_eq!(stats.mean(), 4.0);
//! assert_eq!(stats.count(), 3);
//! ```
//!
//! ## Two-sided confidence for a tolerance
//!
//! ```
//! use coalition_stats::normal;
//!
//! // a tolerance of 1.96 standard errors is the usual 95% interval
//! let confidence = normal::two_sided_confidence(1.96, 1.0);
//! assert!((confidence - 0.95).abs() < 1e-3);
//! ```

pub mod descriptive;
pub mod normal;
pub mod running;
