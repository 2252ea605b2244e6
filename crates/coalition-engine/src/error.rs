use std::time::Duration;

/// Result type used throughout the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors raised by one analysis run.
///
/// Every error is local to the run that produced it; there is no process-wide error state.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::IsVariant)]
pub enum EngineError {
    /// Malformed or missing input, reported with the offending column and row.
    #[display(
        "invalid feature data in column '{column}'{}: {reason}",
        row.as_ref().map(|row| format!(" (member '{row}')")).unwrap_or_default()
    )]
    InvalidFeatureData {
        column: String,
        row: Option<String>,
        reason: String,
    },
    /// Well-formed input whose grand-coalition value cannot be normalized against.
    #[display("degenerate result: grand coalition value v(N) = {grand_value} is not positive")]
    DegenerateResult { grand_value: f64 },
    /// A parallel unit failed; the run is aborted rather than dropping the unit.
    #[display("worker failed on {unit}: {message}")]
    WorkerExecution { unit: String, message: String },
    /// The sampler hit its iteration budget before reaching the requested tolerance.
    ///
    /// Only raised when strict convergence is requested.
    #[display(
        "approximation did not converge after {iterations} permutations \
         (max standard error {max_standard_error:.6}, tolerance {tolerance:.6})"
    )]
    ConvergenceTimeout {
        iterations: usize,
        max_standard_error: f64,
        tolerance: f64,
    },
    /// The run-level timeout expired before all units finished.
    #[display(
        "analysis timed out after {elapsed:?} ({completed_units}/{total_units} units completed)"
    )]
    Timeout {
        elapsed: Duration,
        completed_units: usize,
        total_units: usize,
    },
    /// The run was cancelled by the caller.
    #[display("analysis cancelled ({completed_units}/{total_units} units completed)")]
    Cancelled {
        completed_units: usize,
        total_units: usize,
    },
    /// An engine or value-function parameter is out of range.
    #[display("invalid configuration for '{parameter}': {reason}")]
    InvalidConfig {
        parameter: &'static str,
        reason: String,
    },
}

impl EngineError {
    pub(crate) fn invalid_feature<C, R>(column: C, row: Option<String>, reason: R) -> Self
    where
        C: Into<String>,
        R: Into<String>,
    {
        Self::InvalidFeatureData {
            column: column.into(),
            row,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config<R>(parameter: &'static str, reason: R) -> Self
    where
        R: Into<String>,
    {
        Self::InvalidConfig {
            parameter,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_feature_display_with_row() {
        let err = EngineError::invalid_feature("goals", Some("p7".to_owned()), "not a number");
        assert_eq!(
            err.to_string(),
            "invalid feature data in column 'goals' (member 'p7'): not a number"
        );
    }

    #[test]
    fn test_invalid_feature_display_without_row() {
        let err = EngineError::invalid_feature("tackles_won", None, "required column is missing");
        assert_eq!(
            err.to_string(),
            "invalid feature data in column 'tackles_won': required column is missing"
        );
    }

    #[test]
    fn test_variant_predicates() {
        let err = EngineError::DegenerateResult { grand_value: 0.0 };
        assert!(err.is_degenerate_result());
        assert!(!err.is_timeout());
    }
}
