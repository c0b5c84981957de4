//! Harness error types.

use thiserror::Error;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that abort a benchmark run.
///
/// Counter anomalies and empty sample sets are not errors: they surface as
/// [`crate::metrics::Observation::Anomalous`] and
/// [`crate::stats::MetricSummary::NoSamples`] respectively.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A timing source could not be read.
    #[error("clock unavailable: {clock}")]
    ClockUnavailable {
        /// Which clock failed (`wall` or `cpu`).
        clock: &'static str,
    },

    /// `begin`/`end` of a measured region were not paired.
    #[error("measured region mismatch: {detail}")]
    RegionMismatch {
        /// What went wrong.
        detail: &'static str,
    },

    /// The run configuration was rejected before any iteration ran.
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HarnessError::ClockUnavailable { clock: "cpu" };
        assert_eq!(err.to_string(), "clock unavailable: cpu");

        let err = HarnessError::RegionMismatch {
            detail: "end() without begin()",
        };
        assert_eq!(
            err.to_string(),
            "measured region mismatch: end() without begin()"
        );

        let err = HarnessError::InvalidConfig("scale must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid run configuration: scale must be positive"
        );
    }
}
