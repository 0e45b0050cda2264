//! Statistics Kernel
//!
//! Pure, side-effect-free statistics shared by every stage of the feature pipeline.

mod correlation;
mod descriptive;
mod information;
mod regression;
mod seasonality;

pub use correlation::correlation_matrix;
pub use descriptive::{mean, min_max, outlier_indices, std_dev, variance, Summary};
pub use information::{entropy, mutual_information, value_counts};
pub use regression::{linreg_intercept, linreg_slope, LinearFit};
pub use seasonality::{
    autocorrelation, best_period, best_period_with_max_lag, Seasonality, DEFAULT_SEASONALITY_THRESHOLD,
    MAX_SEASONAL_LAG,
};

use thiserror::Error;

/// Errors raised by kernel functions that are not total
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// Sequence too short for the requested statistic
    #[error("{operation} needs at least {required} values, got {actual}")]
    InsufficientData {
        operation: &'static str,
        required: usize,
        actual: usize,
    },

    /// Paired sequences of different lengths
    #[error("{operation} needs equal-length inputs, got {left} and {right}")]
    LengthMismatch {
        operation: &'static str,
        left: usize,
        right: usize,
    },

    /// Parameter outside its domain
    #[error("Invalid parameter for {operation}: {reason}")]
    InvalidParameter {
        operation: &'static str,
        reason: String,
    },
}
