//! Ordinary Least Squares

use crate::StatsError;
use serde::{Deserialize, Serialize};

fn check_pair(operation: &'static str, x: &[f64], y: &[f64]) -> Result<(), StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch {
            operation,
            left: x.len(),
            right: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(StatsError::InsufficientData {
            operation,
            required: 2,
            actual: x.len(),
        });
    }
    Ok(())
}

/// Least-squares slope of `y` against `x`.
///
/// A degenerate `x` (all values equal) yields a slope of `0`.
pub fn linreg_slope(x: &[f64], y: &[f64]) -> Result<f64, StatsError> {
    check_pair("linreg_slope", x, y)?;

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        sxy += (xi - mean_x) * (yi - mean_y);
        sxx += (xi - mean_x) * (xi - mean_x);
    }

    if sxx == 0.0 {
        return Ok(0.0);
    }
    Ok(sxy / sxx)
}

/// Intercept of the least-squares line through `(x, y)` with a given slope
pub fn linreg_intercept(x: &[f64], y: &[f64], slope: f64) -> Result<f64, StatsError> {
    check_pair("linreg_intercept", x, y)?;

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    Ok(mean_y - slope * mean_x)
}

/// Fitted line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fit a line against the observation index `0..len`
    pub fn over_index(y: &[f64]) -> Result<Self, StatsError> {
        let x: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
        Self::fit(&x, y)
    }

    /// Fit a line through paired observations
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self, StatsError> {
        let slope = linreg_slope(x, y)?;
        let intercept = linreg_intercept(x, y, slope)?;
        Ok(Self { slope, intercept })
    }

    /// Evaluate the line at `x`
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let slope = linreg_slope(&x, &y).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((linreg_intercept(&x, &y, slope).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_data() {
        let err = linreg_slope(&[1.0], &[2.0]).unwrap_err();
        assert!(matches!(err, StatsError::InsufficientData { required: 2, actual: 1, .. }));
        assert!(linreg_slope(&[], &[]).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let err = linreg_slope(&[1.0, 2.0], &[2.0]).unwrap_err();
        assert!(matches!(err, StatsError::LengthMismatch { .. }));
    }

    #[test]
    fn test_fit_over_index() {
        let fit = LinearFit::over_index(&[5.0, 4.0, 3.0, 2.0]).unwrap();
        assert!((fit.slope + 1.0).abs() < 1e-12);
        assert!((fit.predict(4.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_x_has_zero_slope() {
        assert_eq!(linreg_slope(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).unwrap(), 0.0);
    }
}
