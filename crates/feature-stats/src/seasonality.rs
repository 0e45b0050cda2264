//! Autocorrelation and Period Detection

use serde::{Deserialize, Serialize};

/// Autocorrelation strength above which a series is treated as seasonal
pub const DEFAULT_SEASONALITY_THRESHOLD: f64 = 0.5;

/// Upper bound on the lags scanned by [`best_period`]
pub const MAX_SEASONAL_LAG: usize = 50;

/// Autocorrelation at `lag`.
///
/// The lagged covariance is divided by the variance of the whole series,
/// so longer lags are naturally damped. Returns `0` when the lag window is
/// empty or the series has no variance.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if n == 0 || lag >= n {
        return 0.0;
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let denominator: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    if denominator == 0.0 {
        return 0.0;
    }

    let numerator: f64 = values
        .iter()
        .zip(values.iter().skip(lag))
        .map(|(a, b)| (a - mean) * (b - mean))
        .sum();

    let r = numerator / denominator;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Dominant cycle of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    /// Lag with the highest autocorrelation
    pub period: usize,
    /// Autocorrelation at that lag
    pub strength: f64,
}

impl Seasonality {
    /// Whether the cycle is strong enough to count as seasonal
    pub fn is_seasonal(&self) -> bool {
        self.exceeds(DEFAULT_SEASONALITY_THRESHOLD)
    }

    /// Whether the strength is above a custom threshold
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.strength > threshold
    }
}

/// Scan lags `1..=min(50, len/2)` for the strongest autocorrelation
pub fn best_period(values: &[f64]) -> Option<Seasonality> {
    best_period_with_max_lag(values, MAX_SEASONAL_LAG.min(values.len() / 2))
}

/// Scan lags `1..=max_lag` for the strongest autocorrelation.
///
/// Returns `None` when no lag can be scanned. Ties keep the shortest lag.
pub fn best_period_with_max_lag(values: &[f64], max_lag: usize) -> Option<Seasonality> {
    let max_lag = max_lag.min(values.len().saturating_sub(1));
    (1..=max_lag)
        .map(|lag| Seasonality {
            period: lag,
            strength: autocorrelation(values, lag),
        })
        .fold(None, |best: Option<Seasonality>, candidate| match best {
            Some(b) if b.strength >= candidate.strength => Some(b),
            _ => Some(candidate),
        })
}
