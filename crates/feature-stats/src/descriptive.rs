//! Descriptive Statistics

use serde::{Deserialize, Serialize};

/// Arithmetic mean, `0` for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance, `0` for fewer than two values
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation, `0` for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Minimum and maximum, `None` for an empty slice
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().cloned().fold(f64::MAX, f64::min);
    let max = values.iter().cloned().fold(f64::MIN, f64::max);
    Some((min, max))
}

/// Indices of values lying more than `sigma` standard deviations away from
/// the mean of the remaining observations.
///
/// Each point is compared against the distribution of the others
/// (leave-one-out), so a single spike in a short series is still caught.
/// Needs at least three values; shorter inputs never report outliers.
pub fn outlier_indices(values: &[f64], sigma: f64) -> Vec<usize> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }

    let m = mean(values);
    let q: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    let others = (n - 1) as f64;

    values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| {
            let d = v - m;
            // Mean of the others sits at m - d/(n-1), so the gap is d*n/(n-1)
            let deviation = (d * n as f64 / others).abs();
            let var_others = ((q - d * d) / others - (d / others).powi(2)).max(0.0);
            let std_others = var_others.sqrt();

            let is_outlier = if std_others > f64::EPSILON {
                deviation > sigma * std_others
            } else {
                deviation > f64::EPSILON
            };
            is_outlier.then_some(i)
        })
        .collect()
}

/// Summary statistics for a numeric column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of finite values
    pub count: usize,
    /// Number of NaN or infinite values skipped
    pub missing: usize,
    /// Mean value
    pub mean: f64,
    /// Standard deviation
    pub std_dev: f64,
    /// Skewness (asymmetry)
    pub skewness: f64,
    /// Excess kurtosis (tailedness relative to a normal distribution)
    pub kurtosis: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean absolute change between consecutive values
    pub rate_of_change: f64,
}

impl Summary {
    /// Compute summary statistics, skipping non-finite values
    pub fn compute(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let missing = values.len() - finite.len();

        if finite.is_empty() {
            return Self {
                missing,
                ..Self::default()
            };
        }

        let n = finite.len() as f64;
        let mean = mean(&finite);
        let (min, max) = min_max(&finite).unwrap_or((0.0, 0.0));

        let mut m2 = 0.0;
        let mut m3 = 0.0;
        let mut m4 = 0.0;
        for &v in &finite {
            let d = v - mean;
            m2 += d * d;
            m3 += d * d * d;
            m4 += d * d * d * d;
        }

        let variance = m2 / n;
        let std_dev = variance.sqrt();

        // Skewness: E[(X-μ)³] / σ³
        let skewness = if std_dev > 0.0 {
            (m3 / n) / (std_dev * std_dev * std_dev)
        } else {
            0.0
        };

        // Kurtosis: E[(X-μ)⁴] / σ⁴ - 3
        let kurtosis = if std_dev > 0.0 {
            (m4 / n) / (variance * variance) - 3.0
        } else {
            0.0
        };

        let rate_of_change = if finite.len() >= 2 {
            finite.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (finite.len() - 1) as f64
        } else {
            0.0
        };

        Self {
            count: finite.len(),
            missing,
            mean,
            std_dev,
            skewness,
            kurtosis,
            min,
            max,
            rate_of_change,
        }
    }

    /// Coefficient of variation (`std / |mean|`), `None` when the mean is zero
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        (self.mean.abs() > f64::EPSILON).then(|| self.std_dev / self.mean.abs())
    }
}
