//! Entropy and Mutual Information

use crate::StatsError;
use std::collections::BTreeMap;

/// Count occurrences of each distinct value
pub fn value_counts<S: AsRef<str>>(values: &[S]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value.as_ref()).or_insert(0) += 1;
    }
    counts
}

/// Shannon entropy (bits) of the empirical distribution of `values`
pub fn entropy<S: AsRef<str>>(values: &[S]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    value_counts(values)
        .values()
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum()
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn bin_index(value: f64, min: f64, width: f64, num_bins: usize) -> usize {
    if width <= 0.0 {
        return 0;
    }
    (((value - min) / width).floor() as usize).min(num_bins - 1)
}

/// Histogram estimate of the mutual information (bits) between two series.
///
/// Both series are split into `num_bins` equal-width bins over their own
/// range. Pairs containing a non-finite value are ignored.
pub fn mutual_information(x: &[f64], y: &[f64], num_bins: usize) -> Result<f64, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch {
            operation: "mutual_information",
            left: x.len(),
            right: y.len(),
        });
    }
    if num_bins == 0 {
        return Err(StatsError::InvalidParameter {
            operation: "mutual_information",
            reason: "num_bins must be positive".to_string(),
        });
    }

    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pairs.is_empty() {
        return Ok(0.0);
    }

    let (x_min, x_max) = bounds(pairs.iter().map(|p| p.0));
    let (y_min, y_max) = bounds(pairs.iter().map(|p| p.1));
    let x_width = (x_max - x_min) / num_bins as f64;
    let y_width = (y_max - y_min) / num_bins as f64;

    let mut joint = vec![0usize; num_bins * num_bins];
    let mut marginal_x = vec![0usize; num_bins];
    let mut marginal_y = vec![0usize; num_bins];
    for &(a, b) in &pairs {
        let i = bin_index(a, x_min, x_width, num_bins);
        let j = bin_index(b, y_min, y_width, num_bins);
        joint[i * num_bins + j] += 1;
        marginal_x[i] += 1;
        marginal_y[j] += 1;
    }

    let n = pairs.len() as f64;
    let mut mi = 0.0;
    for i in 0..num_bins {
        for j in 0..num_bins {
            let count = joint[i * num_bins + j];
            if count == 0 {
                continue;
            }
            let p_xy = count as f64 / n;
            let p_x = marginal_x[i] as f64 / n;
            let p_y = marginal_y[j] as f64 / n;
            mi += p_xy * (p_xy / (p_x * p_y)).log2();
        }
    }
    Ok(mi.max(0.0))
}
