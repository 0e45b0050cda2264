//! Correlation Matrix

use crate::StatsError;
use ndarray::{Array2, Axis};

/// Pearson correlation matrix of a set of equal-length columns.
///
/// Columns are mean-centred, their covariance is divided by the outer
/// product of the column standard deviations. Entries involving a
/// zero-variance column are `0`; the diagonal is always `1`.
pub fn correlation_matrix(columns: &[&[f64]]) -> Result<Array2<f64>, StatsError> {
    let k = columns.len();
    let n = columns.first().map_or(0, |c| c.len());
    if let Some(bad) = columns.iter().find(|c| c.len() != n) {
        return Err(StatsError::LengthMismatch {
            operation: "correlation_matrix",
            left: n,
            right: bad.len(),
        });
    }

    let mut corr = Array2::<f64>::eye(k);
    if n == 0 || k == 0 {
        return Ok(corr);
    }

    let matrix = Array2::from_shape_fn((n, k), |(i, j)| columns[j][i]);
    let means = matrix.mean_axis(Axis(0)).unwrap_or_else(|| ndarray::Array1::zeros(k));
    let centered = &matrix - &means;
    let covariance = centered.t().dot(&centered) / n as f64;
    let std: Vec<f64> = covariance.diag().iter().map(|v| v.max(0.0).sqrt()).collect();

    for i in 0..k {
        for j in 0..k {
            if i == j {
                continue;
            }
            let denom = std[i] * std[j];
            let value = if denom > 0.0 {
                (covariance[[i, j]] / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            corr[[i, j]] = if value.is_finite() { value } else { 0.0 };
        }
    }

    Ok(corr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_correlations() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [4.0, 3.0, 2.0, 1.0];
        let corr = correlation_matrix(&[&a[..], &b[..], &c[..]]).unwrap();

        assert!((corr[[0, 1]] - 1.0).abs() < 1e-12);
        assert!((corr[[0, 2]] + 1.0).abs() < 1e-12);
        assert!((corr[[1, 0]] - corr[[0, 1]]).abs() < 1e-12);
        for i in 0..3 {
            assert_eq!(corr[[i, i]], 1.0);
        }
    }

    #[test]
    fn test_constant_column_is_uncorrelated() {
        let a = [1.0, 2.0, 3.0];
        let flat = [5.0, 5.0, 5.0];
        let corr = correlation_matrix(&[&a[..], &flat[..]]).unwrap();
        assert_eq!(corr[[0, 1]], 0.0);
        assert_eq!(corr[[1, 1]], 1.0);
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0];
        assert!(correlation_matrix(&[&a[..], &b[..]]).is_err());
    }

    #[test]
    fn test_empty_input() {
        let corr = correlation_matrix(&[]).unwrap();
        assert_eq!(corr.dim(), (0, 0));
    }
}
