//! Feature Quality Metrics

use feature_engine::{EngineeredFeatureSet, FeatureColumn};
use feature_stats::{best_period, outlier_indices, value_counts, LinearFit, Summary};
use serde::{Deserialize, Serialize};

/// Quality scores in [0, 1], higher is better
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// 1 - missing / total values
    pub completeness: f64,
    /// Mean of numerical outlier-free fraction and categorical cardinality fit
    pub consistency: f64,
    /// Fraction of features carrying any signal
    pub relevance: f64,
    /// Mean of 1 / (1 + CV) for numeric features and seasonal strength for temporal
    pub stability: f64,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            completeness: 1.0,
            consistency: 1.0,
            relevance: 1.0,
            stability: 1.0,
        }
    }
}

/// Parameters for quality scoring
#[derive(Debug, Clone, Copy)]
pub(crate) struct QualityParams {
    pub outlier_sigma: f64,
    pub expected_max_cardinality: usize,
    pub min_trend: f64,
}

fn average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        1.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

impl QualityMetrics {
    pub(crate) fn compute(set: &EngineeredFeatureSet, params: QualityParams) -> Self {
        let mut total = 0usize;
        let mut missing = 0usize;
        let mut consistency = Vec::new();
        let mut relevant = 0usize;
        let mut stability = Vec::new();

        for (_, column) in set.columns() {
            total += column.len();
            match column {
                FeatureColumn::Categorical(values) => {
                    missing += values.iter().filter(|v| v.trim().is_empty()).count();
                    let cardinality = value_counts(values).len();
                    consistency.push(if cardinality <= params.expected_max_cardinality {
                        1.0
                    } else {
                        params.expected_max_cardinality as f64 / cardinality as f64
                    });
                    relevant += usize::from(cardinality > 1);
                }
                FeatureColumn::Temporal(values) => {
                    let values = finite(values);
                    missing += column.len() - values.len();
                    let slope = LinearFit::over_index(&values).map_or(0.0, |fit| fit.slope);
                    relevant += usize::from(slope.abs() > params.min_trend);
                    let strength = best_period(&values).map_or(0.0, |s| s.strength);
                    stability.push(strength.clamp(0.0, 1.0));
                }
                FeatureColumn::Numerical(values) | FeatureColumn::Derived(values) => {
                    let summary = Summary::compute(values);
                    missing += summary.missing;
                    relevant += usize::from(summary.std_dev > 0.0);
                    stability.push(match summary.coefficient_of_variation() {
                        Some(cv) => 1.0 / (1.0 + cv),
                        None if summary.std_dev > 0.0 => 0.0,
                        None => 1.0,
                    });
                    if matches!(column, FeatureColumn::Numerical(_)) && summary.count > 0 {
                        let outliers = outlier_indices(&finite(values), params.outlier_sigma).len();
                        consistency.push(1.0 - outliers as f64 / summary.count as f64);
                    }
                }
            }
        }

        Self {
            completeness: if total == 0 {
                1.0
            } else {
                1.0 - missing as f64 / total as f64
            },
            consistency: average(&consistency),
            relevance: if set.is_empty() {
                1.0
            } else {
                relevant as f64 / set.len() as f64
            },
            stability: average(&stability),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: QualityParams = QualityParams {
        outlier_sigma: 3.0,
        expected_max_cardinality: 3,
        min_trend: 0.01,
    };

    #[test]
    fn test_completeness_counts_missing() {
        let mut set = EngineeredFeatureSet::new();
        set.insert("points", FeatureColumn::Numerical(vec![1.0, f64::NAN, 3.0, 4.0])).unwrap();
        set.insert(
            "venue",
            FeatureColumn::Categorical(vec!["home".into(), "".into(), "away".into(), "home".into()]),
        )
        .unwrap();
        let quality = QualityMetrics::compute(&set, PARAMS);
        assert!((quality.completeness - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_consistency_and_relevance() {
        let mut set = EngineeredFeatureSet::new();
        set.insert(
            "points",
            FeatureColumn::Numerical(vec![10.0, 12.0, 11.0, 30.0, 9.0, 11.0, 10.0]),
        )
        .unwrap();
        let labels: Vec<String> = (0..7).map(|i| format!("team-{}", i % 6)).collect();
        set.insert("opponent", FeatureColumn::Categorical(labels)).unwrap();
        set.insert("flat", FeatureColumn::Derived(vec![1.0; 7])).unwrap();

        let quality = QualityMetrics::compute(&set, PARAMS);
        // Numerical: 6/7 inlier; categorical: 3 expected over 6 distinct
        let expected = (6.0 / 7.0 + 0.5) / 2.0;
        assert!((quality.consistency - expected).abs() < 1e-12);
        assert!((quality.relevance - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_set_scores_perfect() {
        assert_eq!(
            QualityMetrics::compute(&EngineeredFeatureSet::new(), PARAMS),
            QualityMetrics::default()
        );
    }
}
