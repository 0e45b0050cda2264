//! Feature Selection

use crate::error::{ConfigError, SelectionError};
use crate::feature_set::{EngineeredFeatureSet, FeatureCategory, FeatureSelectionResult};
use feature_stats::{best_period, correlation_matrix, entropy, mutual_information, value_counts, variance, LinearFit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Selection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Absolute correlation at which two numerical features are redundant (default: 0.95)
    pub correlation_threshold: f64,
    /// Minimum score a feature needs in its category test (default: 0.01)
    pub feature_selection_threshold: f64,
    /// Cap on the total number of selected features (default: 50)
    pub max_features: usize,
    /// Histogram bins for mutual information (default: 10)
    pub mi_bins: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.95,
            feature_selection_threshold: 0.01,
            max_features: 50,
            mi_bins: 10,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.correlation_threshold > 0.0 && self.correlation_threshold <= 1.0) {
            return Err(ConfigError::new("selection.correlation_threshold", "must be in (0, 1]"));
        }
        if !self.feature_selection_threshold.is_finite() || self.feature_selection_threshold < 0.0 {
            return Err(ConfigError::new(
                "selection.feature_selection_threshold",
                "must be a non-negative number",
            ));
        }
        if self.max_features == 0 {
            return Err(ConfigError::new("selection.max_features", "must be positive"));
        }
        if self.mi_bins < 2 {
            return Err(ConfigError::new("selection.mi_bins", "must be at least 2"));
        }
        Ok(())
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn clean(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Scale scores to [0, 1]; a flat set of scores maps to 1
fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let lo = scores.iter().cloned().fold(f64::MAX, f64::min);
    let hi = scores.iter().cloned().fold(f64::MIN, f64::max);
    let range = hi - lo;
    scores
        .iter()
        .map(|s| if range > 0.0 { (s - lo) / range } else { 1.0 })
        .collect()
}

/// Ranks features by informativeness and prunes redundant ones
pub struct FeatureSelector {
    config: SelectionConfig,
}

impl FeatureSelector {
    /// Create a new selector
    pub fn new(config: SelectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Select an informative, non-redundant subset of the features.
    ///
    /// Filtering is repeated on the survivors until nothing more is pruned,
    /// so selecting again from the result keeps it unchanged.
    pub fn select(&self, set: &EngineeredFeatureSet) -> Result<FeatureSelectionResult, SelectionError> {
        let mut candidates = set.feature_names();
        let mut passes = 0;
        loop {
            passes += 1;
            let result = self.select_pass(set, &candidates)?;
            let survivors = result.all_names();
            if survivors == candidates {
                debug!(
                    "Selected {} of {} features after {} passes",
                    survivors.len(),
                    set.len(),
                    passes
                );
                return Ok(result);
            }
            candidates = survivors;
        }
    }

    fn select_pass(
        &self,
        set: &EngineeredFeatureSet,
        candidates: &BTreeSet<String>,
    ) -> Result<FeatureSelectionResult, SelectionError> {
        let mut result = FeatureSelectionResult::default();
        let mut scores: BTreeMap<String, f64> = BTreeMap::new();

        let numerical = self.select_numerical(set, candidates)?;
        for (name, score) in numerical {
            result.numerical.insert(name.clone());
            scores.insert(name, score);
        }

        for (name, values) in set.categorical().filter(|(n, _)| candidates.contains(*n)) {
            let counts = value_counts(values);
            let cardinality = counts.len();
            let info = entropy(values);
            if cardinality > 1
                && (cardinality as f64) < values.len() as f64 / 2.0
                && info > self.config.feature_selection_threshold
            {
                result.categorical.insert(name.to_string());
                scores.insert(name.to_string(), info / (cardinality as f64).log2());
            }
        }

        for (name, values) in set.temporal().filter(|(n, _)| candidates.contains(*n)) {
            let values = finite(values);
            let persistence = best_period(&values).map_or(0.0, |s| clean(s.strength));
            let slope = LinearFit::over_index(&values).map_or(0.0, |fit| clean(fit.slope));
            let threshold = self.config.feature_selection_threshold;
            if persistence > threshold || slope.abs() > threshold {
                result.temporal.insert(name.to_string());
                scores.insert(name.to_string(), persistence.abs().max(slope.abs().min(1.0)));
            }
        }

        for (name, score) in self.select_derived(set, candidates)? {
            result.derived.insert(name.clone());
            scores.insert(name, score);
        }

        self.truncate(&mut result, scores);
        Ok(result)
    }

    /// Greedy decorrelation then variance filter; returns importance per survivor
    fn select_numerical(
        &self,
        set: &EngineeredFeatureSet,
        candidates: &BTreeSet<String>,
    ) -> Result<Vec<(String, f64)>, SelectionError> {
        let mut columns: Vec<(&str, &[f64], f64)> = set
            .numerical()
            .filter(|(n, _)| candidates.contains(*n))
            .map(|(n, v)| (n, v, clean(variance(&finite(v)))))
            .collect();
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        // Highest-variance features claim their correlation cluster first
        columns.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(b.0)));

        let slices: Vec<&[f64]> = columns.iter().map(|c| c.1).collect();
        let corr = correlation_matrix(&slices)?;

        let mut kept: Vec<usize> = Vec::new();
        for i in 0..columns.len() {
            if kept
                .iter()
                .all(|&j| corr[[i, j]].abs() < self.config.correlation_threshold)
            {
                kept.push(i);
            }
        }
        kept.retain(|&i| columns[i].2 > self.config.feature_selection_threshold);
        if kept.is_empty() {
            return Ok(Vec::new());
        }

        // Importance: mean of normalized variance, mean |corr| and normalized mean MI
        let variance_scores = min_max_normalize(&kept.iter().map(|&i| columns[i].2).collect::<Vec<_>>());
        let max_mi = (self.config.mi_bins as f64).log2();
        let mut out = Vec::with_capacity(kept.len());
        for (pos, &i) in kept.iter().enumerate() {
            let others: Vec<usize> = kept.iter().copied().filter(|&j| j != i).collect();
            let (corr_score, mi_score) = if others.is_empty() {
                (0.0, 0.0)
            } else {
                let corr_mean =
                    others.iter().map(|&j| corr[[i, j]].abs()).sum::<f64>() / others.len() as f64;
                let mut mi_total = 0.0;
                for &j in &others {
                    mi_total += mutual_information(columns[i].1, columns[j].1, self.config.mi_bins)?;
                }
                (corr_mean, (mi_total / others.len() as f64 / max_mi).min(1.0))
            };
            let importance = (variance_scores[pos] + clean(corr_score) + clean(mi_score)) / 3.0;
            out.push((columns[i].0.to_string(), importance));
        }
        Ok(out)
    }

    /// Keep derived features whose average pairwise MI clears the threshold
    fn select_derived(
        &self,
        set: &EngineeredFeatureSet,
        candidates: &BTreeSet<String>,
    ) -> Result<Vec<(String, f64)>, SelectionError> {
        let columns: Vec<(&str, &[f64])> = set
            .derived()
            .filter(|(n, _)| candidates.contains(*n))
            .collect();
        // Without a partner there is no pairwise evidence to prune on
        if columns.len() < 2 {
            return Ok(columns.into_iter().map(|(n, _)| (n.to_string(), 0.0)).collect());
        }

        let max_mi = (self.config.mi_bins as f64).log2();
        let mut out = Vec::new();
        for (i, (name, values)) in columns.iter().enumerate() {
            let mut total = 0.0;
            for (j, (_, other)) in columns.iter().enumerate() {
                if i != j {
                    total += mutual_information(values, other, self.config.mi_bins)?;
                }
            }
            let average = total / (columns.len() - 1) as f64;
            if average > self.config.feature_selection_threshold {
                out.push((name.to_string(), (average / max_mi).min(1.0)));
            }
        }
        Ok(out)
    }

    /// Cap the selection at `max_features` by importance
    fn truncate(&self, result: &mut FeatureSelectionResult, scores: BTreeMap<String, f64>) {
        let mut ranked: Vec<(String, f64)> = scores.into_iter().map(|(k, v)| (k, clean(v))).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        if ranked.len() > self.config.max_features {
            for (name, _) in ranked.drain(self.config.max_features..) {
                for category in FeatureCategory::ALL {
                    result.category_mut(category).remove(&name);
                }
            }
        }
        result.importance = ranked.into_iter().collect();
    }
}

impl Default for FeatureSelector {
    fn default() -> Self {
        Self {
            config: SelectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_set::FeatureColumn;
    use proptest::prelude::*;

    fn base_set() -> EngineeredFeatureSet {
        let mut set = EngineeredFeatureSet::new();
        let points = vec![10.0, 12.0, 11.0, 30.0, 9.0, 11.0, 10.0, 15.0, 14.0, 20.0];
        let doubled: Vec<f64> = points.iter().map(|v| v * 2.0).collect();
        set.insert("points", FeatureColumn::Numerical(points.clone())).unwrap();
        set.insert("points_x2", FeatureColumn::Numerical(doubled)).unwrap();
        set.insert(
            "rebounds",
            FeatureColumn::Numerical(vec![5.0, 3.0, 8.0, 4.0, 7.0, 2.0, 6.0, 5.0, 9.0, 1.0]),
        )
        .unwrap();
        set.insert("flat", FeatureColumn::Numerical(vec![1.0; 10])).unwrap();
        set
    }

    #[test]
    fn test_correlated_numerical_pruned() {
        let result = FeatureSelector::default().select(&base_set()).unwrap();
        // points_x2 has the larger variance, so it represents the pair
        assert!(result.numerical.contains("points_x2"));
        assert!(!result.numerical.contains("points"));
        assert!(result.numerical.contains("rebounds"));
        assert!(!result.numerical.contains("flat"));
    }

    #[test]
    fn test_categorical_cardinality_window() {
        let mut set = EngineeredFeatureSet::new();
        let venue: Vec<String> = (0..10).map(|i| if i % 2 == 0 { "home" } else { "away" }.to_string()).collect();
        let ids: Vec<String> = (0..10).map(|i| format!("game-{}", i)).collect();
        set.insert("venue", FeatureColumn::Categorical(venue)).unwrap();
        set.insert("game_id", FeatureColumn::Categorical(ids)).unwrap();
        set.insert("league", FeatureColumn::Categorical(vec!["nba".to_string(); 10])).unwrap();

        let result = FeatureSelector::default().select(&set).unwrap();
        assert_eq!(result.categorical, BTreeSet::from(["venue".to_string()]));
        assert!((result.importance["venue"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_temporal_needs_persistence_or_trend() {
        let mut set = EngineeredFeatureSet::new();
        let trend: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        set.insert("trend", FeatureColumn::Temporal(trend)).unwrap();
        set.insert("flat", FeatureColumn::Temporal(vec![2.0; 12])).unwrap();

        let result = FeatureSelector::default().select(&set).unwrap();
        assert!(result.temporal.contains("trend"));
        assert!(!result.temporal.contains("flat"));
    }

    #[test]
    fn test_derived_informative_pair_kept() {
        let mut set = EngineeredFeatureSet::new();
        let a: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let b: Vec<f64> = a.iter().map(|v| v * v).collect();
        set.insert("a", FeatureColumn::Derived(a)).unwrap();
        set.insert("b", FeatureColumn::Derived(b)).unwrap();
        set.insert("flat", FeatureColumn::Derived(vec![0.0; 20])).unwrap();

        let result = FeatureSelector::default().select(&set).unwrap();
        assert!(result.derived.contains("a"));
        assert!(result.derived.contains("b"));
        assert!(!result.derived.contains("flat"));
    }

    #[test]
    fn test_max_features_truncates_by_importance() {
        let config = SelectionConfig {
            max_features: 1,
            ..Default::default()
        };
        let result = FeatureSelector::new(config).unwrap().select(&base_set()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.importance.len(), 1);
    }

    #[test]
    fn test_empty_categories_are_valid() {
        let result = FeatureSelector::default().select(&EngineeredFeatureSet::new()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SelectionConfig {
            correlation_threshold: 1.5,
            ..Default::default()
        };
        assert!(FeatureSelector::new(config).is_err());
    }

    fn arb_set() -> impl Strategy<Value = EngineeredFeatureSet> {
        (4usize..16).prop_flat_map(|n| {
            (
                prop::collection::vec(prop::collection::vec(-50.0f64..50.0, n), 1..5),
                prop::collection::vec(prop::collection::vec(0u8..4, n), 0..3),
                prop::collection::vec(prop::collection::vec(-10.0f64..10.0, n), 0..3),
                prop::collection::vec(prop::collection::vec(-5.0f64..5.0, n), 0..4),
            )
                .prop_map(|(num, cat, temp, der)| {
                    let mut set = EngineeredFeatureSet::new();
                    for (i, v) in num.into_iter().enumerate() {
                        set.insert(format!("n{}", i), FeatureColumn::Numerical(v)).unwrap();
                    }
                    for (i, v) in cat.into_iter().enumerate() {
                        let labels = v.into_iter().map(|c| format!("c{}", c)).collect();
                        set.insert(format!("c{}", i), FeatureColumn::Categorical(labels)).unwrap();
                    }
                    for (i, v) in temp.into_iter().enumerate() {
                        set.insert(format!("t{}", i), FeatureColumn::Temporal(v)).unwrap();
                    }
                    for (i, v) in der.into_iter().enumerate() {
                        set.insert(format!("d{}", i), FeatureColumn::Derived(v)).unwrap();
                    }
                    set
                })
        })
    }

    proptest! {
        #[test]
        fn prop_selection_is_idempotent(set in arb_set()) {
            let selector = FeatureSelector::new(SelectionConfig { max_features: 6, ..Default::default() }).unwrap();
            let first = selector.select(&set).unwrap();
            let second = selector.select(&first.apply(&set)).unwrap();
            prop_assert_eq!(first.all_names(), second.all_names());
        }
    }
}
