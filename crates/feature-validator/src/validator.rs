//! Feature Set Validator

use crate::issue::{IssueKind, ValidationIssue, ValidationReport};
use feature_engine::{ConfigError, EngineeredFeatureSet, FeatureCategory};
use feature_stats::{best_period, outlier_indices, std_dev, value_counts, LinearFit, Summary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Required fraction of passing checks (default: 0.95)
    pub validation_threshold: f64,
    /// Standard deviations for outliers and sudden changes (default: 3.0)
    pub outlier_sigma: f64,
    /// Share below which a categorical value is rare (default: 0.10)
    pub imbalance_fraction: f64,
    /// |slope| above which a temporal trend is reported (default: 0.1)
    pub trend_threshold: f64,
    /// Autocorrelation above which seasonality is reported (default: 0.5)
    pub seasonality_threshold: f64,
    /// Largest tolerated |skewness| (default: 1.0)
    pub max_skewness: f64,
    /// Largest tolerated |excess kurtosis| (default: 1.0)
    pub max_excess_kurtosis: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            validation_threshold: 0.95,
            outlier_sigma: 3.0,
            imbalance_fraction: 0.10,
            trend_threshold: 0.1,
            seasonality_threshold: 0.5,
            max_skewness: 1.0,
            max_excess_kurtosis: 1.0,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.validation_threshold) {
            return Err(ConfigError::new("validation.validation_threshold", "must be in [0, 1]"));
        }
        if !(self.outlier_sigma > 0.0) {
            return Err(ConfigError::new("validation.outlier_sigma", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.imbalance_fraction) {
            return Err(ConfigError::new("validation.imbalance_fraction", "must be in [0, 1)"));
        }
        for (field, value) in [
            ("validation.trend_threshold", self.trend_threshold),
            ("validation.seasonality_threshold", self.seasonality_threshold),
            ("validation.max_skewness", self.max_skewness),
            ("validation.max_excess_kurtosis", self.max_excess_kurtosis),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::new(field, "must be a non-negative number"));
            }
        }
        Ok(())
    }
}

/// Accumulates issues and check counts while walking a feature set
#[derive(Default)]
struct Tally {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
    error_count: usize,
    total_checks: usize,
}

impl Tally {
    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warn(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }
}

/// Statistical health checks over an engineered feature set
pub struct FeatureValidator {
    config: ValidationConfig,
}

impl FeatureValidator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a feature set.
    ///
    /// Every value, every consecutive temporal pair and every metadata entry
    /// is one check. The set is valid when the failed fraction is at most
    /// `1 - validation_threshold`.
    pub fn validate(&self, set: &EngineeredFeatureSet) -> ValidationReport {
        let mut tally = Tally::default();

        for category in [FeatureCategory::Numerical, FeatureCategory::Temporal, FeatureCategory::Derived] {
            for (name, values) in set.numeric_columns(category) {
                self.check_numeric(&mut tally, name, category, values);
                if category == FeatureCategory::Temporal {
                    self.check_temporal(&mut tally, name, values, &set.metadata.time_index);
                }
            }
        }
        for (name, values) in set.categorical() {
            self.check_categorical(&mut tally, name, values);
        }
        self.check_metadata(&mut tally, set);

        let report = ValidationReport {
            is_valid: false,
            errors: tally.errors,
            warnings: tally.warnings,
            error_count: tally.error_count,
            total_checks: tally.total_checks,
        };
        let is_valid = report.error_ratio() <= 1.0 - self.config.validation_threshold;

        debug!(
            "Validated {} features: {}/{} checks failed, {} warnings",
            set.len(),
            report.error_count,
            report.total_checks,
            report.warnings.len()
        );
        ValidationReport { is_valid, ..report }
    }

    fn check_numeric(&self, tally: &mut Tally, name: &str, category: FeatureCategory, values: &[f64]) {
        tally.total_checks += values.len();

        let missing = values.iter().filter(|v| v.is_nan()).count();
        let infinite = values.iter().filter(|v| v.is_infinite()).count();
        if missing > 0 {
            tally.error_count += missing;
            tally.error(ValidationIssue::new(
                name,
                Some(category),
                IssueKind::MissingValue,
                missing,
                format!("{} of {} values are NaN", missing, values.len()),
            ));
        }
        if infinite > 0 {
            tally.error_count += infinite;
            tally.error(ValidationIssue::new(
                name,
                Some(category),
                IssueKind::InfiniteValue,
                infinite,
                format!("{} of {} values are infinite", infinite, values.len()),
            ));
        }

        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return;
        }

        if finite.iter().all(|v| *v == finite[0]) {
            tally.warn(ValidationIssue::new(
                name,
                Some(category),
                IssueKind::ConstantFeature,
                finite.len(),
                format!("all values equal {}", finite[0]),
            ));
            return;
        }

        let outliers = outlier_indices(&finite, self.config.outlier_sigma);
        if !outliers.is_empty() {
            tally.warn(ValidationIssue::new(
                name,
                Some(category),
                IssueKind::Outliers,
                outliers.len(),
                format!(
                    "{} values beyond {} standard deviations",
                    outliers.len(),
                    self.config.outlier_sigma
                ),
            ));
        }

        let summary = Summary::compute(&finite);
        if summary.skewness.abs() > self.config.max_skewness
            || summary.kurtosis.abs() > self.config.max_excess_kurtosis
        {
            tally.warn(ValidationIssue::new(
                name,
                Some(category),
                IssueKind::DistributionShape,
                1,
                format!(
                    "skewness {:.3}, excess kurtosis {:.3}",
                    summary.skewness, summary.kurtosis
                ),
            ));
        }
    }

    /// One check per consecutive pair: time gap or sudden change fails it
    fn check_temporal(&self, tally: &mut Tally, name: &str, values: &[f64], time_index: &[i64]) {
        let pairs = values.len().saturating_sub(1);
        tally.total_checks += pairs;
        if pairs == 0 {
            return;
        }

        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let limit = self.config.outlier_sigma * std_dev(&finite);
        let aligned = time_index.len() == values.len();

        let mut gaps = 0;
        let mut jumps = 0;
        let mut failed = 0;
        for i in 1..values.len() {
            // An unrepresentable step is a gap
            let gap = aligned
                && time_index[i]
                    .checked_sub(time_index[i - 1])
                    .map_or(true, |step| step > 1);
            let delta = (values[i] - values[i - 1]).abs();
            let jump = limit > 0.0 && delta.is_finite() && delta > limit;
            gaps += usize::from(gap);
            jumps += usize::from(jump);
            failed += usize::from(gap || jump);
        }
        tally.error_count += failed;

        let category = Some(FeatureCategory::Temporal);
        if gaps > 0 {
            tally.error(ValidationIssue::new(
                name,
                category,
                IssueKind::TimeGap,
                gaps,
                format!("{} jumps of more than one unit in the time index", gaps),
            ));
        }
        if jumps > 0 {
            tally.error(ValidationIssue::new(
                name,
                category,
                IssueKind::SuddenChange,
                jumps,
                format!(
                    "{} consecutive changes beyond {} standard deviations",
                    jumps, self.config.outlier_sigma
                ),
            ));
        }

        if let Some(season) = best_period(&finite) {
            if season.exceeds(self.config.seasonality_threshold) {
                tally.warn(ValidationIssue::new(
                    name,
                    category,
                    IssueKind::Seasonality,
                    1,
                    format!("period {} with strength {:.3}", season.period, season.strength),
                ));
            }
        }
        if let Ok(fit) = LinearFit::over_index(&finite) {
            if fit.slope.abs() > self.config.trend_threshold {
                tally.warn(ValidationIssue::new(
                    name,
                    category,
                    IssueKind::Trend,
                    1,
                    format!("slope {:.3} per observation", fit.slope),
                ));
            }
        }
    }

    fn check_categorical(&self, tally: &mut Tally, name: &str, values: &[String]) {
        let category = Some(FeatureCategory::Categorical);
        tally.total_checks += values.len();

        let missing = values.iter().filter(|v| v.trim().is_empty()).count();
        if missing > 0 {
            tally.error_count += missing;
            tally.error(ValidationIssue::new(
                name,
                category,
                IssueKind::MissingValue,
                missing,
                format!("{} of {} values are empty", missing, values.len()),
            ));
        }
        if values.is_empty() {
            return;
        }

        let counts = value_counts(values);
        let cardinality = counts.len();
        if cardinality == 1 || (values.len() > 1 && cardinality == values.len()) {
            tally.warn(ValidationIssue::new(
                name,
                category,
                IssueKind::ConstantFeature,
                cardinality,
                format!("{} distinct values over {} observations", cardinality, values.len()),
            ));
            return;
        }

        let n = values.len() as f64;
        let rare: Vec<&str> = counts
            .iter()
            .filter(|(_, count)| (**count as f64) / n < self.config.imbalance_fraction)
            .map(|(value, _)| *value)
            .collect();
        if !rare.is_empty() {
            tally.warn(ValidationIssue::new(
                name,
                category,
                IssueKind::Imbalanced,
                rare.len(),
                format!("rare values: {}", rare.join(", ")),
            ));
        }
    }

    fn check_metadata(&self, tally: &mut Tally, set: &EngineeredFeatureSet) {
        // Categories are a closed enum, so each type entry passes by construction
        tally.total_checks += set.len();

        let numerical: BTreeSet<&str> = set.names_in(FeatureCategory::Numerical).into_iter().collect();
        for (name, params) in &set.metadata.scaling_params {
            tally.total_checks += 1;
            if !params.is_valid() {
                tally.error_count += 1;
                tally.error(ValidationIssue::new(
                    name.as_str(),
                    None,
                    IssueKind::InvalidScalingParams,
                    1,
                    format!("mean {}, std {}", params.mean, params.std),
                ));
            }
            if !numerical.contains(name.as_str()) {
                tally.warn(ValidationIssue::new(
                    name.as_str(),
                    None,
                    IssueKind::OrphanMetadata,
                    1,
                    "scaling parameters for a feature that is not numerical",
                ));
            }
        }

        if !set.metadata.time_index.is_empty() {
            tally.total_checks += 1;
            if let Some(n) = set.observation_count() {
                if n != set.metadata.time_index.len() {
                    tally.error_count += 1;
                    tally.error(ValidationIssue::new(
                        "metadata",
                        None,
                        IssueKind::TimeIndexMismatch,
                        1,
                        format!(
                            "time index has {} entries for {} observations",
                            set.metadata.time_index.len(),
                            n
                        ),
                    ));
                }
            }
        }
    }
}

impl Default for FeatureValidator {
    fn default() -> Self {
        Self {
            config: ValidationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_engine::{FeatureColumn, ScalingParams};
    use proptest::prelude::*;

    fn points_set() -> EngineeredFeatureSet {
        let mut set = EngineeredFeatureSet::new();
        set.insert(
            "points",
            FeatureColumn::Numerical(vec![10.0, 12.0, 11.0, 30.0, 9.0, 11.0, 10.0]),
        )
        .unwrap();
        set
    }

    #[test]
    fn test_outlier_example() {
        let report = FeatureValidator::default().validate(&points_set());
        let outliers: Vec<_> = report.warnings_of(IssueKind::Outliers).collect();
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].occurrences, 1);
        // Warnings never affect validity
        assert!(report.is_valid);
        assert_eq!(report.error_count, 0);
        assert_eq!(report.total_checks, 8);
    }

    #[test]
    fn test_missing_and_infinite_values() {
        let mut set = EngineeredFeatureSet::new();
        set.insert(
            "points",
            FeatureColumn::Numerical(vec![1.0, f64::NAN, 3.0, f64::INFINITY]),
        )
        .unwrap();
        let report = FeatureValidator::default().validate(&set);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.errors_of(IssueKind::MissingValue).count(), 1);
        assert_eq!(report.errors_of(IssueKind::InfiniteValue).count(), 1);
        assert!(!report.is_valid);
    }

    #[test]
    fn test_constant_and_identifier_categoricals() {
        let mut set = EngineeredFeatureSet::new();
        set.insert("league", FeatureColumn::Categorical(vec!["nba".into(); 4])).unwrap();
        set.insert(
            "game_id",
            FeatureColumn::Categorical(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
        )
        .unwrap();
        let report = FeatureValidator::default().validate(&set);
        assert_eq!(report.warnings_of(IssueKind::ConstantFeature).count(), 2);
        assert!(report.is_valid);
    }

    #[test]
    fn test_categorical_imbalance() {
        let mut values: Vec<String> = vec!["home".into(); 6];
        values.extend(vec!["away".to_string(); 5]);
        values.push("neutral".into());
        let mut set = EngineeredFeatureSet::new();
        set.insert("venue", FeatureColumn::Categorical(values)).unwrap();

        let report = FeatureValidator::default().validate(&set);
        let imbalanced: Vec<_> = report.warnings_of(IssueKind::Imbalanced).collect();
        assert_eq!(imbalanced.len(), 1);
        assert!(imbalanced[0].message.contains("neutral"));
    }

    #[test]
    fn test_time_gap_is_error() {
        let mut set = EngineeredFeatureSet::new();
        set.insert("form", FeatureColumn::Temporal(vec![1.0, 1.1, 1.2, 1.3])).unwrap();
        set.metadata.time_index = vec![1, 2, 4, 5];

        let report = FeatureValidator::default().validate(&set);
        let gaps: Vec<_> = report.errors_of(IssueKind::TimeGap).collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].occurrences, 1);
        // 4 values + 3 pairs + 1 type entry + 1 time index
        assert_eq!(report.total_checks, 9);
        assert_eq!(report.error_count, 1);
        assert!(!report.is_valid);
    }

    #[test]
    fn test_extreme_time_index_steps_are_gaps() {
        let mut set = EngineeredFeatureSet::new();
        set.insert("form", FeatureColumn::Temporal(vec![1.0, 1.0, 1.0])).unwrap();
        set.metadata.time_index = vec![i64::MIN, i64::MAX, i64::MIN];

        let report = FeatureValidator::default().validate(&set);
        let gaps: Vec<_> = report.errors_of(IssueKind::TimeGap).collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].occurrences, 2);
        assert_eq!(report.error_count, 2);
        assert!(!report.is_valid);
    }

    #[test]
    fn test_sudden_change_and_trend() {
        let mut values: Vec<f64> = vec![0.0; 20];
        values[10] = 100.0;
        let mut set = EngineeredFeatureSet::new();
        set.insert("spike", FeatureColumn::Temporal(values)).unwrap();
        set.insert("ramp", FeatureColumn::Temporal((0..20).map(|i| i as f64).collect())).unwrap();

        let report = FeatureValidator::default().validate(&set);
        assert_eq!(report.errors_of(IssueKind::SuddenChange).count(), 1);
        assert!(report.warnings_of(IssueKind::Trend).any(|w| w.feature == "ramp"));
    }

    #[test]
    fn test_invalid_scaling_params() {
        let mut set = points_set();
        set.metadata
            .scaling_params
            .insert("points".into(), ScalingParams { mean: f64::NAN, std: 1.0 });
        set.metadata
            .scaling_params
            .insert("rebounds".into(), ScalingParams { mean: 0.0, std: 0.0 });

        let report = FeatureValidator::default().validate(&set);
        assert_eq!(report.errors_of(IssueKind::InvalidScalingParams).count(), 2);
        assert_eq!(report.warnings_of(IssueKind::OrphanMetadata).count(), 1);
    }

    #[test]
    fn test_empty_set_is_valid() {
        let report = FeatureValidator::default().validate(&EngineeredFeatureSet::new());
        assert!(report.is_valid);
        assert_eq!(report.total_checks, 0);
    }

    proptest! {
        #[test]
        fn prop_error_ratio_decides_validity(
            columns in prop::collection::vec(prop::collection::vec(-100.0f64..100.0, 10..30), 1..5),
            seed in any::<u64>(),
        ) {
            let len = columns.iter().map(|c| c.len()).min().unwrap();
            let mut set = EngineeredFeatureSet::new();
            for (i, column) in columns.iter().enumerate() {
                set.insert(format!("f{}", i), FeatureColumn::Numerical(column[..len].to_vec())).unwrap();
            }
            let validator = FeatureValidator::default();
            prop_assert!(validator.validate(&set).is_valid);

            // Corrupt at least 10% of the values
            let total = set.len() * len;
            let corrupt = (total + 9) / 10;
            let mut broken = EngineeredFeatureSet::new();
            let mut k = 0;
            for (i, column) in columns.iter().enumerate() {
                let mut values = column[..len].to_vec();
                for (j, v) in values.iter_mut().enumerate() {
                    let slot = (i * len + j + (seed % total as u64) as usize) % total;
                    if slot < corrupt {
                        *v = f64::NAN;
                        k += 1;
                    }
                }
                broken.insert(format!("f{}", i), FeatureColumn::Numerical(values)).unwrap();
            }
            let report = validator.validate(&broken);
            prop_assert_eq!(report.error_count, k);
            prop_assert!(!report.is_valid);
        }
    }
}
