//! Validation Issue Types

use feature_engine::FeatureCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of problem found in a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// NaN numeric or empty categorical value
    MissingValue,
    /// Positive or negative infinity
    InfiniteValue,
    /// Single distinct value, or one distinct value per observation
    ConstantFeature,
    /// Values far from the rest of the column
    Outliers,
    /// Skewness or excess kurtosis beyond limits
    DistributionShape,
    /// Categorical values that are too rare
    Imbalanced,
    /// Jump of more than one unit in the time index
    TimeGap,
    /// Consecutive values differing by more than the sigma limit
    SuddenChange,
    /// Cyclical pattern found
    Seasonality,
    /// Linear trend found
    Trend,
    /// Scaling parameters with non-positive std or non-finite mean
    InvalidScalingParams,
    /// Metadata entry referring to no matching feature
    OrphanMetadata,
    /// Time index length differs from the observation count
    TimeIndexMismatch,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueKind::MissingValue => "missing value",
            IssueKind::InfiniteValue => "infinite value",
            IssueKind::ConstantFeature => "constant feature",
            IssueKind::Outliers => "outliers",
            IssueKind::DistributionShape => "distribution shape",
            IssueKind::Imbalanced => "imbalanced",
            IssueKind::TimeGap => "time gap",
            IssueKind::SuddenChange => "sudden change",
            IssueKind::Seasonality => "seasonality",
            IssueKind::Trend => "trend",
            IssueKind::InvalidScalingParams => "invalid scaling params",
            IssueKind::OrphanMetadata => "orphan metadata",
            IssueKind::TimeIndexMismatch => "time index mismatch",
        };
        f.write_str(name)
    }
}

/// One reported problem, aggregated per feature and kind
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{feature}: {kind} ({occurrences}x): {message}")]
pub struct ValidationIssue {
    /// Feature name, or `metadata` for set-level entries
    pub feature: String,
    /// Category of the feature, absent for metadata issues
    pub category: Option<FeatureCategory>,
    pub kind: IssueKind,
    /// Number of offending values or pairs
    pub occurrences: usize,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        feature: impl Into<String>,
        category: Option<FeatureCategory>,
        kind: IssueKind,
        occurrences: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            feature: feature.into(),
            category,
            kind,
            occurrences,
            message: message.into(),
        }
    }
}

/// Result of validating a feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the error ratio is within the configured threshold
    pub is_valid: bool,
    /// Defects counted towards the error ratio
    pub errors: Vec<ValidationIssue>,
    /// Informational findings that never affect validity
    pub warnings: Vec<ValidationIssue>,
    /// Number of failed checks
    pub error_count: usize,
    /// Number of checks performed
    pub total_checks: usize,
}

impl ValidationReport {
    /// Fraction of failed checks, `0` when nothing was checked
    pub fn error_ratio(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            self.error_count as f64 / self.total_checks as f64
        }
    }

    /// Warnings of one kind
    pub fn warnings_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    /// Errors of one kind
    pub fn errors_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}
