//! Engineered Feature Set

use crate::error::FeatureSetError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Category a feature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureCategory {
    Numerical,
    Categorical,
    Temporal,
    Derived,
}

impl FeatureCategory {
    /// All categories in storage order
    pub const ALL: [FeatureCategory; 4] = [
        FeatureCategory::Numerical,
        FeatureCategory::Categorical,
        FeatureCategory::Temporal,
        FeatureCategory::Derived,
    ];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureCategory::Numerical => "numerical",
            FeatureCategory::Categorical => "categorical",
            FeatureCategory::Temporal => "temporal",
            FeatureCategory::Derived => "derived",
        }
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numerical" => Ok(FeatureCategory::Numerical),
            "categorical" => Ok(FeatureCategory::Categorical),
            "temporal" => Ok(FeatureCategory::Temporal),
            "derived" => Ok(FeatureCategory::Derived),
            other => Err(format!("unknown feature category: {}", other)),
        }
    }
}

/// Values of one feature, tagged with its category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "values", rename_all = "lowercase")]
pub enum FeatureColumn {
    Numerical(Vec<f64>),
    Categorical(Vec<String>),
    Temporal(Vec<f64>),
    Derived(Vec<f64>),
}

impl FeatureColumn {
    /// Build a numeric column of the given category.
    ///
    /// Returns `None` for [`FeatureCategory::Categorical`].
    pub fn numeric(category: FeatureCategory, values: Vec<f64>) -> Option<Self> {
        match category {
            FeatureCategory::Numerical => Some(FeatureColumn::Numerical(values)),
            FeatureCategory::Temporal => Some(FeatureColumn::Temporal(values)),
            FeatureCategory::Derived => Some(FeatureColumn::Derived(values)),
            FeatureCategory::Categorical => None,
        }
    }

    pub fn category(&self) -> FeatureCategory {
        match self {
            FeatureColumn::Numerical(_) => FeatureCategory::Numerical,
            FeatureColumn::Categorical(_) => FeatureCategory::Categorical,
            FeatureColumn::Temporal(_) => FeatureCategory::Temporal,
            FeatureColumn::Derived(_) => FeatureCategory::Derived,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FeatureColumn::Categorical(v) => v.len(),
            FeatureColumn::Numerical(v) | FeatureColumn::Temporal(v) | FeatureColumn::Derived(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric values, `None` for categorical columns
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            FeatureColumn::Numerical(v) | FeatureColumn::Temporal(v) | FeatureColumn::Derived(v) => {
                Some(v.as_slice())
            }
            FeatureColumn::Categorical(_) => None,
        }
    }

    /// Category labels, `None` for numeric columns
    pub fn as_categorical(&self) -> Option<&[String]> {
        match self {
            FeatureColumn::Categorical(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn estimated_bytes(&self) -> usize {
        match self {
            FeatureColumn::Categorical(v) => v
                .iter()
                .map(|s| s.capacity() + std::mem::size_of::<String>())
                .sum(),
            FeatureColumn::Numerical(v) | FeatureColumn::Temporal(v) | FeatureColumn::Derived(v) => {
                v.len() * std::mem::size_of::<f64>()
            }
        }
    }
}

/// Z-score parameters recorded for a normalized numerical feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingParams {
    pub mean: f64,
    pub std: f64,
}

impl ScalingParams {
    /// Map an original value to its z-score
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    /// Map a z-score back to the original scale
    pub fn denormalize(&self, z: f64) -> f64 {
        z * self.std + self.mean
    }

    /// `std > 0` and both parameters finite
    pub fn is_valid(&self) -> bool {
        self.std > 0.0 && self.std.is_finite() && self.mean.is_finite()
    }
}

/// Metadata carried alongside the feature columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    /// Z-score parameters per normalized numerical feature
    #[serde(default)]
    pub scaling_params: BTreeMap<String, ScalingParams>,
    /// Label-to-code maps per encoded categorical feature
    #[serde(default)]
    pub encoding_maps: BTreeMap<String, BTreeMap<String, i64>>,
    /// Last time the set was produced or registered
    pub last_updated: DateTime<Utc>,
    /// Underlying observation index (empty means positional)
    #[serde(default)]
    pub time_index: Vec<i64>,
}

impl Default for FeatureMetadata {
    fn default() -> Self {
        Self {
            scaling_params: BTreeMap::new(),
            encoding_maps: BTreeMap::new(),
            last_updated: Utc::now(),
            time_index: Vec::new(),
        }
    }
}

/// Number of features per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCounts {
    pub numerical: usize,
    pub categorical: usize,
    pub temporal: usize,
    pub derived: usize,
}

impl FeatureCounts {
    pub fn total(&self) -> usize {
        self.numerical + self.categorical + self.temporal + self.derived
    }

    pub fn get(&self, category: FeatureCategory) -> usize {
        match category {
            FeatureCategory::Numerical => self.numerical,
            FeatureCategory::Categorical => self.categorical,
            FeatureCategory::Temporal => self.temporal,
            FeatureCategory::Derived => self.derived,
        }
    }
}

/// Named, aligned feature columns for one entity
///
/// Every column has the same number of observations. A name maps to exactly
/// one column, and therefore to exactly one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineeredFeatureSet {
    columns: BTreeMap<String, FeatureColumn>,
    pub metadata: FeatureMetadata,
}

impl Default for EngineeredFeatureSet {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineeredFeatureSet {
    /// Create an empty feature set
    pub fn new() -> Self {
        Self::with_metadata(FeatureMetadata::default())
    }

    /// Create an empty feature set carrying existing metadata
    pub fn with_metadata(metadata: FeatureMetadata) -> Self {
        Self {
            columns: BTreeMap::new(),
            metadata,
        }
    }

    /// Assemble a set from columns, checking alignment
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, FeatureColumn)>,
        metadata: FeatureMetadata,
    ) -> Result<Self, FeatureSetError> {
        let mut set = Self::with_metadata(metadata);
        for (name, column) in columns {
            set.insert(name, column)?;
        }
        Ok(set)
    }

    /// Insert or replace a column.
    ///
    /// The column must match the observation count of the other columns.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        column: FeatureColumn,
    ) -> Result<Option<FeatureColumn>, FeatureSetError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FeatureSetError::EmptyName);
        }

        let expected = self
            .columns
            .iter()
            .find(|(other, _)| **other != name)
            .map(|(_, c)| c.len());
        if let Some(expected) = expected {
            if expected != column.len() {
                return Err(FeatureSetError::LengthMismatch {
                    feature: name,
                    expected,
                    actual: column.len(),
                });
            }
        }

        Ok(self.columns.insert(name, column))
    }

    /// Remove a column together with its scaling and encoding metadata
    pub fn remove(&mut self, name: &str) -> Option<FeatureColumn> {
        self.metadata.scaling_params.remove(name);
        self.metadata.encoding_maps.remove(name);
        self.columns.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Shared observation count, `None` for an empty set
    pub fn observation_count(&self) -> Option<usize> {
        self.columns.values().next().map(FeatureColumn::len)
    }

    /// All columns in name order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &FeatureColumn)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Consume the set into its columns and metadata
    pub fn into_parts(self) -> (BTreeMap<String, FeatureColumn>, FeatureMetadata) {
        (self.columns, self.metadata)
    }

    /// Numeric columns of one category
    pub fn numeric_columns(&self, category: FeatureCategory) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns
            .iter()
            .filter(move |(_, c)| c.category() == category)
            .filter_map(|(k, c)| c.as_numeric().map(|v| (k.as_str(), v)))
    }

    pub fn numerical(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.numeric_columns(FeatureCategory::Numerical)
    }

    pub fn temporal(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.numeric_columns(FeatureCategory::Temporal)
    }

    pub fn derived(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.numeric_columns(FeatureCategory::Derived)
    }

    pub fn categorical(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.columns
            .iter()
            .filter_map(|(k, c)| c.as_categorical().map(|v| (k.as_str(), v)))
    }

    /// Names of every feature
    pub fn feature_names(&self) -> BTreeSet<String> {
        self.columns.keys().cloned().collect()
    }

    /// Category of every feature
    pub fn feature_types(&self) -> BTreeMap<String, FeatureCategory> {
        self.columns
            .iter()
            .map(|(k, c)| (k.clone(), c.category()))
            .collect()
    }

    /// Names within one category
    pub fn names_in(&self, category: FeatureCategory) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.category() == category)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn counts(&self) -> FeatureCounts {
        let mut counts = FeatureCounts::default();
        for column in self.columns.values() {
            match column.category() {
                FeatureCategory::Numerical => counts.numerical += 1,
                FeatureCategory::Categorical => counts.categorical += 1,
                FeatureCategory::Temporal => counts.temporal += 1,
                FeatureCategory::Derived => counts.derived += 1,
            }
        }
        counts
    }

    /// New set holding only the named features and their metadata
    pub fn restricted_to(&self, names: &BTreeSet<String>) -> Self {
        let columns = self
            .columns
            .iter()
            .filter(|(k, _)| names.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut metadata = self.metadata.clone();
        metadata.scaling_params.retain(|k, _| names.contains(k));
        metadata.encoding_maps.retain(|k, _| names.contains(k));

        Self { columns, metadata }
    }

    /// Approximate heap footprint of the column data
    pub fn estimated_memory_bytes(&self) -> usize {
        self.columns
            .iter()
            .map(|(k, c)| k.len() + c.estimated_bytes())
            .sum::<usize>()
            + self.metadata.time_index.len() * std::mem::size_of::<i64>()
    }
}

/// Features kept by the selector, with their combined importance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelectionResult {
    pub numerical: BTreeSet<String>,
    pub categorical: BTreeSet<String>,
    pub temporal: BTreeSet<String>,
    pub derived: BTreeSet<String>,
    pub importance: BTreeMap<String, f64>,
}

impl FeatureSelectionResult {
    /// Selected names of one category
    pub fn category(&self, category: FeatureCategory) -> &BTreeSet<String> {
        match category {
            FeatureCategory::Numerical => &self.numerical,
            FeatureCategory::Categorical => &self.categorical,
            FeatureCategory::Temporal => &self.temporal,
            FeatureCategory::Derived => &self.derived,
        }
    }

    pub(crate) fn category_mut(&mut self, category: FeatureCategory) -> &mut BTreeSet<String> {
        match category {
            FeatureCategory::Numerical => &mut self.numerical,
            FeatureCategory::Categorical => &mut self.categorical,
            FeatureCategory::Temporal => &mut self.temporal,
            FeatureCategory::Derived => &mut self.derived,
        }
    }

    /// Union of all selected names
    pub fn all_names(&self) -> BTreeSet<String> {
        FeatureCategory::ALL
            .iter()
            .flat_map(|c| self.category(*c).iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        FeatureCategory::ALL.iter().map(|c| self.category(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Project a feature set onto the selected names
    pub fn apply(&self, set: &EngineeredFeatureSet) -> EngineeredFeatureSet {
        set.restricted_to(&self.all_names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EngineeredFeatureSet {
        let mut set = EngineeredFeatureSet::new();
        set.insert("points", FeatureColumn::Numerical(vec![10.0, 12.0, 11.0])).unwrap();
        set.insert(
            "venue",
            FeatureColumn::Categorical(vec!["home".into(), "away".into(), "home".into()]),
        )
        .unwrap();
        set.insert("points_ewma", FeatureColumn::Temporal(vec![10.0, 10.6, 10.7])).unwrap();
        set
    }

    #[test]
    fn test_category_views() {
        let set = sample();
        assert_eq!(set.numerical().count(), 1);
        assert_eq!(set.categorical().count(), 1);
        assert_eq!(set.temporal().count(), 1);
        assert_eq!(set.derived().count(), 0);
        assert_eq!(set.counts().total(), 3);
        assert_eq!(set.feature_types()["venue"], FeatureCategory::Categorical);
        assert_eq!(set.observation_count(), Some(3));
    }

    #[test]
    fn test_misaligned_column_rejected() {
        let mut set = sample();
        let err = set
            .insert("rebounds", FeatureColumn::Numerical(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, FeatureSetError::LengthMismatch { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn test_replacing_sole_column_may_change_length() {
        let mut set = EngineeredFeatureSet::new();
        set.insert("a", FeatureColumn::Derived(vec![1.0])).unwrap();
        assert!(set.insert("a", FeatureColumn::Derived(vec![1.0, 2.0])).is_ok());
    }

    #[test]
    fn test_name_has_single_category() {
        let mut set = sample();
        set.insert("points", FeatureColumn::Derived(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(set.feature_types()["points"], FeatureCategory::Derived);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_selection_apply_prunes_metadata() {
        let mut set = sample();
        set.metadata
            .scaling_params
            .insert("points".into(), ScalingParams { mean: 11.0, std: 1.0 });

        let mut selection = FeatureSelectionResult::default();
        selection.categorical.insert("venue".into());

        let projected = selection.apply(&set);
        assert_eq!(projected.feature_names().len(), 1);
        assert!(projected.metadata.scaling_params.is_empty());
    }

    #[test]
    fn test_scaling_round_trip() {
        let params = ScalingParams { mean: 13.0, std: 4.0 };
        let z = params.normalize(21.0);
        assert_eq!(z, 2.0);
        assert_eq!(params.denormalize(z), 21.0);
        assert!(!ScalingParams { mean: 0.0, std: 0.0 }.is_valid());
    }

    #[test]
    fn test_category_parse() {
        for category in FeatureCategory::ALL {
            assert_eq!(category.as_str().parse::<FeatureCategory>().unwrap(), category);
        }
        assert!("ordinal".parse::<FeatureCategory>().is_err());
    }
}
