//! Feature Transformation
//!
//! Per-column transforms. Every transform reads only the column it rewrites,
//! so names, categories and lengths are preserved.

use crate::error::{ConfigError, TransformError};
use crate::feature_set::{EngineeredFeatureSet, FeatureColumn, ScalingParams};
use feature_stats::{best_period_with_max_lag, mean, min_max, std_dev, LinearFit, MAX_SEASONAL_LAG};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Transformation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Shortest stem a suffix may be stripped down to (default: 2)
    pub stem_min_length: usize,
    /// Remove the seasonal component from temporal features (default: true)
    pub deseasonalize: bool,
    /// Minimum series length for seasonal adjustment (default: 4)
    pub min_seasonal_length: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            stem_min_length: 2,
            deseasonalize: true,
            min_seasonal_length: 4,
        }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stem_min_length == 0 {
            return Err(ConfigError::new("transform.stem_min_length", "must be positive"));
        }
        if self.min_seasonal_length < 2 {
            return Err(ConfigError::new("transform.min_seasonal_length", "must be at least 2"));
        }
        Ok(())
    }
}

/// Z-score normalize a column.
///
/// Returns `None` for columns without a positive, finite spread; those are
/// left unnormalized and get no scaling parameters.
pub fn z_score(values: &[f64]) -> Option<(Vec<f64>, ScalingParams)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let params = ScalingParams {
        mean: mean(&finite),
        std: std_dev(&finite),
    };
    if !params.is_valid() {
        return None;
    }
    Some((values.iter().map(|v| params.normalize(*v)).collect(), params))
}

/// Scale a column to [0, 1]; a constant column maps to zeros
pub fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    match min_max(&finite) {
        Some((lo, hi)) if hi > lo => values.iter().map(|v| (v - lo) / (hi - lo)).collect(),
        Some(_) => values.iter().map(|v| if v.is_finite() { 0.0 } else { *v }).collect(),
        None => values.to_vec(),
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Nonlinear blend of an already scaled value
pub fn blend(x: f64) -> f64 {
    0.3 * x.ln_1p() + 0.3 * x.sqrt() + 0.2 * x.cbrt() + 0.2 * sigmoid(x)
}

/// Lower-case, keep alphanumerics, strip one of `ing`, `ed`, `s`
pub fn stem(value: &str, min_length: usize) -> String {
    let cleaned: String = value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    for suffix in ["ing", "ed", "s"] {
        if let Some(root) = cleaned.strip_suffix(suffix) {
            if root.chars().count() >= min_length {
                return root.to_string();
            }
            // First matching suffix decides, even when too short to strip
            break;
        }
    }
    cleaned
}

/// Subtract the least-squares line fitted over the index
pub fn detrend(values: &[f64]) -> Vec<f64> {
    match LinearFit::over_index(values) {
        Ok(fit) => values
            .iter()
            .enumerate()
            .map(|(i, v)| v - fit.predict(i as f64))
            .collect(),
        Err(_) => values.to_vec(),
    }
}

/// Subtract the zero-mean seasonal pattern at the given period
pub fn deseasonalize(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || period >= values.len() {
        return values.to_vec();
    }
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, v) in values.iter().enumerate() {
        if v.is_finite() {
            sums[i % period] += v;
            counts[i % period] += 1;
        }
    }
    let pattern: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
        .collect();
    let center = mean(&pattern);
    values
        .iter()
        .enumerate()
        .map(|(i, v)| v - (pattern[i % period] - center))
        .collect()
}

/// Weighted mix of value, first difference, second difference and running sum
pub fn derive_dynamics(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut cumulative = 0.0;
    let mut prev_rate = 0.0;
    for (i, v) in values.iter().enumerate() {
        cumulative += v;
        let rate = if i >= 1 { v - values[i - 1] } else { 0.0 };
        let acceleration = if i >= 2 { rate - prev_rate } else { 0.0 };
        prev_rate = rate;
        out.push(0.4 * v + 0.3 * rate + 0.2 * acceleration + 0.1 * cumulative);
    }
    out
}

/// Normalizes and reshapes feature values
pub struct FeatureTransformer {
    config: TransformConfig,
}

impl FeatureTransformer {
    /// Create a new transformer
    pub fn new(config: TransformConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Transform every column, returning a new feature set
    pub fn transform(&self, set: &EngineeredFeatureSet) -> Result<EngineeredFeatureSet, TransformError> {
        let mut metadata = set.metadata.clone();
        let mut columns = Vec::with_capacity(set.len());

        for (name, column) in set.columns() {
            let transformed = match column {
                FeatureColumn::Numerical(values) => {
                    let normalized = match z_score(values) {
                        Some((z, params)) => {
                            metadata.scaling_params.insert(name.to_string(), params);
                            z
                        }
                        None => {
                            metadata.scaling_params.remove(name);
                            values.clone()
                        }
                    };
                    let blended = min_max_scale(&normalized).into_iter().map(blend).collect();
                    FeatureColumn::Numerical(blended)
                }
                FeatureColumn::Categorical(values) => {
                    let stems: Vec<String> = values
                        .iter()
                        .map(|v| stem(v, self.config.stem_min_length))
                        .collect();
                    let unique: BTreeSet<&String> = stems.iter().collect();
                    let encoding: BTreeMap<String, i64> = unique
                        .into_iter()
                        .enumerate()
                        .map(|(code, label)| (label.clone(), code as i64))
                        .collect();
                    metadata.encoding_maps.insert(name.to_string(), encoding);
                    FeatureColumn::Categorical(stems)
                }
                FeatureColumn::Temporal(values) => FeatureColumn::Temporal(self.adjust_temporal(values)),
                FeatureColumn::Derived(values) => FeatureColumn::Derived(derive_dynamics(values)),
            };
            columns.push((name.to_string(), transformed));
        }

        let out = EngineeredFeatureSet::from_columns(columns, metadata)?;
        debug!(
            "Transformed {} features ({} normalized)",
            out.len(),
            out.metadata.scaling_params.len()
        );
        Ok(out)
    }

    fn adjust_temporal(&self, values: &[f64]) -> Vec<f64> {
        let detrended = detrend(values);
        if !self.config.deseasonalize || detrended.len() < self.config.min_seasonal_length {
            return detrended;
        }
        let max_lag = MAX_SEASONAL_LAG.min(detrended.len() / 2);
        match best_period_with_max_lag(&detrended, max_lag) {
            Some(season) => deseasonalize(&detrended, season.period),
            None => detrended,
        }
    }
}

impl Default for FeatureTransformer {
    fn default() -> Self {
        Self {
            config: TransformConfig::default(),
        }
    }
}
