//! Threshold Alerts

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Minimum completeness (default: 0.95)
    pub min_completeness: f64,
    /// Minimum consistency (default: 0.90)
    pub min_consistency: f64,
    /// Minimum relevance (default: 0.50)
    pub min_relevance: f64,
    /// Minimum stability (default: 0.30)
    pub min_stability: f64,
    /// Maximum processing time per request in ms (default: 5000)
    pub max_processing_time_ms: f64,
    /// Maximum feature set footprint in bytes (default: 256 MiB)
    pub max_memory_bytes: usize,
    /// Maximum rolling error rate (default: 0.10)
    pub max_error_rate: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_completeness: 0.95,
            min_consistency: 0.90,
            min_relevance: 0.50,
            min_stability: 0.30,
            max_processing_time_ms: 5000.0,
            max_memory_bytes: 256 * 1024 * 1024,
            max_error_rate: 0.10,
        }
    }
}

/// A metric that crossed its threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

impl Alert {
    pub(crate) fn below(metric: &str, value: f64, threshold: f64) -> Option<Self> {
        (value < threshold).then(|| Self {
            metric: metric.to_string(),
            value,
            threshold,
        })
    }

    pub(crate) fn above(metric: &str, value: f64, threshold: f64) -> Option<Self> {
        (value > threshold).then(|| Self {
            metric: metric.to_string(),
            value,
            threshold,
        })
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {:.4} breaches threshold {:.4}",
            self.metric, self.value, self.threshold
        )
    }
}
