//! Feature Engine Error Types

use feature_stats::StatsError;
use thiserror::Error;

/// Malformed threshold or limit in a component configuration
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid configuration for {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Violations of the feature set invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureSetError {
    /// Column length differs from the set's observation count
    #[error("Feature {feature} has {actual} observations, expected {expected}")]
    LengthMismatch {
        feature: String,
        expected: usize,
        actual: usize,
    },

    /// Feature name is empty
    #[error("Feature names must not be empty")]
    EmptyName,
}

/// Errors while turning raw records into features
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Not enough games in the log
    #[error("Need at least {required} games, got {actual}")]
    InsufficientGames { required: usize, actual: usize },

    /// Requested stat absent from a game record
    #[error("Stat {stat} missing from game {game_index}")]
    MissingStat { stat: String, game_index: usize },

    #[error(transparent)]
    FeatureSet(#[from] FeatureSetError),
}

/// Errors during feature selection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Errors during feature transformation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error(transparent)]
    FeatureSet(#[from] FeatureSetError),
}
