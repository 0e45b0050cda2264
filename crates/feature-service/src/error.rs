//! Pipeline Error Types

use feature_engine::{ConfigError, GenerationError, SelectionError, TransformError};
use feature_store::StoreError;
use feature_validator::ValidationIssue;
use std::fmt;
use thiserror::Error;

/// Pipeline stage that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generation,
    Selection,
    Transformation,
    Validation,
    Persistence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Generation => "generation",
            Stage::Selection => "selection",
            Stage::Transformation => "transformation",
            Stage::Validation => "validation",
            Stage::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// Cause of a stage failure
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Error ratio above the configured threshold
    #[error("{error_count} of {total_checks} validation checks failed")]
    ValidationFailed {
        error_count: usize,
        total_checks: usize,
        errors: Vec<ValidationIssue>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Blocking worker panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Errors surfaced by the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// First failing stage of a `generate_features` call
    #[error("Feature generation failed during {stage}: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Logging initialisation failed: {0}")]
    Logging(String),
}

impl PipelineError {
    pub(crate) fn stage(stage: Stage) -> impl FnOnce(StageError) -> Self {
        move |source| PipelineError::Generation { stage, source }
    }

    /// Failing stage, if the error came from a pipeline run
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Generation { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Configuration(e.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(e: config::ConfigError) -> Self {
        PipelineError::Configuration(e.to_string())
    }
}
