//! Feature Engineering Engine
//!
//! Feature set data model, generation of features from raw game records,
//! and the selection and transformation stages of the pipeline.

mod error;
mod feature_set;
mod generator;
mod selector;
mod transformer;

pub use error::{ConfigError, FeatureSetError, GenerationError, SelectionError, TransformError};
pub use feature_set::{
    EngineeredFeatureSet, FeatureCategory, FeatureColumn, FeatureCounts, FeatureMetadata,
    FeatureSelectionResult, ScalingParams,
};
pub use generator::{
    FeatureGenerator, GameRecord, GenerationConfig, InjuryReport, NewsItem, RawPlayerData, TeamStats,
};
pub use selector::{FeatureSelector, SelectionConfig};
pub use transformer::{
    blend, derive_dynamics, deseasonalize, detrend, min_max_scale, stem, z_score, FeatureTransformer,
    TransformConfig,
};
