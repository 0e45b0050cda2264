//! Feature Engineering Service
//!
//! Orchestrates generation, selection, transformation, validation, caching,
//! persistence and monitoring of engineered feature sets.

mod error;
mod logging;
mod service;
mod settings;

pub use error::{PipelineError, Stage, StageError};
pub use logging::{init_logging, LoggingConfig};
pub use service::FeatureEngineeringService;
pub use settings::PipelineConfig;
