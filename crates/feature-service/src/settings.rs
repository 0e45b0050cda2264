//! Pipeline Configuration
//!
//! Layered as built-in defaults, then an optional config file, then
//! `FEATURE_PIPELINE__<SECTION>__<FIELD>` environment variables.

use crate::logging::LoggingConfig;
use crate::PipelineError;
use config::{Config, Environment, File};
use feature_engine::{ConfigError, GenerationConfig, SelectionConfig, TransformConfig};
use feature_monitor::MonitorConfig;
use feature_store::{CacheConfig, StoreConfig};
use feature_validator::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const ENV_PREFIX: &str = "FEATURE_PIPELINE";
const ENV_SEPARATOR: &str = "__";

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub generation: GenerationConfig,
    pub selection: SelectionConfig,
    pub transform: TransformConfig,
    pub validation: ValidationConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
    /// Register every generated set in the store (default: false)
    pub persist_features: bool,
    /// Versions kept after each persisted run, 0 keeps all (default: 0)
    pub max_versions: usize,
}

impl PipelineConfig {
    /// Load defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            debug!("Loading pipeline configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        let environment = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env);

        let config: Self = builder.add_source(environment).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generation.validate()?;
        self.selection.validate()?;
        self.transform.validate()?;
        self.validation.validate()?;
        self.store.validate()?;
        self.cache.validate()?;
        self.monitor.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
