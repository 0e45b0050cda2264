//! Logging Setup

use crate::PipelineError;
use feature_engine::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG` (default: info)
    pub level: String,
    /// Emit JSON lines instead of human-readable text (default: false)
    pub json: bool,
    /// Include the event target in each line (default: true)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| ConfigError::new("logging.level", e.to_string()))
    }
}

/// Build the configured subscriber without installing it
fn subscriber(config: &LoggingConfig) -> Result<Box<dyn Subscriber + Send + Sync>, PipelineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PipelineError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);
    Ok(if config.json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    })
}

/// Install the global tracing subscriber.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), PipelineError> {
    subscriber(config)?
        .try_init()
        .map_err(|e| PipelineError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggingConfig {
            level: "feature_engine=verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(LoggingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_subscriber_scoped_to_caller() {
        for json in [false, true] {
            let config = LoggingConfig {
                level: "warn".to_string(),
                json,
                ..Default::default()
            };
            let subscriber = subscriber(&config).unwrap();
            tracing::subscriber::with_default(subscriber, || {
                tracing::warn!(json, "scoped subscriber");
                if std::env::var_os("RUST_LOG").is_none() {
                    assert!(tracing::enabled!(Level::WARN));
                    assert!(!tracing::enabled!(Level::INFO));
                }
            });
        }
    }
}
