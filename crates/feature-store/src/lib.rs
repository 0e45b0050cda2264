//! Feature Storage Layer
//!
//! Versioned file-backed persistence, a bounded TTL cache and a registry
//! that keeps an in-memory mirror of the store.

mod cache;
mod registry;
mod store;

pub use cache::{CacheConfig, CacheEntry, CacheStats, FeatureCache};
pub use registry::{ColumnStats, FeatureRegistry, FeatureStats, TemporalStats};
pub use store::{FeatureStore, StoreConfig, VersionInfo};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: &'static str },

    #[error("Invalid feature name {name:?}")]
    InvalidFeatureName { name: String },

    #[error("I/O error during {operation} of version {version}: {source}")]
    Io {
        version: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error for version {version}: {reason}")]
    Serialization { version: String, reason: String },

    #[error("Version {version} is corrupt: {reason}")]
    Corrupt { version: String, reason: String },

    #[error("Cannot register version {version}: {reason}")]
    Registration { version: String, reason: String },
}

impl StoreError {
    pub(crate) fn io<'a>(version: &'a str, operation: &'static str) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| StoreError::Io {
            version: version.to_string(),
            operation,
            source,
        }
    }
}
