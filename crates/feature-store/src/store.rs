//! Versioned File Store
//!
//! One directory per version:
//!
//! ```text
//! <root>/<version>/
//!     numerical/<feature>.bin
//!     categorical/<feature>.bin
//!     temporal/<feature>.bin
//!     derived/<feature>.bin
//!     metadata.json
//!     version-info.json
//! ```
//!
//! Column files hold the postcard-encoded values; both manifests are JSON.

use crate::StoreError;
use chrono::{DateTime, Utc};
use feature_engine::{
    ConfigError, EngineeredFeatureSet, FeatureCategory, FeatureColumn, FeatureCounts, FeatureMetadata,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const METADATA_FILE: &str = "metadata.json";
const VERSION_INFO_FILE: &str = "version-info.json";
const COLUMN_EXT: &str = "bin";

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one subdirectory per version (default: ./feature-store)
    pub root_dir: PathBuf,
    /// Directory receiving timestamped backups (default: ./feature-store-backups)
    pub backup_dir: PathBuf,
    /// Whether `backup()` copies anything (default: true)
    pub backups_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./feature-store"),
            backup_dir: PathBuf::from("./feature-store-backups"),
            backups_enabled: true,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::new("store.root_dir", "must not be empty"));
        }
        if self.backups_enabled && self.backup_dir.as_os_str().is_empty() {
            return Err(ConfigError::new("store.backup_dir", "must not be empty when backups are enabled"));
        }
        if self.backup_dir.starts_with(&self.root_dir) {
            return Err(ConfigError::new(
                "store.backup_dir",
                format!("must not be inside root_dir {}", self.root_dir.display()),
            ));
        }
        Ok(())
    }
}

/// Summary of one persisted snapshot; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub feature_counts: FeatureCounts,
}

/// `metadata.json` contents
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    feature_names: BTreeSet<String>,
    feature_types: BTreeMap<String, FeatureCategory>,
    #[serde(flatten)]
    metadata: FeatureMetadata,
}

fn validate_version(version: &str) -> Result<(), StoreError> {
    let invalid = |reason| {
        Err(StoreError::InvalidVersion {
            version: version.to_string(),
            reason,
        })
    };
    if version.is_empty() {
        return invalid("empty");
    }
    if version.len() > 200 {
        return invalid("longer than 200 bytes");
    }
    if version.starts_with('.') {
        return invalid("starts with '.'");
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return invalid("only ASCII alphanumerics, '-', '_' and '.' are allowed");
    }
    Ok(())
}

fn validate_feature_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty()
        || name.starts_with('.')
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'))
    {
        return Err(StoreError::InvalidFeatureName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Hidden working directory removed on drop unless committed
struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Staging {
    fn new(path: PathBuf) -> Self {
        Self { path, committed: false }
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed staging directory {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staging directory {}: {}", self.path.display(), e),
        }
    }
}

/// File-backed feature store keyed by version string.
///
/// Assumes a single writer per version.
#[derive(Debug, Clone)]
pub struct FeatureStore {
    config: StoreConfig,
}

impl FeatureStore {
    /// Create a new store
    pub fn new(config: StoreConfig) -> Self {
        info!("Opening feature store at {}", config.root_dir.display());
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn version_dir(&self, version: &str) -> PathBuf {
        self.config.root_dir.join(version)
    }

    /// Persist a feature set under `version`, replacing any previous snapshot.
    ///
    /// Files are written to a hidden staging directory which is then renamed
    /// into place, so readers never observe a partial version. A replaced
    /// version is moved aside first and restored if the commit fails.
    pub async fn save(&self, features: &EngineeredFeatureSet, version: &str) -> Result<VersionInfo, StoreError> {
        validate_version(version)?;
        for (name, _) in features.columns() {
            validate_feature_name(name)?;
        }
        // JSON has no NaN or infinity
        if let Some((name, params)) = features
            .metadata
            .scaling_params
            .iter()
            .find(|(_, p)| !p.mean.is_finite() || !p.std.is_finite())
        {
            return Err(StoreError::Serialization {
                version: version.to_string(),
                reason: format!(
                    "non-finite scaling params for {} (mean {}, std {})",
                    name, params.mean, params.std
                ),
            });
        }

        let io = |op| StoreError::io(version, op);
        fs::create_dir_all(&self.config.root_dir)
            .await
            .map_err(io("create root"))?;

        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut staging = Staging::new(self.config.root_dir.join(format!(".tmp-{}-{}", version, nanos)));
        for category in FeatureCategory::ALL {
            fs::create_dir_all(staging.path.join(category.as_str()))
                .await
                .map_err(io("create staging"))?;
        }

        for (name, column) in features.columns() {
            let bytes = match column {
                FeatureColumn::Categorical(values) => postcard::to_allocvec(values),
                FeatureColumn::Numerical(values) | FeatureColumn::Temporal(values) | FeatureColumn::Derived(values) => {
                    postcard::to_allocvec(values)
                }
            }
            .map_err(|e| StoreError::Serialization {
                version: version.to_string(),
                reason: format!("{}: {}", name, e),
            })?;
            let path = staging
                .path
                .join(column.category().as_str())
                .join(format!("{}.{}", name, COLUMN_EXT));
            fs::write(&path, bytes).await.map_err(io("write column"))?;
        }

        let manifest = Manifest {
            feature_names: features.feature_names(),
            feature_types: features.feature_types(),
            metadata: features.metadata.clone(),
        };
        write_json(&staging.path.join(METADATA_FILE), &manifest, version).await?;

        let info = VersionInfo {
            version: version.to_string(),
            timestamp: Utc::now(),
            feature_counts: features.counts(),
        };
        write_json(&staging.path.join(VERSION_INFO_FILE), &info, version).await?;

        let target = self.version_dir(version);
        let retired = self.config.root_dir.join(format!(".old-{}-{}", version, nanos));
        let replacing = fs::try_exists(&target).await.map_err(io("stat version"))?;
        if replacing {
            fs::rename(&target, &retired).await.map_err(io("retire version"))?;
        }
        if let Err(e) = fs::rename(&staging.path, &target).await {
            if replacing {
                if let Err(restore) = fs::rename(&retired, &target).await {
                    warn!(
                        "Failed to restore version {} from {}: {}",
                        version,
                        retired.display(),
                        restore
                    );
                }
            }
            return Err(io("commit version")(e));
        }
        staging.committed = true;
        if replacing {
            if let Err(e) = fs::remove_dir_all(&retired).await {
                warn!("Failed to remove replaced copy {}: {}", retired.display(), e);
            }
        }

        info!(
            "Saved feature version {} ({} features)",
            version,
            info.feature_counts.total()
        );
        Ok(info)
    }

    /// Load a persisted feature set
    pub async fn load(&self, version: &str) -> Result<EngineeredFeatureSet, StoreError> {
        validate_version(version)?;
        let dir = self.version_dir(version);
        if !self.exists(version).await {
            return Err(StoreError::VersionNotFound(version.to_string()));
        }

        let manifest: Manifest = read_json(&dir.join(METADATA_FILE), version).await?;
        let corrupt = |reason: String| StoreError::Corrupt {
            version: version.to_string(),
            reason,
        };
        if manifest.feature_names.len() != manifest.feature_types.len()
            || !manifest.feature_types.keys().eq(manifest.feature_names.iter())
        {
            return Err(corrupt("feature names and types disagree".to_string()));
        }

        let mut columns = Vec::with_capacity(manifest.feature_types.len());
        for (name, category) in &manifest.feature_types {
            validate_feature_name(name)?;
            let path = dir
                .join(category.as_str())
                .join(format!("{}.{}", name, COLUMN_EXT));
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(corrupt(format!("missing column file for {}", name)));
                }
                Err(e) => return Err(StoreError::io(version, "read column")(e)),
            };
            let decode_err = |e: postcard::Error| corrupt(format!("{}: {}", name, e));
            let column = match category {
                FeatureCategory::Categorical => {
                    FeatureColumn::Categorical(postcard::from_bytes(&bytes).map_err(decode_err)?)
                }
                numeric => {
                    let values: Vec<f64> = postcard::from_bytes(&bytes).map_err(decode_err)?;
                    FeatureColumn::numeric(*numeric, values)
                        .ok_or_else(|| corrupt(format!("{} has no numeric category", name)))?
                }
            };
            columns.push((name.clone(), column));
        }

        let set = EngineeredFeatureSet::from_columns(columns, manifest.metadata)
            .map_err(|e| corrupt(e.to_string()))?;
        debug!("Loaded feature version {} ({} features)", version, set.len());
        Ok(set)
    }

    /// Whether a committed version exists
    pub async fn exists(&self, version: &str) -> bool {
        if validate_version(version).is_err() {
            return false;
        }
        fs::try_exists(self.version_dir(version).join(VERSION_INFO_FILE))
            .await
            .unwrap_or(false)
    }

    /// Read the version manifest
    pub async fn version_info(&self, version: &str) -> Result<VersionInfo, StoreError> {
        validate_version(version)?;
        if !self.exists(version).await {
            return Err(StoreError::VersionNotFound(version.to_string()));
        }
        read_json(&self.version_dir(version).join(VERSION_INFO_FILE), version).await
    }

    /// All committed versions, oldest first
    pub async fn list_versions(&self) -> Result<Vec<VersionInfo>, StoreError> {
        let mut entries = match fs::read_dir(&self.config.root_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io("*", "list versions")(e)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StoreError::io("*", "list versions"))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || validate_version(&name).is_err() {
                continue;
            }
            match self.version_info(&name).await {
                Ok(info) => versions.push(info),
                Err(e) => warn!("Skipping unreadable version {}: {}", name, e),
            }
        }

        versions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.version.cmp(&b.version))
        });
        Ok(versions)
    }

    /// Delete a version directory
    pub async fn delete_version(&self, version: &str) -> Result<(), StoreError> {
        validate_version(version)?;
        if !fs::try_exists(self.version_dir(version)).await.unwrap_or(false) {
            return Err(StoreError::VersionNotFound(version.to_string()));
        }
        fs::remove_dir_all(self.version_dir(version))
            .await
            .map_err(StoreError::io(version, "delete version"))?;
        info!("Deleted feature version {}", version);
        Ok(())
    }

    /// Keep the `max_versions` most recent versions, returning the deleted ones
    pub async fn cleanup_old_versions(&self, max_versions: usize) -> Result<Vec<String>, StoreError> {
        let versions = self.list_versions().await?;
        let excess = versions.len().saturating_sub(max_versions);

        let mut removed = Vec::with_capacity(excess);
        for info in versions.into_iter().take(excess) {
            self.delete_version(&info.version).await?;
            removed.push(info.version);
        }
        if !removed.is_empty() {
            info!("Cleaned up {} old feature versions", removed.len());
        }
        Ok(removed)
    }

    /// Copy the whole store into a timestamped backup directory.
    ///
    /// Returns `None` when backups are disabled.
    pub async fn backup(&self) -> Result<Option<PathBuf>, StoreError> {
        if !self.config.backups_enabled {
            debug!("Backups disabled, skipping");
            return Ok(None);
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let target = self.config.backup_dir.join(format!("backup-{}", stamp));

        if fs::try_exists(&self.config.root_dir).await.unwrap_or(false) {
            copy_dir(&self.config.root_dir, &target).await?;
        } else {
            fs::create_dir_all(&target)
                .await
                .map_err(StoreError::io("*", "backup"))?;
        }
        info!("Backed up feature store to {}", target.display());
        Ok(Some(target))
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T, version: &str) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
        version: version.to_string(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).await.map_err(StoreError::io(version, "write manifest"))
}

async fn read_json<T: DeserializeOwned>(path: &Path, version: &str) -> Result<T, StoreError> {
    let bytes = fs::read(path).await.map_err(StoreError::io(version, "read manifest"))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        version: version.to_string(),
        reason: format!("{}: {}", path.display(), e),
    })
}

/// Recursive directory copy, skipping hidden staging and retired directories
async fn copy_dir(from: &Path, to: &Path) -> Result<(), StoreError> {
    let io = |op| StoreError::io("*", op);
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst).await.map_err(io("backup"))?;
        let mut entries = fs::read_dir(&src).await.map_err(io("backup"))?;
        while let Some(entry) = entries.next_entry().await.map_err(io("backup"))? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await.map_err(io("backup"))?;
            if file_type.is_dir() {
                pending.push((entry.path(), dst.join(&name)));
            } else {
                fs::copy(entry.path(), dst.join(&name)).await.map_err(io("backup"))?;
            }
        }
    }
    Ok(())
}
