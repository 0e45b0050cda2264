//! Feature Registry
//!
//! Version index over the store with an in-memory mirror, replayed from the
//! store when opened.

use crate::cache::FeatureCache;
use crate::store::{FeatureStore, VersionInfo};
use crate::StoreError;
use chrono::Utc;
use feature_engine::EngineeredFeatureSet;
use feature_stats::{best_period, value_counts, LinearFit, Seasonality, Summary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Summary of a numerical or derived column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub missing: usize,
}

impl From<&Summary> for ColumnStats {
    fn from(summary: &Summary) -> Self {
        Self {
            mean: summary.mean,
            std: summary.std_dev,
            min: summary.min,
            max: summary.max,
            missing: summary.missing,
        }
    }
}

/// Trend and cycle of a temporal column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalStats {
    /// Least-squares slope per observation
    pub trend: f64,
    pub seasonality: Option<Seasonality>,
    pub has_seasonality: bool,
}

/// Per-category statistics of a registered version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub version: String,
    pub numerical: BTreeMap<String, ColumnStats>,
    pub derived: BTreeMap<String, ColumnStats>,
    /// Value counts per categorical feature
    pub categorical: BTreeMap<String, BTreeMap<String, usize>>,
    pub temporal: BTreeMap<String, TemporalStats>,
}

impl FeatureStats {
    fn compute(version: &str, set: &EngineeredFeatureSet) -> Self {
        let column_stats = |values: &[f64]| ColumnStats::from(&Summary::compute(values));
        Self {
            version: version.to_string(),
            numerical: set
                .numerical()
                .map(|(name, values)| (name.to_string(), column_stats(values)))
                .collect(),
            derived: set
                .derived()
                .map(|(name, values)| (name.to_string(), column_stats(values)))
                .collect(),
            categorical: set
                .categorical()
                .map(|(name, values)| {
                    let counts = value_counts(values)
                        .into_iter()
                        .map(|(value, count)| (value.to_string(), count))
                        .collect();
                    (name.to_string(), counts)
                })
                .collect(),
            temporal: set
                .temporal()
                .map(|(name, values)| {
                    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
                    let seasonality = best_period(&finite);
                    let stats = TemporalStats {
                        trend: LinearFit::over_index(&finite).map_or(0.0, |fit| fit.slope),
                        has_seasonality: seasonality.is_some_and(|s| s.is_seasonal()),
                        seasonality,
                    };
                    (name.to_string(), stats)
                })
                .collect(),
        }
    }
}

/// Structural preconditions for registration
fn check_structure(features: &EngineeredFeatureSet, version: &str) -> Result<(), StoreError> {
    let reject = |reason: String| {
        Err(StoreError::Registration {
            version: version.to_string(),
            reason,
        })
    };
    let metadata = &features.metadata;
    if let Some(name) = metadata.scaling_params.keys().find(|k| !features.contains(k)) {
        return reject(format!("scaling parameters for unknown feature {}", name));
    }
    if let Some(name) = metadata.encoding_maps.keys().find(|k| !features.contains(k)) {
        return reject(format!("encoding map for unknown feature {}", name));
    }
    if !metadata.time_index.is_empty() && features.observation_count() != Some(metadata.time_index.len()) {
        return reject(format!(
            "time index has {} entries but features have {:?} observations",
            metadata.time_index.len(),
            features.observation_count()
        ));
    }
    Ok(())
}

/// Registered feature versions backed by the store
pub struct FeatureRegistry {
    store: FeatureStore,
    cache: Arc<FeatureCache>,
    mirror: RwLock<BTreeMap<String, Arc<EngineeredFeatureSet>>>,
}

impl FeatureRegistry {
    /// Open the registry, loading every readable version into the mirror
    pub async fn open(store: FeatureStore, cache: Arc<FeatureCache>) -> Result<Self, StoreError> {
        let mut mirror = BTreeMap::new();
        for info in store.list_versions().await? {
            match store.load(&info.version).await {
                Ok(set) => {
                    mirror.insert(info.version, Arc::new(set));
                }
                Err(e) => warn!("Skipping version {} during replay: {}", info.version, e),
            }
        }
        info!("Feature registry opened with {} versions", mirror.len());

        Ok(Self {
            store,
            cache,
            mirror: RwLock::new(mirror),
        })
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    /// Persist a feature set under a new version
    pub async fn register_features(
        &self,
        mut features: EngineeredFeatureSet,
        version: &str,
    ) -> Result<VersionInfo, StoreError> {
        check_structure(&features, version)?;
        features.metadata.last_updated = Utc::now();

        let info = self.store.save(&features, version).await?;
        let features = Arc::new(features);
        self.mirror
            .write()
            .await
            .insert(version.to_string(), Arc::clone(&features));
        self.cache.set(version, version, features).await;

        debug!("Registered feature version {}", version);
        Ok(info)
    }

    /// Fetch a version, from the mirror when possible
    pub async fn get_features(&self, version: &str) -> Result<Arc<EngineeredFeatureSet>, StoreError> {
        if let Some(features) = self.mirror.read().await.get(version) {
            return Ok(Arc::clone(features));
        }
        let features = Arc::new(self.store.load(version).await?);
        self.mirror
            .write()
            .await
            .insert(version.to_string(), Arc::clone(&features));
        Ok(features)
    }

    /// Per-category statistics of a version
    pub async fn get_feature_stats(&self, version: &str) -> Result<FeatureStats, StoreError> {
        let features = self.get_features(version).await?;
        Ok(FeatureStats::compute(version, &features))
    }

    pub async fn list_versions(&self) -> Result<Vec<VersionInfo>, StoreError> {
        self.store.list_versions().await
    }

    /// Delete a version everywhere
    pub async fn delete_version(&self, version: &str) -> Result<(), StoreError> {
        self.store.delete_version(version).await?;
        self.forget(version).await;
        Ok(())
    }

    /// Keep the `max_versions` most recent versions
    pub async fn cleanup_old_versions(&self, max_versions: usize) -> Result<Vec<String>, StoreError> {
        let removed = self.store.cleanup_old_versions(max_versions).await?;
        for version in &removed {
            self.forget(version).await;
        }
        Ok(removed)
    }

    async fn forget(&self, version: &str) {
        self.mirror.write().await.remove(version);
        self.cache.invalidate(version).await;
    }

    /// Number of mirrored versions
    pub async fn len(&self) -> usize {
        self.mirror.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::store::StoreConfig;
    use feature_engine::{FeatureColumn, ScalingParams};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FeatureStore {
        FeatureStore::new(StoreConfig {
            root_dir: dir.path().join("store"),
            backup_dir: dir.path().join("backups"),
            backups_enabled: false,
        })
    }

    fn cache() -> Arc<FeatureCache> {
        Arc::new(FeatureCache::new(CacheConfig::default()).unwrap())
    }

    fn sample() -> EngineeredFeatureSet {
        let mut set = EngineeredFeatureSet::new();
        set.insert("points", FeatureColumn::Numerical(vec![10.0, 12.0, 11.0, 30.0])).unwrap();
        set.insert(
            "venue",
            FeatureColumn::Categorical(vec!["home".into(), "away".into(), "home".into(), "home".into()]),
        )
        .unwrap();
        set.insert("form", FeatureColumn::Temporal(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        set.insert("momentum", FeatureColumn::Derived(vec![0.0, f64::NAN, 1.0, 2.0])).unwrap();
        set
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let dir = TempDir::new().unwrap();
        let cache = cache();
        let registry = FeatureRegistry::open(store(&dir), Arc::clone(&cache)).await.unwrap();

        let info = registry.register_features(sample(), "v1").await.unwrap();
        assert_eq!(info.feature_counts.total(), 4);
        assert!(cache.get("v1").await.is_some());

        let features = registry.get_features("v1").await.unwrap();
        assert_eq!(features.len(), 4);
        assert!(matches!(
            registry.get_features("v2").await,
            Err(StoreError::VersionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_replays_store() {
        let dir = TempDir::new().unwrap();
        {
            let registry = FeatureRegistry::open(store(&dir), cache()).await.unwrap();
            registry.register_features(sample(), "v1").await.unwrap();
            registry.register_features(sample(), "v2").await.unwrap();
        }

        let reopened = FeatureRegistry::open(store(&dir), cache()).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        let features = reopened.get_features("v2").await.unwrap();
        assert_eq!(features.counts().temporal, 1);
    }

    #[tokio::test]
    async fn test_structural_check() {
        let dir = TempDir::new().unwrap();
        let registry = FeatureRegistry::open(store(&dir), cache()).await.unwrap();

        let mut set = sample();
        set.metadata
            .scaling_params
            .insert("rebounds".into(), ScalingParams { mean: 0.0, std: 1.0 });
        assert!(matches!(
            registry.register_features(set, "v1").await,
            Err(StoreError::Registration { .. })
        ));

        let mut set = sample();
        set.metadata.time_index = vec![1, 2];
        assert!(registry.register_features(set, "v1").await.is_err());
        assert!(registry.list_versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feature_stats() {
        let dir = TempDir::new().unwrap();
        let registry = FeatureRegistry::open(store(&dir), cache()).await.unwrap();
        registry.register_features(sample(), "v1").await.unwrap();

        let stats = registry.get_feature_stats("v1").await.unwrap();
        let points = &stats.numerical["points"];
        assert!((points.mean - 15.75).abs() < 1e-12);
        assert_eq!((points.min, points.max), (10.0, 30.0));
        assert_eq!(stats.derived["momentum"].missing, 1);
        assert_eq!(stats.categorical["venue"]["home"], 3);
        assert!((stats.temporal["form"].trend - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_delete_and_cleanup_sync_mirror() {
        let dir = TempDir::new().unwrap();
        let cache = cache();
        let registry = FeatureRegistry::open(store(&dir), Arc::clone(&cache)).await.unwrap();
        for version in ["v1", "v2", "v3"] {
            registry.register_features(sample(), version).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        registry.delete_version("v3").await.unwrap();
        assert!(cache.get("v3").await.is_none());

        let removed = registry.cleanup_old_versions(1).await.unwrap();
        assert_eq!(removed, vec!["v1".to_string()]);
        assert_eq!(registry.len().await, 1);
        assert!(registry.get_features("v2").await.is_ok());
        assert!(registry.get_features("v1").await.is_err());
    }
}
