//! Feature Engineering Service
//!
//! Runs generation, selection, transformation and validation for one
//! (entity, prop type) request, then caches, optionally persists and
//! monitors the result.

use crate::error::{PipelineError, Stage, StageError};
use crate::settings::PipelineConfig;
use chrono::Utc;
use feature_engine::{EngineeredFeatureSet, FeatureGenerator, FeatureSelector, FeatureTransformer, RawPlayerData};
use feature_monitor::FeatureMonitor;
use feature_store::{FeatureCache, FeatureRegistry, FeatureStore};
use feature_validator::FeatureValidator;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

type InFlightMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Orchestrates the feature pipeline
pub struct FeatureEngineeringService {
    generator: FeatureGenerator,
    selector: Arc<FeatureSelector>,
    transformer: Arc<FeatureTransformer>,
    validator: FeatureValidator,
    cache: Arc<FeatureCache>,
    monitor: Arc<FeatureMonitor>,
    registry: Option<Arc<FeatureRegistry>>,
    max_versions: usize,
    /// One generation in flight per cache key
    in_flight: InFlightMap,
}

/// Claim on a per-key generation slot, released on drop so a cancelled
/// request does not leave its entry behind
struct InFlight<'a> {
    map: &'a InFlightMap,
    key: String,
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn claim(map: &'a InFlightMap, key: &str) -> Self {
        let mut in_flight = match map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = Arc::clone(in_flight.entry(key.to_string()).or_default());
        Self {
            map,
            key: key.to_string(),
            slot,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Only the map and this claim still hold the slot
        if Arc::strong_count(&self.slot) == 2 {
            in_flight.remove(&self.key);
        }
    }
}

impl FeatureEngineeringService {
    /// Create a service from its collaborators
    pub fn new(
        generator: FeatureGenerator,
        selector: FeatureSelector,
        transformer: FeatureTransformer,
        validator: FeatureValidator,
        cache: Arc<FeatureCache>,
        monitor: Arc<FeatureMonitor>,
    ) -> Self {
        Self {
            generator,
            selector: Arc::new(selector),
            transformer: Arc::new(transformer),
            validator,
            cache,
            monitor,
            registry: None,
            max_versions: 0,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Persist every generated set, keeping at most `max_versions` (0 keeps all)
    pub fn with_registry(mut self, registry: Arc<FeatureRegistry>, max_versions: usize) -> Self {
        self.registry = Some(registry);
        self.max_versions = max_versions;
        self
    }

    /// Build every component from configuration and start periodic monitoring
    pub async fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let cache = Arc::new(FeatureCache::new(config.cache.clone())?);
        let monitor = Arc::new(FeatureMonitor::new(config.monitor.clone())?);
        let mut service = Self::new(
            FeatureGenerator::new(config.generation.clone())?,
            FeatureSelector::new(config.selection.clone())?,
            FeatureTransformer::new(config.transform.clone())?,
            FeatureValidator::new(config.validation.clone())?,
            Arc::clone(&cache),
            Arc::clone(&monitor),
        );

        if config.persist_features {
            let store = FeatureStore::new(config.store.clone());
            let registry = FeatureRegistry::open(store, cache).await?;
            service = service.with_registry(Arc::new(registry), config.max_versions);
        }
        monitor.start();

        info!(
            "Feature engineering service ready (persistence {})",
            if service.registry.is_some() { "on" } else { "off" }
        );
        Ok(service)
    }

    pub fn cache(&self) -> &Arc<FeatureCache> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<FeatureMonitor> {
        &self.monitor
    }

    pub fn registry(&self) -> Option<&Arc<FeatureRegistry>> {
        self.registry.as_ref()
    }

    fn cache_key(entity_id: &str, prop_type: &str) -> String {
        format!("{}_{}", entity_id, prop_type)
    }

    /// Generate the engineered feature set for an entity and prop type.
    ///
    /// A cached set is returned as is until its TTL runs out.
    pub async fn generate_features(
        &self,
        entity_id: &str,
        prop_type: &str,
        raw: &RawPlayerData,
    ) -> Result<Arc<EngineeredFeatureSet>, PipelineError> {
        let key = Self::cache_key(entity_id, prop_type);
        if let Some(features) = self.cache.get(&key).await {
            debug!("Cache hit for {}", key);
            return Ok(features);
        }

        let claim = InFlight::claim(&self.in_flight, &key);
        let _guard = claim.slot.lock().await;
        // A concurrent request for the same key may have finished meanwhile
        let cached = self.cache.get(&key).await;
        match cached {
            Some(features) => Ok(features),
            None => self.run(&key, prop_type, raw).await,
        }
    }

    /// Drop the cached set of an entity and prop type
    pub async fn invalidate(&self, entity_id: &str, prop_type: &str) -> bool {
        self.cache.invalidate(&Self::cache_key(entity_id, prop_type)).await
    }

    async fn run(
        &self,
        key: &str,
        prop_type: &str,
        raw: &RawPlayerData,
    ) -> Result<Arc<EngineeredFeatureSet>, PipelineError> {
        let started = Instant::now();
        match self.pipeline(key, prop_type, raw).await {
            Ok(features) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.cache.set(key, key, Arc::clone(&features)).await;
                let snapshot = self.monitor.monitor_features(Arc::clone(&features), elapsed_ms);
                self.monitor.check_alerts(&snapshot);
                info!(
                    "Generated {} features for {} in {:.1}ms",
                    features.len(),
                    key,
                    elapsed_ms
                );
                Ok(features)
            }
            Err(e) => {
                self.monitor.record_error();
                warn!("Feature generation for {} failed: {}", key, e);
                Err(e)
            }
        }
    }

    async fn pipeline(
        &self,
        key: &str,
        prop_type: &str,
        raw: &RawPlayerData,
    ) -> Result<Arc<EngineeredFeatureSet>, PipelineError> {
        debug!("Generating features for {}", key);
        let generated = self
            .generator
            .generate(prop_type, raw)
            .map_err(StageError::from)
            .map_err(PipelineError::stage(Stage::Generation))?;

        let selector = Arc::clone(&self.selector);
        let transformer = Arc::clone(&self.transformer);
        let worker = tokio::task::spawn_blocking(move || -> Result<EngineeredFeatureSet, PipelineError> {
            let selection = selector
                .select(&generated)
                .map_err(StageError::from)
                .map_err(PipelineError::stage(Stage::Selection))?;
            debug!("Selected {} of {} features", selection.len(), generated.len());
            transformer
                .transform(&selection.apply(&generated))
                .map_err(StageError::from)
                .map_err(PipelineError::stage(Stage::Transformation))
        });
        let transformed = match worker.await {
            Ok(result) => result?,
            Err(e) => return Err(PipelineError::stage(Stage::Transformation)(StageError::Worker(e.to_string()))),
        };

        let report = self.validator.validate(&transformed);
        if !report.is_valid {
            return Err(PipelineError::stage(Stage::Validation)(StageError::ValidationFailed {
                error_count: report.error_count,
                total_checks: report.total_checks,
                errors: report.errors,
            }));
        }
        for warning in &report.warnings {
            debug!("Validation warning for {}: {}", key, warning);
        }

        match &self.registry {
            Some(registry) => self.persist(registry, key, transformed).await,
            None => Ok(Arc::new(transformed)),
        }
    }

    async fn persist(
        &self,
        registry: &FeatureRegistry,
        key: &str,
        features: EngineeredFeatureSet,
    ) -> Result<Arc<EngineeredFeatureSet>, PipelineError> {
        let version = version_name(key);
        registry
            .register_features(features, &version)
            .await
            .map_err(StageError::from)
            .map_err(PipelineError::stage(Stage::Persistence))?;
        if self.max_versions > 0 {
            let removed = registry
                .cleanup_old_versions(self.max_versions)
                .await
                .map_err(StageError::from)
                .map_err(PipelineError::stage(Stage::Persistence))?;
            if !removed.is_empty() {
                debug!("Retired {} old feature versions", removed.len());
            }
        }
        // The registry stamps last_updated on the stored copy
        registry
            .get_features(&version)
            .await
            .map_err(StageError::from)
            .map_err(PipelineError::stage(Stage::Persistence))
    }
}

/// Store version for a cache key, restricted to the store's name alphabet
fn version_name(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}", stem, Utc::now().format("%Y%m%dT%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_engine::{GenerationConfig, SelectionConfig, TransformConfig};
    use feature_monitor::MonitorConfig;
    use feature_store::{CacheConfig, StoreConfig};
    use feature_validator::{IssueKind, ValidationConfig};
    use chrono::{Duration, NaiveDate};
    use serde_json::json;

    const GAMES: usize = 60;

    /// A season of smoothly varying box scores, every other day
    fn raw_with(game_number: impl Fn(usize) -> i64) -> RawPlayerData {
        let opponents = ["Lakers", "Celtics", "Nets", "Heat", "Bulls"];
        let opener = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let games: Vec<_> = (0..GAMES)
            .map(|i| {
                let t = i as f64;
                json!({
                    "date": (opener + Duration::days(2 * i as i64)).format("%Y-%m-%d").to_string(),
                    "isHome": i % 2 == 0,
                    "opponent": opponents[i % opponents.len()],
                    "gameNumber": game_number(i),
                    "points": 20.0 + 6.0 * (0.35 * t).sin() + 0.05 * t,
                    "rebounds": 6.0 + 2.0 * (0.5 * t).cos(),
                    "assists": 4.0 + (0.8 * t).sin() + 0.02 * t,
                })
            })
            .collect();
        serde_json::from_value(json!({
            "gameLog": games,
            "team": { "possessions": 5000.0, "points": 5600.0, "pointsAllowed": 5400.0, "games": 50 },
            "opponents": {
                "Lakers": { "possessions": 5000.0, "points": 5500.0, "pointsAllowed": 5550.0, "games": 50 }
            }
        }))
        .unwrap()
    }

    fn raw() -> RawPlayerData {
        raw_with(|i| i as i64 + 1)
    }

    fn service() -> FeatureEngineeringService {
        FeatureEngineeringService::new(
            FeatureGenerator::new(GenerationConfig::default()).unwrap(),
            FeatureSelector::new(SelectionConfig::default()).unwrap(),
            FeatureTransformer::new(TransformConfig::default()).unwrap(),
            FeatureValidator::new(ValidationConfig::default()).unwrap(),
            Arc::new(FeatureCache::new(CacheConfig::default()).unwrap()),
            Arc::new(FeatureMonitor::new(MonitorConfig::default()).unwrap()),
        )
    }

    fn in_flight_len(service: &FeatureEngineeringService) -> usize {
        service.in_flight.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_generates_and_monitors() {
        let service = service();
        let features = service.generate_features("player-1", "points", &raw()).await.unwrap();

        assert!(!features.is_empty());
        assert_eq!(features.observation_count(), Some(GAMES));
        assert!(features.len() <= SelectionConfig::default().max_features);
        for (name, _) in features.numerical() {
            assert!(features.metadata.scaling_params[name].is_valid());
        }

        let snapshot = service.monitor().latest().unwrap();
        assert_eq!(snapshot.feature_counts, features.counts());
        assert_eq!(snapshot.performance.error_rate, 0.0);
        assert_eq!(in_flight_len(&service), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_returns_same_snapshot() {
        let service = service();
        let first = service.generate_features("player-1", "points", &raw()).await.unwrap();
        let second = service.generate_features("player-1", "points", &raw()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(service.monitor().history().len(), 1);
        assert!(service.cache().get("player-1_points").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_forces_regeneration() {
        let service = service();
        let first = service.generate_features("player-1", "points", &raw()).await.unwrap();
        assert!(service.invalidate("player-1", "points").await);
        assert!(!service.invalidate("player-1", "points").await);

        let second = service.generate_features("player-1", "points", &raw()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.feature_names(), second.feature_names());
        assert_eq!(service.monitor().history().len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_is_wrapped_and_counted() {
        let service = service();
        let mut data = raw();
        data.game_log.truncate(2);

        let err = service.generate_features("player-1", "points", &data).await.unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Generation));
        assert!(service.cache().is_empty().await);

        service.generate_features("player-1", "points", &raw()).await.unwrap();
        let snapshot = service.monitor().latest().unwrap();
        assert!((snapshot.performance.error_rate - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_time_gaps_fail_validation() {
        let service = service();
        // Every step skips a game
        let data = raw_with(|i| 2 * i as i64 + 1);
        let err = service.generate_features("player-1", "points", &data).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::Validation));
        match err {
            PipelineError::Generation {
                source: StageError::ValidationFailed { errors, error_count, total_checks },
                ..
            } => {
                let tolerated = 1.0 - ValidationConfig::default().validation_threshold;
                assert!(error_count as f64 / total_checks as f64 > tolerated);
                assert!(errors.iter().any(|e| e.kind == IssueKind::TimeGap));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(service.monitor().latest().is_none());
    }

    #[tokio::test]
    async fn test_single_time_gap_within_tolerance() {
        let service = service();
        // One skipped game halfway through the season
        let data = raw_with(|i| if i < GAMES / 2 { i as i64 + 1 } else { i as i64 + 2 });
        let features = service.generate_features("player-1", "points", &data).await.unwrap();

        let time_index = &features.metadata.time_index;
        assert_eq!(time_index.windows(2).filter(|w| w[1] - w[0] > 1).count(), 1);
        assert!(features.temporal().next().is_some());
        assert_eq!(service.monitor().latest().unwrap().performance.error_rate, 0.0);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_its_slot() {
        let service = Arc::new(service());
        let held = InFlight::claim(&service.in_flight, "player-1_points");
        let lock = held.slot.lock().await;

        let waiting = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.generate_features("player-1", "points", &raw()).await })
        };
        // Let the request queue up behind the held slot
        tokio::task::yield_now().await;
        assert_eq!(Arc::strong_count(&held.slot), 3);

        drop(lock);
        drop(held);
        assert_eq!(in_flight_len(&service), 1);

        waiting.abort();
        assert!(waiting.await.unwrap_err().is_cancelled());
        assert_eq!(in_flight_len(&service), 0);
        assert!(service.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_persists_through_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(StoreConfig {
            root_dir: dir.path().join("store"),
            backup_dir: dir.path().join("backups"),
            backups_enabled: false,
        });
        let service = service();
        let registry = FeatureRegistry::open(store, Arc::clone(service.cache())).await.unwrap();
        let service = service.with_registry(Arc::new(registry), 0);

        let features = service.generate_features("player 1", "points", &raw()).await.unwrap();
        let registry = service.registry().unwrap();
        let versions = registry.list_versions().await.unwrap();

        assert_eq!(versions.len(), 1);
        assert!(versions[0].version.starts_with("player_1_points-"));
        assert_eq!(versions[0].feature_counts, features.counts());
        let stored = registry.store().load(&versions[0].version).await.unwrap();
        assert_eq!(stored.feature_names(), features.feature_names());
    }

    #[tokio::test]
    async fn test_from_config_wires_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.persist_features = true;
        config.store.root_dir = dir.path().join("store");

        let service = FeatureEngineeringService::from_config(&config).await.unwrap();
        assert!(service.registry().is_some());
        service.generate_features("player-1", "points", &raw()).await.unwrap();
        assert_eq!(service.registry().unwrap().len().await, 1);
    }
}
