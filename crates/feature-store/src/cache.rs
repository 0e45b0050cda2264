//! Feature Set Cache
//!
//! Bounded in-memory cache with TTL expiry and a periodic sweep task.

use feature_engine::{ConfigError, EngineeredFeatureSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds (default: 3600)
    pub ttl_secs: u64,
    /// Maximum number of entries (default: 1000)
    pub max_size: usize,
    /// Seconds between background sweeps (default: 300)
    pub cleanup_interval_secs: u64,
    /// Whether the cache serves reads and accepts writes (default: true)
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_size: 1000,
            cleanup_interval_secs: 300,
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::new("cache.ttl_secs", "must be positive"));
        }
        if self.max_size == 0 {
            return Err(ConfigError::new("cache.max_size", "must be positive"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::new("cache.cleanup_interval_secs", "must be positive"));
        }
        Ok(())
    }
}

/// Cached snapshot; replaced on write, never mutated
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub features: Arc<EngineeredFeatureSet>,
    pub timestamp: Instant,
    pub version: String,
}

impl CacheEntry {
    /// Whether the entry is older than `ttl` at `now`
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.timestamp) > ttl
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    ttl: Duration,
    max_size: usize,
}

struct Inner {
    entries: RwLock<HashMap<String, CacheEntry>>,
    limits: Mutex<Limits>,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Inner {
    fn limits(&self) -> Limits {
        match self.limits.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Drop expired entries, then the oldest ones until within capacity
    async fn cleanup(&self) -> usize {
        let Limits { ttl, max_size } = self.limits();
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, entry| !entry.is_expired(now, ttl));

        if entries.len() > max_size {
            let mut by_age: Vec<(Instant, String)> = entries
                .iter()
                .map(|(key, entry)| (entry.timestamp, key.clone()))
                .collect();
            by_age.sort();
            let excess = entries.len() - max_size;
            for (_, key) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }

        let evicted = before - entries.len();
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!("Cache cleanup evicted {} entries", evicted);
        }
        evicted
    }
}

/// In-memory feature cache.
///
/// Returned snapshots are shared `Arc`s, so eviction never affects a caller
/// still holding one.
pub struct FeatureCache {
    inner: Arc<Inner>,
    interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FeatureCache {
    /// Create a new cache.
    ///
    /// The background sweep starts when called within a Tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                limits: Mutex::new(Limits {
                    ttl: Duration::from_secs(config.ttl_secs),
                    max_size: config.max_size,
                }),
                enabled: AtomicBool::new(config.enabled),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
            interval: Duration::from_secs(config.cleanup_interval_secs),
            sweeper: Mutex::new(None),
        };
        if config.enabled {
            cache.start_sweep();
        }
        Ok(cache)
    }

    fn start_sweep(&self) {
        let Ok(handle) = Handle::try_current() else {
            debug!("No runtime available, cache sweep not started");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.interval;
        let task = handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.cleanup().await;
            }
        });

        let mut sweeper = match self.sweeper.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = sweeper.replace(task) {
            previous.abort();
        }
    }

    fn stop_sweep(&self) {
        let mut sweeper = match self.sweeper.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = sweeper.take() {
            task.abort();
        }
    }

    /// Look up a cached feature set, evicting it when expired
    pub async fn get(&self, key: &str) -> Option<Arc<EngineeredFeatureSet>> {
        if !self.is_enabled() {
            return None;
        }
        let ttl = self.inner.limits().ttl;
        let now = Instant::now();

        let expired = {
            let entries = self.inner.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now, ttl) => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(&entry.features));
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.inner.entries.write().await;
            if entries.get(key).is_some_and(|e| e.is_expired(now, ttl)) {
                entries.remove(key);
                self.inner.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace an entry; ignored while the cache is disabled
    pub async fn set(&self, key: impl Into<String>, version: impl Into<String>, features: Arc<EngineeredFeatureSet>) {
        if !self.is_enabled() {
            return;
        }
        let over_capacity = {
            let mut entries = self.inner.entries.write().await;
            entries.insert(
                key.into(),
                CacheEntry {
                    features,
                    timestamp: Instant::now(),
                    version: version.into(),
                },
            );
            entries.len() > self.inner.limits().max_size
        };
        if over_capacity {
            self.inner.cleanup().await;
        }
    }

    /// Evict expired entries, then the oldest until within capacity
    pub async fn cleanup(&self) -> usize {
        self.inner.cleanup().await
    }

    /// Remove one entry
    pub async fn invalidate(&self, key: &str) -> bool {
        self.inner.entries.write().await.remove(key).is_some()
    }

    /// Remove every entry
    pub async fn clear(&self) {
        self.inner.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable the cache.
    ///
    /// Disabling stops the sweep and hides entries without dropping them.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::Relaxed);
        match (was, enabled) {
            (false, true) => {
                self.start_sweep();
                info!("Feature cache enabled");
            }
            (true, false) => {
                self.stop_sweep();
                info!("Feature cache disabled");
            }
            _ => {}
        }
    }

    /// Change the TTL and apply it immediately
    pub async fn set_ttl(&self, ttl: Duration) {
        self.update_limits(|l| l.ttl = ttl);
        self.inner.cleanup().await;
    }

    /// Change the capacity and apply it immediately
    pub async fn set_max_size(&self, max_size: usize) {
        self.update_limits(|l| l.max_size = max_size);
        self.inner.cleanup().await;
    }

    fn update_limits(&self, f: impl FnOnce(&mut Limits)) {
        let mut limits = match self.inner.limits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *limits);
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            entries: self.len().await,
        }
    }
}

impl Drop for FeatureCache {
    fn drop(&mut self) {
        self.stop_sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_engine::FeatureColumn;

    fn features(value: f64) -> Arc<EngineeredFeatureSet> {
        let mut set = EngineeredFeatureSet::new();
        set.insert("points", FeatureColumn::Numerical(vec![value])).unwrap();
        Arc::new(set)
    }

    fn config(ttl_secs: u64, max_size: usize) -> CacheConfig {
        CacheConfig {
            ttl_secs,
            max_size,
            cleanup_interval_secs: 60,
            enabled: true,
        }
    }

    #[test]
    fn test_entry_expiry() {
        let now = Instant::now() + Duration::from_secs(100);
        let ttl = Duration::from_secs(10);
        let entry = CacheEntry {
            features: features(1.0),
            timestamp: now - ttl - Duration::from_millis(1),
            version: "v1".into(),
        };
        assert!(entry.is_expired(now, ttl));
        let fresh = CacheEntry {
            timestamp: now - ttl,
            ..entry
        };
        assert!(!fresh.is_expired(now, ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_get_and_ttl() {
        let cache = FeatureCache::new(config(10, 10)).unwrap();
        let set = features(1.0);
        cache.set("player_points", "v1", Arc::clone(&set)).await;

        let hit = cache.get("player_points").await.unwrap();
        assert!(Arc::ptr_eq(&hit, &set));

        time::advance(Duration::from_secs(11)).await;
        assert!(cache.get("player_points").await.is_none());
        assert!(cache.is_empty().await);
        // Caller's snapshot survives eviction
        assert_eq!(hit.len(), 1);

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache = FeatureCache::new(config(3600, 2)).unwrap();
        cache.set("a", "v1", features(1.0)).await;
        time::advance(Duration::from_secs(1)).await;
        cache.set("b", "v2", features(2.0)).await;
        time::advance(Duration::from_secs(1)).await;
        cache.set("c", "v3", features(3.0)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep() {
        let cache = FeatureCache::new(CacheConfig {
            ttl_secs: 5,
            max_size: 10,
            cleanup_interval_secs: 10,
            enabled: true,
        })
        .unwrap();
        cache.set("a", "v1", features(1.0)).await;

        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_hides_but_keeps_entries() {
        let cache = FeatureCache::new(config(3600, 10)).unwrap();
        cache.set("a", "v1", features(1.0)).await;

        cache.set_enabled(false);
        assert!(cache.get("a").await.is_none());
        cache.set("b", "v2", features(2.0)).await;
        assert_eq!(cache.len().await, 1);

        cache.set_enabled(true);
        assert!(cache.get("a").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_changes_apply_immediately() {
        let cache = FeatureCache::new(config(3600, 10)).unwrap();
        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            cache.set(*key, "v", features(i as f64)).await;
            time::advance(Duration::from_secs(1)).await;
        }

        cache.set_max_size(1).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("c").await.is_some());

        time::advance(Duration::from_secs(5)).await;
        cache.set_ttl(Duration::from_secs(2)).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = FeatureCache::new(config(3600, 10)).unwrap();
        cache.set("a", "v1", features(1.0)).await;
        cache.set("b", "v2", features(2.0)).await;

        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_invalid_config() {
        assert!(FeatureCache::new(config(0, 10)).is_err());
        assert!(FeatureCache::new(config(10, 0)).is_err());
    }
}
