//! Feature Monitor Implementation

use crate::alerts::{Alert, AlertThresholds};
use crate::quality::{QualityMetrics, QualityParams};
use chrono::{DateTime, Utc};
use feature_engine::{ConfigError, EngineeredFeatureSet, FeatureCounts};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between periodic collections (default: 60)
    pub metrics_interval_secs: u64,
    /// Snapshots kept in history (default: 1000)
    pub max_metrics_history: usize,
    /// Outcomes in the rolling error rate window (default: 10)
    pub error_window: usize,
    /// Categorical cardinality above which consistency degrades (default: 50)
    pub expected_max_cardinality: usize,
    /// Standard deviations for numerical outliers (default: 3.0)
    pub outlier_sigma: f64,
    /// |slope| a temporal feature needs to count as relevant (default: 0.01)
    pub min_trend: f64,
    pub thresholds: AlertThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 60,
            max_metrics_history: 1000,
            error_window: 10,
            expected_max_cardinality: 50,
            outlier_sigma: 3.0,
            min_trend: 0.01,
            thresholds: AlertThresholds::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics_interval_secs == 0 {
            return Err(ConfigError::new("monitor.metrics_interval_secs", "must be positive"));
        }
        if self.max_metrics_history == 0 {
            return Err(ConfigError::new("monitor.max_metrics_history", "must be positive"));
        }
        if self.error_window == 0 {
            return Err(ConfigError::new("monitor.error_window", "must be positive"));
        }
        if self.expected_max_cardinality == 0 {
            return Err(ConfigError::new("monitor.expected_max_cardinality", "must be positive"));
        }
        if !(self.outlier_sigma > 0.0) {
            return Err(ConfigError::new("monitor.outlier_sigma", "must be positive"));
        }
        Ok(())
    }

    fn quality_params(&self) -> QualityParams {
        QualityParams {
            outlier_sigma: self.outlier_sigma,
            expected_max_cardinality: self.expected_max_cardinality,
            min_trend: self.min_trend,
        }
    }
}

/// Pipeline performance figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub processing_time_ms: f64,
    /// Estimated footprint of the monitored feature set
    pub memory_bytes: usize,
    /// Failed fraction of the recent pipeline outcomes
    pub error_rate: f64,
}

/// One point in the metrics history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub feature_counts: FeatureCounts,
    pub quality: QualityMetrics,
    pub performance: PerformanceMetrics,
}

#[derive(Default)]
struct MonitorState {
    history: VecDeque<MetricsSnapshot>,
    /// `true` marks a failed run
    outcomes: VecDeque<bool>,
    last: Option<(Arc<EngineeredFeatureSet>, f64)>,
}

struct Inner {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn push_outcome(&self, state: &mut MonitorState, failed: bool) {
        state.outcomes.push_back(failed);
        while state.outcomes.len() > self.config.error_window {
            state.outcomes.pop_front();
        }
    }

    fn snapshot(&self, state: &mut MonitorState, features: &EngineeredFeatureSet, processing_time_ms: f64) -> MetricsSnapshot {
        let failures = state.outcomes.iter().filter(|f| **f).count();
        let error_rate = if state.outcomes.is_empty() {
            0.0
        } else {
            failures as f64 / state.outcomes.len() as f64
        };

        let snapshot = MetricsSnapshot {
            timestamp: Utc::now(),
            feature_counts: features.counts(),
            quality: QualityMetrics::compute(features, self.config.quality_params()),
            performance: PerformanceMetrics {
                processing_time_ms,
                memory_bytes: features.estimated_memory_bytes(),
                error_rate,
            },
        };

        state.history.push_back(snapshot.clone());
        while state.history.len() > self.config.max_metrics_history {
            state.history.pop_front();
        }
        snapshot
    }

    /// Re-snapshot the last monitored set
    fn collect(&self) -> Option<MetricsSnapshot> {
        let mut state = self.state();
        let (features, processing_time_ms) = state.last.clone()?;
        let snapshot = self.snapshot(&mut state, &features, processing_time_ms);
        drop(state);
        publish(&snapshot);
        self.check_alerts(&snapshot);
        Some(snapshot)
    }

    fn check_alerts(&self, snapshot: &MetricsSnapshot) -> Vec<Alert> {
        let t = &self.config.thresholds;
        let q = &snapshot.quality;
        let p = &snapshot.performance;
        let alerts: Vec<Alert> = [
            Alert::below("completeness", q.completeness, t.min_completeness),
            Alert::below("consistency", q.consistency, t.min_consistency),
            Alert::below("relevance", q.relevance, t.min_relevance),
            Alert::below("stability", q.stability, t.min_stability),
            Alert::above("processing_time_ms", p.processing_time_ms, t.max_processing_time_ms),
            Alert::above("memory_bytes", p.memory_bytes as f64, t.max_memory_bytes as f64),
            Alert::above("error_rate", p.error_rate, t.max_error_rate),
        ]
        .into_iter()
        .flatten()
        .collect();

        for alert in &alerts {
            warn!("Feature monitor alert: {}", alert);
            counter!("feature_monitor_alerts_total", "metric" => alert.metric.clone()).increment(1);
        }
        alerts
    }
}

fn publish(snapshot: &MetricsSnapshot) {
    let q = &snapshot.quality;
    let p = &snapshot.performance;
    gauge!("feature_quality_completeness").set(q.completeness);
    gauge!("feature_quality_consistency").set(q.consistency);
    gauge!("feature_quality_relevance").set(q.relevance);
    gauge!("feature_quality_stability").set(q.stability);
    gauge!("feature_pipeline_processing_time_ms").set(p.processing_time_ms);
    gauge!("feature_pipeline_memory_bytes").set(p.memory_bytes as f64);
    gauge!("feature_pipeline_error_rate").set(p.error_rate);
    gauge!("feature_count").set(snapshot.feature_counts.total() as f64);
}

/// Tracks feature quality and pipeline performance
pub struct FeatureMonitor {
    inner: Arc<Inner>,
    collector: Mutex<Option<JoinHandle<()>>>,
}

impl FeatureMonitor {
    /// Create a new monitor
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "Creating feature monitor (interval {}s, history {})",
            config.metrics_interval_secs, config.max_metrics_history
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(MonitorState::default()),
            }),
            collector: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Record a successful pipeline run and snapshot its output
    pub fn monitor_features(&self, features: Arc<EngineeredFeatureSet>, processing_time_ms: f64) -> MetricsSnapshot {
        let snapshot = {
            let mut state = self.inner.state();
            self.inner.push_outcome(&mut state, false);
            let snapshot = self.inner.snapshot(&mut state, &features, processing_time_ms);
            state.last = Some((features, processing_time_ms));
            snapshot
        };
        debug!(
            "Monitored {} features in {:.1}ms",
            snapshot.feature_counts.total(),
            processing_time_ms
        );
        publish(&snapshot);
        snapshot
    }

    /// Record a failed pipeline run
    pub fn record_error(&self) {
        let mut state = self.inner.state();
        self.inner.push_outcome(&mut state, true);
        counter!("feature_pipeline_errors_total").increment(1);
    }

    /// Compare a snapshot against the thresholds, logging each breach
    pub fn check_alerts(&self, snapshot: &MetricsSnapshot) -> Vec<Alert> {
        self.inner.check_alerts(snapshot)
    }

    /// Snapshots oldest first
    pub fn history(&self) -> Vec<MetricsSnapshot> {
        self.inner.state().history.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.inner.state().history.back().cloned()
    }

    /// Start periodic collection; replaces a running collector
    pub fn start(&self) {
        let Ok(handle) = Handle::try_current() else {
            warn!("No runtime available, periodic monitoring not started");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = Duration::from_secs(self.inner.config.metrics_interval_secs);
        let task = handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.collect().is_none() {
                    debug!("Nothing monitored yet, skipping collection");
                }
            }
        });

        let mut collector = match self.collector.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = collector.replace(task) {
            previous.abort();
        }
        info!("Periodic feature monitoring started");
    }

    /// Stop periodic collection
    pub fn stop(&self) {
        let mut collector = match self.collector.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = collector.take() {
            task.abort();
            info!("Periodic feature monitoring stopped");
        }
    }
}

impl Drop for FeatureMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
