//! Feature Monitoring
//!
//! Tracks feature quality and pipeline performance over time and logs
//! threshold breaches. Alerts are observational and never block the pipeline.

mod alerts;
mod monitor;
mod quality;

pub use alerts::{Alert, AlertThresholds};
pub use monitor::{FeatureMonitor, MetricsSnapshot, MonitorConfig, PerformanceMetrics};
pub use quality::QualityMetrics;
