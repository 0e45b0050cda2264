//! Feature Pipeline - Main Entry Point
//!
//! Usage: `feature-pipeline <raw.json> <entity-id> <prop-type>`

use anyhow::{bail, Context};
use feature_engine::RawPlayerData;
use feature_service::{init_logging, FeatureEngineeringService, PipelineConfig};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

const CONFIG_ENV: &str = "FEATURE_PIPELINE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [raw_path, entity_id, prop_type] = args.as_slice() else {
        bail!("usage: feature-pipeline <raw.json> <entity-id> <prop-type>");
    };

    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.logging)?;

    info!("=== Feature Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let raw: RawPlayerData = {
        let text = tokio::fs::read_to_string(raw_path)
            .await
            .with_context(|| format!("reading {}", raw_path))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", raw_path))?
    };

    let service = FeatureEngineeringService::from_config(&config).await?;
    let features = service.generate_features(entity_id, prop_type, &raw).await?;

    let summary = json!({
        "entityId": entity_id,
        "propType": prop_type,
        "observations": features.observation_count().unwrap_or(0),
        "featureCounts": features.counts(),
        "featureTypes": features.feature_types(),
        "scalingParams": features.metadata.scaling_params,
        "monitoring": service.monitor().latest(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    service.monitor().stop();
    Ok(())
}
