use chrono::Utc;
use serde::Deserialize;

use super::parse_settings;
use crate::engine::{Input, Metric, Plugin, PluginError, PluginSettings};

const SAMPLE_CONFIG: &str = r#"{
  "metrics": [
    { "name": "agent_up", "type": "gauge", "fields": { "value": 1 }, "tags": { "host": "local" } }
  ]
}"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Settings {
    metrics: Vec<Metric>,
}

/// Emits a fixed set of metrics on every collect, stamped with the collect time
#[derive(Debug, Default)]
pub struct StaticInput {
    metrics: Vec<Metric>,
}

impl StaticInput {
    pub const NAME: &'static str = "static";
}

impl Plugin for StaticInput {
    fn init(&mut self, settings: &PluginSettings) -> Result<(), PluginError> {
        let settings: Settings = parse_settings(settings)?;
        if let Some(unnamed) = settings.metrics.iter().position(|m| m.name().is_empty()) {
            return Err(format!("metrics[{}] has an empty name", unnamed).into());
        }
        self.metrics = settings.metrics;
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }

    fn description(&self) -> &'static str {
        "Emit a configured list of metrics"
    }
}

impl Input for StaticInput {
    fn collect(&self) -> Result<Vec<Metric>, PluginError> {
        let now = Utc::now();
        Ok(self
            .metrics
            .iter()
            .cloned()
            .map(|m| m.with_timestamp(now))
            .collect())
    }
}
