//! Declarative module configuration
//!
//! A module is a named bundle of pipeline nodes. Each node names its schedule
//! and the plugins that make up its structure. Nothing here is validated
//! beyond shape; plugin existence and settings are checked at `init`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::plugin::PluginConfig;

/// Module lifecycle flag. `Inactive` means the module should not be running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ModuleStatus {
    #[default]
    #[serde(rename = "ACTIVE", alias = "active")]
    Active,
    #[serde(rename = "INACTIVE", alias = "inactive")]
    Inactive,
}

/// How a pipeline is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ScheduleStrategy {
    /// Push: an internal clock runs the pipeline every `period`
    #[serde(alias = "periodic", alias = "PERIODIC")]
    Periodic,
    /// Pull: an HTTP request on `expose_url` runs the pipeline
    #[serde(alias = "trigger", alias = "TRIGGER")]
    Trigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub schedule_strategy: ScheduleStrategy,
    /// Push period in milliseconds
    #[serde(default)]
    pub period: u64,
    #[serde(default)]
    pub expose_url: String,
}

impl PipelineConfig {
    pub fn periodic(period: Duration) -> Self {
        Self {
            schedule_strategy: ScheduleStrategy::Periodic,
            period: period.as_millis() as u64,
            expose_url: String::new(),
        }
    }

    pub fn trigger(expose_url: impl Into<String>) -> Self {
        Self {
            schedule_strategy: ScheduleStrategy::Trigger,
            period: 0,
            expose_url: expose_url.into(),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginNode {
    pub plugin_name: String,
    #[serde(default)]
    pub config: PluginConfig,
}

impl PluginNode {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            config: PluginConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PipelineStructure {
    #[serde(default)]
    pub inputs: Vec<PluginNode>,
    #[serde(default)]
    pub processors: Vec<PluginNode>,
    #[serde(default)]
    pub output: Option<PluginNode>,
    #[serde(default)]
    pub exporter: Option<PluginNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineNode {
    pub name: String,
    pub config: PipelineConfig,
    pub structure: PipelineStructure,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineModule {
    pub name: String,
    #[serde(default)]
    pub status: ModuleStatus,
    #[serde(default)]
    pub pipelines: Vec<PipelineNode>,
}

impl PipelineModule {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_active(&self) -> bool {
        self.status == ModuleStatus::Active
    }
}
