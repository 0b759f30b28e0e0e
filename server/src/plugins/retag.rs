use std::collections::BTreeMap;

use serde::Deserialize;

use super::parse_settings;
use crate::engine::{Metric, Plugin, PluginError, PluginSettings, Processor};

const SAMPLE_CONFIG: &str = r#"{
  "rename": { "instance": "host" },
  "add": { "env": "prod" },
  "remove": ["job"]
}"#;

/// Tag rewriting applied in order: rename, then add, then remove
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Retag {
    rename: BTreeMap<String, String>,
    add: BTreeMap<String, String>,
    remove: Vec<String>,
}

impl Retag {
    pub const NAME: &'static str = "retag";

    fn apply(&self, metric: &mut Metric) {
        for (from, to) in &self.rename {
            if let Some(value) = metric.remove_tag(from) {
                metric.add_tag(to.clone(), value);
            }
        }
        for (key, value) in &self.add {
            metric.add_tag(key.clone(), value.clone());
        }
        for key in &self.remove {
            metric.remove_tag(key);
        }
    }
}

impl Plugin for Retag {
    fn init(&mut self, settings: &PluginSettings) -> Result<(), PluginError> {
        *self = parse_settings(settings)?;
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }

    fn description(&self) -> &'static str {
        "Rename, add and remove metric tags"
    }
}

impl Processor for Retag {
    fn process(&self, mut metrics: Vec<Metric>) -> Result<Vec<Metric>, PluginError> {
        for metric in &mut metrics {
            self.apply(metric);
        }
        Ok(metrics)
    }
}
