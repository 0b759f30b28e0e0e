use serde::Deserialize;

use super::parse_settings;
use crate::engine::{Metric, Output, Plugin, PluginError, PluginSettings};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Level {
    Debug,
    #[default]
    Info,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Settings {
    level: Level,
}

/// Writes every metric as one structured log event
#[derive(Debug, Default)]
pub struct LogOutput {
    level: Level,
}

impl LogOutput {
    pub const NAME: &'static str = "log";
}

impl Plugin for LogOutput {
    fn init(&mut self, settings: &PluginSettings) -> Result<(), PluginError> {
        let settings: Settings = parse_settings(settings)?;
        self.level = settings.level;
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        r#"{ "level": "info" }"#
    }

    fn description(&self) -> &'static str {
        "Write metrics to the agent log"
    }
}

impl Output for LogOutput {
    fn write(&self, metrics: &[Metric]) -> Result<(), PluginError> {
        for metric in metrics {
            let fields = serde_json::to_string(metric.fields())?;
            let tags = serde_json::to_string(metric.tags())?;
            match self.level {
                Level::Debug => tracing::debug!(
                    metric = %metric.name(),
                    metric_type = %metric.metric_type(),
                    fields = %fields,
                    tags = %tags,
                    timestamp = %metric.timestamp(),
                    "Metric"
                ),
                Level::Info => tracing::info!(
                    metric = %metric.name(),
                    metric_type = %metric.metric_type(),
                    fields = %fields,
                    tags = %tags,
                    timestamp = %metric.timestamp(),
                    "Metric"
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MetricType;

    #[test]
    fn test_level_setting() {
        let mut output = LogOutput::default();
        output
            .init(&serde_json::from_str(r#"{"level": "debug"}"#).unwrap())
            .unwrap();
        assert_eq!(output.level, Level::Debug);
    }

    #[test]
    fn test_bad_level_rejected() {
        let mut output = LogOutput::default();
        assert!(
            output
                .init(&serde_json::from_str(r#"{"level": "trace"}"#).unwrap())
                .is_err()
        );
    }

    #[test]
    fn test_write_succeeds() {
        let output = LogOutput::default();
        let metric = Metric::new("up", MetricType::Gauge).with_field("value", 1.0);
        assert!(output.write(&[metric]).is_ok());
    }
}
