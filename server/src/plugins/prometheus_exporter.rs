//! Prometheus text exposition (format 0.0.4)
//!
//! Each metric field becomes one sample. The field `value` maps to the bare
//! metric name, any other field to `<name>_<field>`. Samples are grouped into
//! one `MetricFamily` per series name and rendered by prometheus'
//! `TextEncoder`.

use std::collections::HashMap;

use prometheus::proto::{self, LabelPair, MetricFamily};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;

use super::parse_settings;
use crate::engine::{Exporter, Metric, MetricType, Plugin, PluginError, PluginSettings};

const VALUE_FIELD: &str = "value";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Settings {
    prefix: String,
    timestamps: bool,
}

#[derive(Debug, Default)]
pub struct PrometheusExporter {
    prefix: String,
    timestamps: bool,
}

impl PrometheusExporter {
    pub const NAME: &'static str = "prometheus";

    fn series_name(&self, metric: &str, field: &str) -> String {
        let mut name = String::new();
        if !self.prefix.is_empty() {
            name.push_str(&self.prefix);
            name.push('_');
        }
        name.push_str(metric);
        if field != VALUE_FIELD {
            name.push('_');
            name.push_str(field);
        }
        sanitize_name(&name, true)
    }

    fn sample(&self, metric: &Metric, kind: proto::MetricType, value: f64) -> proto::Metric {
        let labels = metric
            .tags()
            .iter()
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(sanitize_name(name, false));
                pair.set_value(value.clone());
                pair
            })
            .collect();

        let mut sample = proto::Metric::from_label(labels);
        if kind == proto::MetricType::COUNTER {
            let mut counter = proto::Counter::default();
            counter.set_value(value);
            sample.set_counter(counter);
        } else {
            let mut gauge = proto::Gauge::default();
            gauge.set_value(value);
            sample.set_gauge(gauge);
        }
        if self.timestamps {
            sample.set_timestamp_ms(metric.timestamp().timestamp_millis());
        }
        sample
    }
}

impl Plugin for PrometheusExporter {
    fn init(&mut self, settings: &PluginSettings) -> Result<(), PluginError> {
        let settings: Settings = parse_settings(settings)?;
        self.prefix = settings.prefix;
        self.timestamps = settings.timestamps;
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        r#"{ "prefix": "", "timestamps": false }"#
    }

    fn description(&self) -> &'static str {
        "Render metrics in Prometheus text format"
    }
}

impl Exporter for PrometheusExporter {
    fn export(&self, metrics: &[Metric]) -> Result<Vec<u8>, PluginError> {
        let mut families: Vec<MetricFamily> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for metric in metrics {
            for (field, value) in metric.fields() {
                let name = self.series_name(metric.name(), field);
                let slot = *index.entry(name.clone()).or_insert_with(|| {
                    let mut family = MetricFamily::default();
                    family.set_name(name);
                    family.set_field_type(family_kind(metric.metric_type()));
                    families.push(family);
                    families.len() - 1
                });

                let family = &mut families[slot];
                let sample = self.sample(metric, family.get_field_type(), *value);
                family.mut_metric().push(sample);
            }
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }
}

// Buckets and quantiles are not modelled and the encoder has no untyped
// output, so everything but counters is exposed as a gauge
fn family_kind(metric_type: MetricType) -> proto::MetricType {
    match metric_type {
        MetricType::Counter => proto::MetricType::COUNTER,
        MetricType::Gauge | MetricType::Untyped | MetricType::Summary | MetricType::Histogram => {
            proto::MetricType::GAUGE
        }
    }
}

/// Map a metric or label name onto the exposition name charset. Colons are
/// only valid in metric names.
fn sanitize_name(name: &str, allow_colon: bool) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export(exporter: &PrometheusExporter, metrics: &[Metric]) -> String {
        String::from_utf8(exporter.export(metrics).unwrap()).unwrap()
    }

    #[test]
    fn test_value_field_uses_bare_name() {
        let exporter = PrometheusExporter::default();
        let metric = Metric::new("mysql_up", MetricType::Gauge)
            .with_field("value", 1.0)
            .with_tag("instance", "db-1");

        assert_eq!(
            export(&exporter, &[metric]),
            "# TYPE mysql_up gauge\nmysql_up{instance=\"db-1\"} 1\n"
        );
    }

    #[test]
    fn test_family_grouping() {
        let exporter = PrometheusExporter::default();
        let a = Metric::new("req", MetricType::Counter)
            .with_field("total", 3.0)
            .with_tag("code", "200");
        let b = Metric::new("req", MetricType::Counter)
            .with_field("total", 1.0)
            .with_tag("code", "500");

        let text = export(&exporter, &[a, b]);
        assert_eq!(text.matches("# TYPE req_total counter").count(), 1);
        assert!(text.contains("req_total{code=\"200\"} 3\n"));
        assert!(text.contains("req_total{code=\"500\"} 1\n"));
    }

    #[test]
    fn test_prefix_and_sanitize() {
        let mut exporter = PrometheusExporter::default();
        exporter
            .init(&serde_json::from_str(r#"{"prefix": "agent"}"#).unwrap())
            .unwrap();
        let metric = Metric::new("disk.used", MetricType::Gauge)
            .with_field("value", 0.5)
            .with_tag("mount-point", "/\"data\"");

        let text = export(&exporter, &[metric]);
        assert!(text.contains("agent_disk_used{mount_point=\"/\\\"data\\\"\"} 0.5\n"));
        assert_eq!(sanitize_name("1up", true), "_1up");
        assert_eq!(sanitize_name("a:b", false), "a_b");
    }

    #[test]
    fn test_untyped_kinds_render_as_gauge() {
        let exporter = PrometheusExporter::default();
        let metrics = [
            Metric::new("plain", MetricType::Untyped).with_field("value", 2.0),
            Metric::new("latency", MetricType::Histogram).with_field("sum", 0.25),
        ];

        let text = export(&exporter, &metrics);
        assert!(text.contains("# TYPE plain gauge\nplain 2\n"));
        assert!(text.contains("# TYPE latency_sum gauge\nlatency_sum 0.25\n"));
    }

    #[test]
    fn test_special_values() {
        let exporter = PrometheusExporter::default();
        let metric = Metric::new("odd", MetricType::Gauge).with_field("value", f64::NAN);

        assert!(export(&exporter, &[metric]).contains("odd NaN\n"));
    }

    #[test]
    fn test_no_fields_renders_nothing() {
        let exporter = PrometheusExporter::default();
        let metric = Metric::new("empty", MetricType::Gauge);

        assert!(export(&exporter, &[metric]).is_empty());
    }

    #[test]
    fn test_timestamps_setting() {
        let mut exporter = PrometheusExporter::default();
        exporter
            .init(&serde_json::from_str(r#"{"timestamps": true}"#).unwrap())
            .unwrap();
        let metric = Metric::new("up", MetricType::Gauge).with_field("value", 1.0);
        let millis = metric.timestamp().timestamp_millis();

        assert!(export(&exporter, &[metric]).contains(&format!("up 1 {}\n", millis)));
    }
}
