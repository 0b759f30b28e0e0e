//! Metric value type flowing between pipeline stages

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prometheus-compatible metric kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    #[default]
    Untyped,
    Summary,
    Histogram,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Untyped => "untyped",
            Self::Summary => "summary",
            Self::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bag of fields and tags with a timestamp.
///
/// `(name, tags)` is not a unique identity; pipelines may carry duplicates.
/// Fields and tags are owned maps, so `clone()` is a deep copy and processors
/// mutate their own branch's metrics in place.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Metric {
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, f64>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    #[serde(default, rename = "type")]
    metric_type: MetricType,
}

impl Metric {
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            tags: BTreeMap::new(),
            timestamp: Utc::now(),
            metric_type,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.add_field(key, value);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_tag(key, value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: f64) {
        self.fields.insert(key.into(), value);
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn remove_tag(&mut self, key: &str) -> Option<String> {
        self.tags.remove(key)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }
}
