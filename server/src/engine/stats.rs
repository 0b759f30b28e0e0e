//! Execution counters for pipelines and plugin calls
//!
//! The engine is the only producer of these series. They live in a registry
//! owned by the engine (not the process-global default) and are rendered in
//! Prometheus text format by the `/metrics/stat` route.

use std::time::Duration;

use prometheus::{CounterVec, Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use super::plugin::StageType;

const NAMESPACE: &str = "pipeagent";

/// Outcome label shared by pipeline and plugin series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Successful,
    Error,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "Successful",
            Self::Error => "Error",
        }
    }

    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Successful
        } else {
            Self::Error
        }
    }
}

pub struct EngineStats {
    registry: Registry,
    pipeline_executions: IntCounterVec,
    pipeline_seconds: CounterVec,
    pipeline_metrics: IntCounterVec,
    plugin_executions: IntCounterVec,
    plugin_seconds: CounterVec,
    plugin_metrics: IntCounterVec,
}

impl EngineStats {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let pipeline_executions = IntCounterVec::new(
            Opts::new("pipeline_execution_total", "Pipeline executions").namespace(NAMESPACE),
            &["name", "status"],
        )?;
        let pipeline_seconds = CounterVec::new(
            Opts::new(
                "pipeline_execution_seconds_total",
                "Cumulative pipeline execution time",
            )
            .namespace(NAMESPACE),
            &["name", "status"],
        )?;
        let pipeline_metrics = IntCounterVec::new(
            Opts::new(
                "pipeline_reported_metrics_total",
                "Metrics handed to a pipeline sink",
            )
            .namespace(NAMESPACE),
            &["name", "status"],
        )?;
        let plugin_executions = IntCounterVec::new(
            Opts::new("plugin_execution_total", "Plugin calls").namespace(NAMESPACE),
            &["name", "status", "type"],
        )?;
        let plugin_seconds = CounterVec::new(
            Opts::new(
                "plugin_execution_seconds_total",
                "Cumulative plugin call time",
            )
            .namespace(NAMESPACE),
            &["name", "status", "type"],
        )?;
        let plugin_metrics = IntCounterVec::new(
            Opts::new(
                "plugin_reported_metrics_total",
                "Metrics produced by plugin calls",
            )
            .namespace(NAMESPACE),
            &["name", "status", "type"],
        )?;

        registry.register(Box::new(pipeline_executions.clone()))?;
        registry.register(Box::new(pipeline_seconds.clone()))?;
        registry.register(Box::new(pipeline_metrics.clone()))?;
        registry.register(Box::new(plugin_executions.clone()))?;
        registry.register(Box::new(plugin_seconds.clone()))?;
        registry.register(Box::new(plugin_metrics.clone()))?;

        Ok(Self {
            registry,
            pipeline_executions,
            pipeline_seconds,
            pipeline_metrics,
            plugin_executions,
            plugin_seconds,
            plugin_metrics,
        })
    }

    pub fn record_pipeline(
        &self,
        name: &str,
        status: ExecStatus,
        elapsed: Duration,
        reported: usize,
    ) {
        let labels = [name, status.as_str()];
        self.pipeline_executions.with_label_values(&labels).inc();
        self.pipeline_seconds
            .with_label_values(&labels)
            .inc_by(elapsed.as_secs_f64());
        self.pipeline_metrics
            .with_label_values(&labels)
            .inc_by(reported as u64);
    }

    pub fn record_plugin(
        &self,
        name: &str,
        stage: StageType,
        status: ExecStatus,
        elapsed: Duration,
        reported: usize,
    ) {
        let labels = [name, status.as_str(), stage.as_str()];
        self.plugin_executions.with_label_values(&labels).inc();
        self.plugin_seconds
            .with_label_values(&labels)
            .inc_by(elapsed.as_secs_f64());
        self.plugin_metrics
            .with_label_values(&labels)
            .inc_by(reported as u64);
    }

    pub fn pipeline_executions(&self, name: &str, status: ExecStatus) -> u64 {
        self.pipeline_executions
            .with_label_values(&[name, status.as_str()])
            .get()
    }

    pub fn plugin_executions(&self, name: &str, stage: StageType, status: ExecStatus) -> u64 {
        self.plugin_executions
            .with_label_values(&[name, status.as_str(), stage.as_str()])
            .get()
    }

    /// Render every series in Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
