//! Stub plugins and builders shared by engine tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::instance::{ExporterInstance, InputInstance, OutputInstance, ProcessorInstance};
use super::metric::{Metric, MetricType};
use super::model::{
    ModuleStatus, PipelineConfig, PipelineModule, PipelineNode, PipelineStructure, PluginNode,
};
use super::plugin::{
    Exporter, Input, Output, Plugin, PluginConfig, PluginError, PluginSettings, Plugins, Processor,
};
use super::stats::EngineStats;

/// Body returned by the `test` exporter
pub const EXPORTED: &str = "test_metric{source=\"stub\"} 1\n";

pub fn stats() -> Arc<EngineStats> {
    Arc::new(EngineStats::new().unwrap())
}

pub fn metric(name: &str) -> Metric {
    Metric::new(name, MetricType::Gauge).with_field("value", 1.0)
}

pub fn input(name: &str) -> InputInstance {
    InputInstance::new(name, PluginConfig::default(), stats())
}

pub fn processor(name: &str) -> ProcessorInstance {
    ProcessorInstance::new(name, PluginConfig::default(), stats())
}

pub fn output(name: &str) -> OutputInstance {
    OutputInstance::new(name, PluginConfig::default(), stats())
}

pub fn exporter(name: &str) -> ExporterInstance {
    ExporterInstance::new(name, PluginConfig::default(), stats())
}

pub fn module(name: &str, pipelines: Vec<PipelineNode>) -> PipelineModule {
    PipelineModule {
        name: name.to_string(),
        status: ModuleStatus::Active,
        pipelines,
    }
}

/// Trigger node exposed on `path` with the `test` exporter
pub fn pull_node(name: &str, path: &str, input: &str, processor: &str) -> PipelineNode {
    PipelineNode {
        name: name.to_string(),
        config: PipelineConfig::trigger(path),
        structure: PipelineStructure {
            inputs: vec![PluginNode::new(input)],
            processors: vec![PluginNode::new(processor)],
            output: None,
            exporter: Some(PluginNode::new("test")),
        },
    }
}

/// Periodic node reading the `fixed` input
pub fn push_node(name: &str, period_ms: u64, output: &str) -> PipelineNode {
    PipelineNode {
        name: name.to_string(),
        config: PipelineConfig::periodic(Duration::from_millis(period_ms)),
        structure: PipelineStructure {
            inputs: vec![PluginNode::new("fixed")],
            processors: vec![PluginNode::new("passthrough")],
            output: Some(PluginNode::new(output)),
            exporter: None,
        },
    }
}

/// Poll `done` until it holds, failing the test after two seconds
pub async fn wait_for(done: impl Fn() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Call counts observed by the `counted` and `test` stubs
#[derive(Clone, Default)]
pub struct StubCounters {
    closed: Arc<AtomicUsize>,
    collects: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    write_starts: Arc<AtomicUsize>,
    written_metrics: Arc<AtomicUsize>,
}

impl StubCounters {
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn collects(&self) -> usize {
        self.collects.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn write_starts(&self) -> usize {
        self.write_starts.load(Ordering::SeqCst)
    }

    pub fn written_metrics(&self) -> usize {
        self.written_metrics.load(Ordering::SeqCst)
    }
}

pub struct StubInput {
    name: &'static str,
    count: usize,
    fail: bool,
    sleep: Duration,
    counters: Option<StubCounters>,
}

impl StubInput {
    pub fn emitting(name: &'static str, count: usize) -> Self {
        Self {
            name,
            count,
            fail: false,
            sleep: Duration::ZERO,
            counters: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::emitting("failing", 0)
        }
    }

    pub fn sleeping(sleep: Duration) -> Self {
        Self {
            sleep,
            ..Self::emitting("slow", 1)
        }
    }

    pub fn counted(name: &'static str, counters: StubCounters) -> Self {
        Self {
            counters: Some(counters),
            ..Self::emitting(name, 1)
        }
    }
}

impl Plugin for StubInput {
    fn close(&self) -> Result<(), PluginError> {
        if let Some(counters) = &self.counters {
            counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "stub input"
    }
}

impl Input for StubInput {
    fn collect(&self) -> Result<Vec<Metric>, PluginError> {
        if let Some(counters) = &self.counters {
            counters.collects.fetch_add(1, Ordering::SeqCst);
        }
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        if self.fail {
            return Err("collect failed".into());
        }
        Ok((0..self.count).map(|_| metric(self.name)).collect())
    }
}

enum ProcessorBehavior {
    Passthrough,
    RejectPair,
    AppendOrder(&'static str),
    BadInit,
    PanicInit,
    Panic,
}

pub struct StubProcessor {
    behavior: ProcessorBehavior,
    counters: Option<StubCounters>,
}

impl StubProcessor {
    fn with(behavior: ProcessorBehavior) -> Self {
        Self {
            behavior,
            counters: None,
        }
    }

    pub fn panicking() -> Self {
        Self::with(ProcessorBehavior::Panic)
    }
}

impl Plugin for StubProcessor {
    fn init(&mut self, _settings: &PluginSettings) -> Result<(), PluginError> {
        match self.behavior {
            ProcessorBehavior::BadInit => Err("bad processor settings".into()),
            ProcessorBehavior::PanicInit => panic!("init exploded"),
            _ => Ok(()),
        }
    }

    fn close(&self) -> Result<(), PluginError> {
        if let Some(counters) = &self.counters {
            counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "stub processor"
    }
}

impl Processor for StubProcessor {
    fn process(&self, mut metrics: Vec<Metric>) -> Result<Vec<Metric>, PluginError> {
        match self.behavior {
            ProcessorBehavior::Passthrough
            | ProcessorBehavior::BadInit
            | ProcessorBehavior::PanicInit => Ok(metrics),
            ProcessorBehavior::RejectPair => {
                if metrics.iter().any(|m| m.name() == "pair") {
                    return Err("pair metrics are rejected".into());
                }
                Ok(metrics)
            }
            ProcessorBehavior::AppendOrder(step) => {
                for metric in &mut metrics {
                    let order = match metric.tag("order") {
                        Some(prev) => format!("{},{}", prev, step),
                        None => step.to_string(),
                    };
                    metric.add_tag("order", order);
                }
                Ok(metrics)
            }
            ProcessorBehavior::Panic => panic!("processor exploded"),
        }
    }
}

/// Write delay of the `slow` output
pub const SLOW_WRITE: Duration = Duration::from_millis(150);

pub struct StubOutput {
    fail: bool,
    sleep: Duration,
    counters: StubCounters,
}

impl Plugin for StubOutput {
    fn close(&self) -> Result<(), PluginError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn description(&self) -> &'static str {
        "stub output"
    }
}

impl Output for StubOutput {
    fn write(&self, metrics: &[Metric]) -> Result<(), PluginError> {
        self.counters.write_starts.fetch_add(1, Ordering::SeqCst);
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        if self.fail {
            return Err("write failed".into());
        }
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.counters
            .written_metrics
            .fetch_add(metrics.len(), Ordering::SeqCst);
        Ok(())
    }
}

pub struct StubExporter {
    fail: bool,
}

impl Plugin for StubExporter {
    fn description(&self) -> &'static str {
        "stub exporter"
    }
}

impl Exporter for StubExporter {
    fn export(&self, _metrics: &[Metric]) -> Result<Vec<u8>, PluginError> {
        if self.fail {
            return Err("export failed".into());
        }
        Ok(EXPORTED.as_bytes().to_vec())
    }
}

/// Stub registry with throwaway counters
pub fn plugins() -> Plugins {
    plugins_with_counters(&StubCounters::default())
}

/// Stub registry whose `counted` and `test` plugins report into `counters`
pub fn plugins_with_counters(counters: &StubCounters) -> Plugins {
    let mut plugins = Plugins::new();

    plugins.inputs.register("fixed", || Box::new(StubInput::emitting("fixed", 1)));
    plugins.inputs.register("pair", || Box::new(StubInput::emitting("pair", 2)));
    plugins.inputs.register("triple", || Box::new(StubInput::emitting("triple", 3)));
    plugins.inputs.register("failing", || Box::new(StubInput::failing()));
    let c = counters.clone();
    plugins
        .inputs
        .register("counted", move || Box::new(StubInput::counted("counted", c.clone())));
    let c = counters.clone();
    plugins
        .inputs
        .register("test", move || Box::new(StubInput::counted("test", c.clone())));

    plugins.processors.register("passthrough", || {
        Box::new(StubProcessor::with(ProcessorBehavior::Passthrough))
    });
    plugins.processors.register("test", || {
        Box::new(StubProcessor::with(ProcessorBehavior::Passthrough))
    });
    plugins.processors.register("reject_pair", || {
        Box::new(StubProcessor::with(ProcessorBehavior::RejectPair))
    });
    plugins.processors.register("tag_first", || {
        Box::new(StubProcessor::with(ProcessorBehavior::AppendOrder("first")))
    });
    plugins.processors.register("tag_second", || {
        Box::new(StubProcessor::with(ProcessorBehavior::AppendOrder("second")))
    });
    plugins.processors.register("bad_init", || {
        Box::new(StubProcessor::with(ProcessorBehavior::BadInit))
    });
    plugins.processors.register("panic_init", || {
        Box::new(StubProcessor::with(ProcessorBehavior::PanicInit))
    });
    let c = counters.clone();
    plugins.processors.register("counted", move || {
        Box::new(StubProcessor {
            behavior: ProcessorBehavior::Passthrough,
            counters: Some(c.clone()),
        })
    });

    for name in ["counted", "test"] {
        let c = counters.clone();
        plugins.outputs.register(name, move || {
            Box::new(StubOutput {
                fail: false,
                sleep: Duration::ZERO,
                counters: c.clone(),
            })
        });
    }
    let c = counters.clone();
    plugins.outputs.register("slow", move || {
        Box::new(StubOutput {
            fail: false,
            sleep: SLOW_WRITE,
            counters: c.clone(),
        })
    });
    let c = counters.clone();
    plugins.outputs.register("failing", move || {
        Box::new(StubOutput {
            fail: true,
            sleep: Duration::ZERO,
            counters: c.clone(),
        })
    });

    plugins
        .exporters
        .register("test", || Box::new(StubExporter { fail: false }));
    plugins
        .exporters
        .register("failing", || Box::new(StubExporter { fail: true }));

    plugins
}
