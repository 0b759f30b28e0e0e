//! Scheduled pipeline
//!
//! A `PipelineInstance` owns one `Pipeline` and decides when it runs:
//! periodic instances push to their output on a clock, trigger instances are
//! pulled through a route registered with the `RouteManager`. Instances are
//! built once and never mutated by an update; an update replaces the set.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::error::{EngineError, EngineResult};
use super::model::{PipelineConfig, ScheduleStrategy};
use super::pipeline::Pipeline;
use super::plugin::Plugins;
use super::route_manager::RouteManager;
use super::stats::{EngineStats, ExecStatus};

/// Ticker task driving a periodic pipeline
struct Clock {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Clock {
    fn start(instance: Weak<PipelineInstance>, period: Duration) -> Self {
        let (cancel, mut cancelled) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => {
                        let Some(instance) = instance.upgrade() else {
                            break;
                        };
                        if let Err(e) = instance.push().await {
                            tracing::warn!(pipeline = %instance.name(), error = %e, "Push failed");
                        }
                    }
                }
            }
            tracing::debug!("Pipeline clock stopped");
        });

        Self { cancel, handle }
    }

    /// Stop future ticks. A tick already running is left to finish.
    fn stop(self) {
        let _ = self.cancel.send(true);
        drop(self.handle);
    }
}

enum Running {
    Route,
    Clock(Clock),
}

pub struct PipelineInstance {
    name: String,
    pipeline: Arc<Pipeline>,
    config: PipelineConfig,
    routes: Arc<RouteManager>,
    stats: Arc<EngineStats>,
    running: Mutex<Option<Running>>,
}

impl PipelineInstance {
    /// Bind a pipeline to its schedule.
    ///
    /// Push pipelines may only carry an output and need a non-zero period;
    /// pull pipelines may only carry an exporter and need an expose URL.
    pub fn new(
        pipeline: Pipeline,
        config: PipelineConfig,
        routes: Arc<RouteManager>,
        stats: Arc<EngineStats>,
    ) -> EngineResult<Self> {
        let name = pipeline.name().to_string();

        match config.schedule_strategy {
            ScheduleStrategy::Periodic => {
                if pipeline.exporter().is_some() {
                    return Err(EngineError::invalid_pipeline(
                        name,
                        "periodic pipelines push to an output and cannot have an exporter",
                    ));
                }
                if config.period().is_zero() {
                    return Err(EngineError::invalid_pipeline(
                        name,
                        "periodic pipelines need a period greater than zero",
                    ));
                }
            }
            ScheduleStrategy::Trigger => {
                if pipeline.output().is_some() {
                    return Err(EngineError::invalid_pipeline(
                        name,
                        "trigger pipelines are pulled through an exporter and cannot have an output",
                    ));
                }
                if !config.expose_url.starts_with('/') {
                    return Err(EngineError::invalid_pipeline(
                        name,
                        format!("expose url '{}' must start with '/'", config.expose_url),
                    ));
                }
            }
        }

        Ok(Self {
            name,
            pipeline: Arc::new(pipeline),
            config,
            routes,
            stats,
            running: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn init(&self, plugins: &Plugins) -> EngineResult<()> {
        self.pipeline.init(plugins)
    }

    /// Release plugin resources. Only call once the instance is stopped for good.
    pub fn close(&self) {
        self.pipeline.close();
    }

    pub fn start(self: &Arc<Self>) -> EngineResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(EngineError::AlreadyRunning(self.name.clone()));
        }
        if !self.pipeline.is_initialized() {
            return Err(EngineError::invalid_pipeline(
                &self.name,
                "pipeline must be initialized before it is started",
            ));
        }

        match self.config.schedule_strategy {
            ScheduleStrategy::Trigger => {
                let path = &self.config.expose_url;
                self.routes.register_route(path);
                self.routes.add_pipeline(path, Arc::clone(self));
                *running = Some(Running::Route);
                tracing::debug!(pipeline = %self.name, path = %path, "Pull pipeline started");
            }
            ScheduleStrategy::Periodic => {
                let clock = Clock::start(Arc::downgrade(self), self.config.period());
                *running = Some(Running::Clock(clock));
                tracing::debug!(
                    pipeline = %self.name,
                    period_ms = self.config.period,
                    "Push pipeline started"
                );
            }
        }
        Ok(())
    }

    pub fn stop(self: &Arc<Self>) -> EngineResult<()> {
        let running = self
            .running
            .lock()
            .take()
            .ok_or_else(|| EngineError::NotRunning(self.name.clone()))?;

        match running {
            Running::Route => self.routes.remove_pipeline(&self.config.expose_url, self)?,
            Running::Clock(clock) => clock.stop(),
        }

        tracing::debug!(pipeline = %self.name, "Pipeline stopped");
        Ok(())
    }

    /// One push cycle: compute, then write to the output.
    ///
    /// An empty compute result is not an error; the write is skipped.
    pub async fn push(&self) -> EngineResult<()> {
        let started = Instant::now();

        let Some(output) = self.pipeline.output() else {
            tracing::warn!(pipeline = %self.name, "No output configured, skipping push");
            return Ok(());
        };

        let metrics = self.pipeline.parallel_compute().await;
        if metrics.is_empty() {
            tracing::warn!(pipeline = %self.name, "Pipeline produced no metrics, skipping write");
            self.stats
                .record_pipeline(&self.name, ExecStatus::Successful, started.elapsed(), 0);
            return Ok(());
        }

        let count = metrics.len();
        let result = output.write(metrics).await;
        self.stats
            .record_pipeline(&self.name, ExecStatus::of(&result), started.elapsed(), count);
        result
    }

    /// One pull cycle: compute, then export. `None` when there is nothing to
    /// contribute (no exporter, no metrics, or a failed export).
    pub async fn pull_export(&self) -> Option<Vec<u8>> {
        let started = Instant::now();
        let exporter = self.pipeline.exporter()?;

        let metrics = self.pipeline.parallel_compute().await;
        if metrics.is_empty() {
            tracing::debug!(pipeline = %self.name, "Pipeline produced no metrics, nothing to export");
            self.stats
                .record_pipeline(&self.name, ExecStatus::Successful, started.elapsed(), 0);
            return None;
        }

        let count = metrics.len();
        let result = exporter.export(metrics).await;
        self.stats
            .record_pipeline(&self.name, ExecStatus::of(&result), started.elapsed(), count);

        match result {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                tracing::warn!(pipeline = %self.name, error = %e, "Export failed, skipping pipeline");
                None
            }
        }
    }
}

impl std::fmt::Debug for PipelineInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineInstance")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}
