//! Pipeline: N inputs → shared processor chain → one sink
//!
//! Every input is its own branch. A branch collects, then runs the processor
//! chain in order over the metrics it owns. Branches run concurrently and are
//! merged only after all of them finish, so no metric is ever shared between
//! branches while a processor mutates it.

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{EngineError, EngineResult};
use super::instance::{
    ExporterInstance, InputInstance, OutputInstance, ProcessorInstance, StagePlugin,
    PluginInstance,
};
use super::metric::Metric;
use super::plugin::Plugins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initialized,
    /// A stage failed to init; every stage initialized before it was closed
    Failed,
}

pub struct Pipeline {
    name: String,
    inputs: Vec<InputInstance>,
    processors: Vec<ProcessorInstance>,
    output: Option<OutputInstance>,
    exporter: Option<ExporterInstance>,
    state: Mutex<InitState>,
}

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<InputInstance>,
        processors: Vec<ProcessorInstance>,
        output: Option<OutputInstance>,
        exporter: Option<ExporterInstance>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            processors,
            output,
            exporter,
            state: Mutex::new(InitState::Uninitialized),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[InputInstance] {
        &self.inputs
    }

    pub fn processors(&self) -> &[ProcessorInstance] {
        &self.processors
    }

    pub fn output(&self) -> Option<&OutputInstance> {
        self.output.as_ref()
    }

    pub fn exporter(&self) -> Option<&ExporterInstance> {
        self.exporter.as_ref()
    }

    pub fn state(&self) -> InitState {
        *self.state.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == InitState::Initialized
    }

    /// Initialize stages in order: inputs, processors, output, exporter.
    ///
    /// The first failure stops the walk. Stages that already initialized are
    /// closed again before the error is returned.
    pub fn init(&self, plugins: &Plugins) -> EngineResult<()> {
        let mut state = self.state.lock();
        if *state != InitState::Uninitialized {
            return Err(EngineError::AlreadyInitialized(self.name.clone()));
        }

        if let Err(e) = self.init_stages(plugins) {
            tracing::warn!(pipeline = %self.name, error = %e, "Pipeline init failed, rolling back");
            self.close();
            *state = InitState::Failed;
            return Err(e);
        }

        *state = InitState::Initialized;
        Ok(())
    }

    fn init_stages(&self, plugins: &Plugins) -> EngineResult<()> {
        for input in &self.inputs {
            input.init(plugins)?;
        }
        for processor in &self.processors {
            processor.init(plugins)?;
        }
        if let Some(output) = &self.output {
            output.init(plugins)?;
        }
        if let Some(exporter) = &self.exporter {
            exporter.init(plugins)?;
        }
        Ok(())
    }

    /// Close every stage that was initialized. Errors are logged, not returned.
    pub fn close(&self) {
        fn close_one<P: StagePlugin + ?Sized + 'static>(pipeline: &str, instance: &PluginInstance<P>) {
            if let Err(e) = instance.close() {
                tracing::warn!(pipeline = %pipeline, error = %e, "Failed to close plugin");
            }
        }

        for input in &self.inputs {
            close_one(&self.name, input);
        }
        for processor in &self.processors {
            close_one(&self.name, processor);
        }
        if let Some(output) = &self.output {
            close_one(&self.name, output);
        }
        if let Some(exporter) = &self.exporter {
            close_one(&self.name, exporter);
        }
    }

    /// Run every input branch concurrently and merge what they produce.
    ///
    /// A branch whose collect or process step fails contributes nothing; the
    /// other branches are unaffected. Order of the merged metrics is unspecified.
    pub async fn parallel_compute(self: &Arc<Self>) -> Vec<Metric> {
        let branches = (0..self.inputs.len()).map(|index| {
            let pipeline = Arc::clone(self);
            tokio::spawn(async move { pipeline.compute_branch(index).await })
        });

        let mut merged = Vec::new();
        for joined in futures::future::join_all(branches).await {
            match joined {
                Ok(metrics) => merged.extend(metrics),
                Err(e) => {
                    tracing::error!(pipeline = %self.name, error = %e, "Input branch task failed");
                }
            }
        }
        merged
    }

    async fn compute_branch(&self, index: usize) -> Vec<Metric> {
        let input = &self.inputs[index];

        let mut metrics = match input.collect().await {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!(
                    pipeline = %self.name,
                    plugin = %input.plugin_name(),
                    error = %e,
                    "Collect failed, skipping branch"
                );
                return Vec::new();
            }
        };

        for processor in &self.processors {
            metrics = match processor.process(metrics).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    tracing::warn!(
                        pipeline = %self.name,
                        input = %input.plugin_name(),
                        plugin = %processor.plugin_name(),
                        error = %e,
                        "Process failed, skipping branch"
                    );
                    return Vec::new();
                }
            };
        }

        metrics
    }
}
