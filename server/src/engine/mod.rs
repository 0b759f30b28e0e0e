//! Pipeline execution engine
//!
//! Control flow: a module config change goes to the [`ConfigManager`], which
//! converts it and forwards it to the [`PipelineManager`]; that one starts and
//! stops [`PipelineInstance`]s, which either tick on their own clock (push)
//! or are registered with the [`RouteManager`] (pull).

mod config_manager;
mod converter;
mod error;
mod instance;
mod metric;
mod model;
mod pipeline;
mod pipeline_instance;
mod pipeline_manager;
mod plugin;
mod route_manager;
mod stats;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use config_manager::{ConfigManager, ModuleAction};
pub use converter::create_pipeline_instances;
pub use error::{EngineError, EngineResult};
pub use instance::{
    ExporterInstance, InputInstance, OutputInstance, PluginInstance, ProcessorInstance,
    StagePlugin,
};
pub use metric::{Metric, MetricType};
pub use model::{
    ModuleStatus, PipelineConfig, PipelineModule, PipelineNode, PipelineStructure, PluginNode,
    ScheduleStrategy,
};
pub use pipeline::{InitState, Pipeline};
pub use pipeline_instance::PipelineInstance;
pub use pipeline_manager::PipelineManager;
pub use plugin::{
    Exporter, Input, Output, Plugin, PluginConfig, PluginError, PluginRegistry, PluginSettings,
    Plugins, Processor, StageType,
};
pub use route_manager::{NO_EXECUTABLE_PIPELINE, PATH_NOT_REGISTERED, RouteManager};
pub use stats::{EngineStats, ExecStatus};

/// Process-wide engine services, built once at startup and shared by handle
#[derive(Clone)]
pub struct Engine {
    pub plugins: Arc<Plugins>,
    pub stats: Arc<EngineStats>,
    pub routes: Arc<RouteManager>,
    pub pipelines: PipelineManager,
    pub configs: ConfigManager,
}

impl Engine {
    /// Freeze the plugin registry and spawn both manager actors.
    ///
    /// Returns the actor handles so the caller can wait for them on shutdown.
    pub fn spawn(
        plugins: Plugins,
        event_buffer: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, Vec<JoinHandle<()>>), prometheus::Error> {
        let plugins = Arc::new(plugins);
        let stats = Arc::new(EngineStats::new()?);
        let routes = Arc::new(RouteManager::new());

        let (pipelines, pipelines_handle) =
            PipelineManager::spawn(Arc::clone(&plugins), event_buffer, shutdown.clone());
        let (configs, configs_handle) = ConfigManager::spawn(
            pipelines.clone(),
            Arc::clone(&routes),
            Arc::clone(&stats),
            event_buffer,
            shutdown,
        );

        tracing::debug!(
            inputs = plugins.inputs.names().len(),
            processors = plugins.processors.names().len(),
            outputs = plugins.outputs.names().len(),
            exporters = plugins.exporters.names().len(),
            "Engine started"
        );

        let engine = Self {
            plugins,
            stats,
            routes,
            pipelines,
            configs,
        };
        Ok((engine, vec![pipelines_handle, configs_handle]))
    }
}
