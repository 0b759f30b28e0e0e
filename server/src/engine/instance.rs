//! Plugin instance wrappers
//!
//! A `PluginInstance` binds a plugin name and its config to the plugin object
//! resolved at `init`. Every call runs on tokio's blocking pool behind one
//! guard that:
//!
//! - bounds the call with the configured timeout (zero means unbounded)
//! - recovers panics from plugin code and turns them into errors
//!
//! `init` runs inline on the caller's thread and recovers panics the same way.
//! - records call count, duration and produced metrics per `{name, status, type}`
//!
//! On timeout the caller gets `EngineError::Timeout` right away. The blocking
//! task is abandoned, not cancelled: the plugin API is synchronous, so the
//! call keeps running in the background and its result is dropped.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::task::JoinError;

use super::error::{EngineError, EngineResult};
use super::metric::Metric;
use super::plugin::{
    Exporter, Input, Output, Plugin, PluginConfig, PluginError, PluginRegistry, Plugins,
    Processor, StageType,
};
use super::stats::{EngineStats, ExecStatus};

/// Maps a plugin trait object to its stage and registry
pub trait StagePlugin: Plugin {
    const STAGE: StageType;

    fn registry(plugins: &Plugins) -> &PluginRegistry<Self>;
}

impl StagePlugin for dyn Input {
    const STAGE: StageType = StageType::Input;

    fn registry(plugins: &Plugins) -> &PluginRegistry<Self> {
        &plugins.inputs
    }
}

impl StagePlugin for dyn Processor {
    const STAGE: StageType = StageType::Processor;

    fn registry(plugins: &Plugins) -> &PluginRegistry<Self> {
        &plugins.processors
    }
}

impl StagePlugin for dyn Output {
    const STAGE: StageType = StageType::Output;

    fn registry(plugins: &Plugins) -> &PluginRegistry<Self> {
        &plugins.outputs
    }
}

impl StagePlugin for dyn Exporter {
    const STAGE: StageType = StageType::Exporter;

    fn registry(plugins: &Plugins) -> &PluginRegistry<Self> {
        &plugins.exporters
    }
}

pub type InputInstance = PluginInstance<dyn Input>;
pub type ProcessorInstance = PluginInstance<dyn Processor>;
pub type OutputInstance = PluginInstance<dyn Output>;
pub type ExporterInstance = PluginInstance<dyn Exporter>;

/// A named plugin owned by exactly one pipeline
pub struct PluginInstance<P: ?Sized> {
    plugin_name: String,
    config: PluginConfig,
    plugin: OnceLock<Arc<P>>,
    stats: Arc<EngineStats>,
}

impl<P: StagePlugin + ?Sized + 'static> PluginInstance<P> {
    pub fn new(plugin_name: impl Into<String>, config: PluginConfig, stats: Arc<EngineStats>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            config,
            plugin: OnceLock::new(),
            stats,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.plugin.get().is_some()
    }

    /// Resolve the plugin by name and initialize it with this instance's settings
    pub fn init(&self, plugins: &Plugins) -> EngineResult<()> {
        if self.is_initialized() {
            return Err(EngineError::AlreadyInitialized(self.plugin_name.clone()));
        }

        let mut plugin = P::registry(plugins).get(&self.plugin_name)?;
        let settings = self.config.settings();
        match panic::catch_unwind(AssertUnwindSafe(|| plugin.init(settings))) {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(EngineError::PluginInit {
                    stage: P::STAGE,
                    plugin: self.plugin_name.clone(),
                    source,
                });
            }
            Err(payload) => {
                let message = payload_message(payload);
                tracing::error!(plugin = %self.plugin_name, stage = %P::STAGE, panic = %message, "Recovered panic in plugin init");
                return Err(EngineError::PluginPanic {
                    stage: P::STAGE,
                    plugin: self.plugin_name.clone(),
                    message,
                });
            }
        }

        self.plugin
            .set(Arc::from(plugin))
            .map_err(|_| EngineError::AlreadyInitialized(self.plugin_name.clone()))?;

        tracing::debug!(plugin = %self.plugin_name, stage = %P::STAGE, "Plugin initialized");
        Ok(())
    }

    /// Close the resolved plugin; a no-op if `init` never succeeded
    pub fn close(&self) -> EngineResult<()> {
        let Some(plugin) = self.plugin.get() else {
            return Ok(());
        };
        plugin.close().map_err(|source| EngineError::Plugin {
            stage: P::STAGE,
            plugin: self.plugin_name.clone(),
            source,
        })
    }

    fn resolved(&self) -> EngineResult<Arc<P>> {
        self.plugin
            .get()
            .cloned()
            .ok_or_else(|| EngineError::NotInitialized {
                stage: P::STAGE,
                plugin: self.plugin_name.clone(),
            })
    }

    async fn run<R, F>(&self, call: F, reported: impl FnOnce(&R) -> usize) -> EngineResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&P) -> Result<R, PluginError> + Send + 'static,
    {
        let plugin = self.resolved()?;
        let started = Instant::now();

        let result = guarded(
            plugin,
            &self.plugin_name,
            P::STAGE,
            self.config.timeout(),
            call,
        )
        .await;

        let count = result.as_ref().map(reported).unwrap_or(0);
        self.stats.record_plugin(
            &self.plugin_name,
            P::STAGE,
            ExecStatus::of(&result),
            started.elapsed(),
            count,
        );
        result
    }
}

impl PluginInstance<dyn Input> {
    pub async fn collect(&self) -> EngineResult<Vec<Metric>> {
        self.run(|plugin| plugin.collect(), Vec::len).await
    }
}

impl PluginInstance<dyn Processor> {
    pub async fn process(&self, metrics: Vec<Metric>) -> EngineResult<Vec<Metric>> {
        self.run(move |plugin| plugin.process(metrics), Vec::len)
            .await
    }
}

impl PluginInstance<dyn Output> {
    pub async fn write(&self, metrics: Vec<Metric>) -> EngineResult<()> {
        let count = metrics.len();
        self.run(move |plugin| plugin.write(&metrics), |_| count)
            .await
    }
}

impl PluginInstance<dyn Exporter> {
    pub async fn export(&self, metrics: Vec<Metric>) -> EngineResult<Vec<u8>> {
        let count = metrics.len();
        self.run(move |plugin| plugin.export(&metrics), |_| count)
            .await
    }
}

/// Run one plugin call on the blocking pool, bounded by `timeout` when non-zero
async fn guarded<P, R, F>(
    plugin: Arc<P>,
    name: &str,
    stage: StageType,
    timeout: Duration,
    call: F,
) -> EngineResult<R>
where
    P: ?Sized + Send + Sync + 'static,
    R: Send + 'static,
    F: FnOnce(&P) -> Result<R, PluginError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || call(&*plugin));

    let joined = if timeout.is_zero() {
        task.await
    } else {
        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined,
            // Dropping the handle detaches the blocking task
            Err(_) => {
                return Err(EngineError::Timeout {
                    stage,
                    plugin: name.to_string(),
                    timeout,
                });
            }
        }
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(EngineError::Plugin {
            stage,
            plugin: name.to_string(),
            source,
        }),
        Err(join_error) => {
            let message = panic_message(join_error);
            tracing::error!(plugin = %name, stage = %stage, panic = %message, "Recovered panic in plugin call");
            Err(EngineError::PluginPanic {
                stage,
                plugin: name.to_string(),
                message,
            })
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    payload_message(error.into_panic())
}

fn payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
