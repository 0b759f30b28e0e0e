//! Engine error types

use std::time::Duration;

use thiserror::Error;

use super::plugin::{PluginError, StageType};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("module {0} already exists")]
    ModuleExists(String),

    #[error("module {0} does not exist")]
    ModuleNotFound(String),

    #[error("{stage} plugin {name} is not registered")]
    PluginNotFound { stage: StageType, name: String },

    #[error("failed to init {stage} plugin {plugin}: {source}")]
    PluginInit {
        stage: StageType,
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("{stage} plugin {plugin} is not initialized")]
    NotInitialized { stage: StageType, plugin: String },

    #[error("pipeline {0} is already initialized")]
    AlreadyInitialized(String),

    #[error("{stage} plugin {plugin} timed out after {timeout:?}")]
    Timeout {
        stage: StageType,
        plugin: String,
        timeout: Duration,
    },

    #[error("{stage} plugin {plugin} panicked: {message}")]
    PluginPanic {
        stage: StageType,
        plugin: String,
        message: String,
    },

    #[error("{stage} plugin {plugin} failed: {source}")]
    Plugin {
        stage: StageType,
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("invalid pipeline {name}: {reason}")]
    InvalidPipeline { name: String, reason: String },

    #[error("path {0} is not registered")]
    RouteNotRegistered(String),

    #[error("pipeline is not exist: {0}")]
    PipelineNotExist(String),

    #[error("pipeline {0} is already running")]
    AlreadyRunning(String),

    #[error("pipeline {0} is not running")]
    NotRunning(String),

    #[error("pipeline init task failed: {0}")]
    InitTask(String),

    #[error("{0} is not accepting events")]
    ActorClosed(&'static str),
}

impl EngineError {
    pub fn invalid_pipeline(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
