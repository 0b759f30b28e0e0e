//! Module notification handling
//!
//! A notification carries the keys of one module that changed. Each key is
//! routed to the component that owns it: pipeline modules go to the
//! [`ConfigManager`], basic auth credentials go to the HTTP server's
//! [`BasicAuth`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::auth::{BasicAuth, Credentials};
use crate::core::constants::{KEY_BASIC_AUTH, KEY_PIPELINE_CONFIG};
use crate::engine::{ConfigManager, EngineError, ModuleAction, PipelineModule};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNotification {
    #[serde(default)]
    pub process: String,
    pub module: String,
    #[serde(default)]
    pub updated_key_values: BTreeMap<String, String>,
}

/// Verdict returned to whoever pushed the notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackResult {
    pub success: bool,
    pub description: String,
}

impl CallbackResult {
    pub fn ok(description: impl Into<String>) -> Self {
        Self {
            success: true,
            description: description.into(),
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("invalid value for key {key}: {source}")]
    InvalidValue {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(&'static str),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct ModuleCallback {
    configs: ConfigManager,
    auth: Arc<BasicAuth>,
}

impl ModuleCallback {
    pub fn new(configs: ConfigManager, auth: Arc<BasicAuth>) -> Self {
        Self { configs, auth }
    }

    /// Apply every changed key. Keys are handled in order; failures do not
    /// stop the remaining keys but make the whole result unsuccessful.
    pub async fn notify(&self, notification: ModuleNotification) -> CallbackResult {
        let ModuleNotification {
            process,
            module,
            updated_key_values,
        } = notification;

        tracing::debug!(
            process = %process,
            module = %module,
            keys = updated_key_values.len(),
            "Module notification received"
        );

        let mut applied = Vec::new();
        let mut errors = Vec::new();

        for (key, value) in &updated_key_values {
            let outcome = match key.as_str() {
                KEY_PIPELINE_CONFIG => self.apply_pipeline(&module, value).await,
                KEY_BASIC_AUTH => self.apply_basic_auth(value),
                _ => {
                    tracing::warn!(module = %module, key = %key, "Ignoring unknown module key");
                    continue;
                }
            };

            match outcome {
                Ok(summary) => applied.push(format!("{}: {}", key, summary)),
                Err(e) => {
                    tracing::warn!(module = %module, key = %key, error = %e, "Module key rejected");
                    errors.push(format!("{}: {}", key, e));
                }
            }
        }

        if errors.is_empty() {
            if applied.is_empty() {
                CallbackResult::ok("nothing to apply")
            } else {
                CallbackResult::ok(applied.join("; "))
            }
        } else {
            CallbackResult::failed(errors.join("; "))
        }
    }

    async fn apply_pipeline(&self, module: &str, value: &str) -> Result<String, CallbackError> {
        let mut config =
            PipelineModule::from_json(value).map_err(|source| CallbackError::InvalidValue {
                key: KEY_PIPELINE_CONFIG,
                source,
            })?;
        config.name = module.to_string();

        let summary = match self.configs.apply(config).await? {
            ModuleAction::Add => "added",
            ModuleAction::Update => "updated",
            ModuleAction::Delete => "deleted",
            ModuleAction::Ignore => "inactive, nothing to stop",
        };
        Ok(summary.to_string())
    }

    fn apply_basic_auth(&self, value: &str) -> Result<String, CallbackError> {
        if value.trim().is_empty() {
            self.auth.set(None);
            return Ok("cleared".to_string());
        }

        let credentials: Credentials =
            serde_json::from_str(value).map_err(|source| CallbackError::InvalidValue {
                key: KEY_BASIC_AUTH,
                source,
            })?;
        if credentials.username.is_empty() {
            return Err(CallbackError::InvalidCredentials("username must not be empty"));
        }
        if credentials.password.is_empty() {
            return Err(CallbackError::InvalidCredentials("password must not be empty"));
        }

        self.auth.set(Some(credentials));
        Ok("set".to_string())
    }
}
