use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use super::callback::{CallbackResult, ModuleCallback, ModuleNotification};
use crate::core::constants::PROCESS_NAME;

#[derive(Debug, Default, Clone)]
struct ModuleEntry {
    version: u64,
    values: BTreeMap<String, String>,
}

/// Result of a key-value update, with the module's version after it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub success: bool,
    pub description: String,
    pub version: u64,
}

/// Versioned key-value configuration per module.
///
/// Only changed keys are dispatched. Values are committed and the version
/// bumped only when the callback accepts them, so a failed update can be
/// retried with the same body.
pub struct ModuleConfigStore {
    modules: Mutex<HashMap<String, ModuleEntry>>,
    callback: Arc<ModuleCallback>,
}

impl ModuleConfigStore {
    pub fn new(callback: Arc<ModuleCallback>) -> Self {
        Self {
            modules: Mutex::new(HashMap::new()),
            callback,
        }
    }

    pub fn callback(&self) -> &Arc<ModuleCallback> {
        &self.callback
    }

    pub async fn update(
        &self,
        module: &str,
        key_values: BTreeMap<String, String>,
    ) -> UpdateOutcome {
        // Held across the callback so updates to the store are applied one at a time
        let mut modules = self.modules.lock().await;
        let entry = modules.get(module).cloned().unwrap_or_default();

        let changed: BTreeMap<String, String> = key_values
            .into_iter()
            .filter(|(key, value)| entry.values.get(key) != Some(value))
            .collect();

        if changed.is_empty() {
            tracing::debug!(module = %module, version = entry.version, "Module config unchanged");
            return UpdateOutcome {
                success: true,
                description: "no changes".to_string(),
                version: entry.version,
            };
        }

        let CallbackResult {
            success,
            description,
        } = self
            .callback
            .notify(ModuleNotification {
                process: PROCESS_NAME.to_string(),
                module: module.to_string(),
                updated_key_values: changed.clone(),
            })
            .await;

        if !success {
            return UpdateOutcome {
                success,
                description,
                version: entry.version,
            };
        }

        let stored = modules.entry(module.to_string()).or_default();
        stored.values.extend(changed);
        stored.version += 1;
        tracing::info!(module = %module, version = stored.version, "Module config updated");

        UpdateOutcome {
            success,
            description,
            version: stored.version,
        }
    }

    /// Current version and values of a module
    pub async fn get(&self, module: &str) -> Option<(u64, BTreeMap<String, String>)> {
        self.modules
            .lock()
            .await
            .get(module)
            .map(|entry| (entry.version, entry.values.clone()))
    }
}
