//! Plugin contracts and the name-keyed plugin registry
//!
//! Plugins are third-party code behind four object-safe traits. A registry per
//! stage maps a plugin name to a factory; the whole set is assembled once at
//! startup, frozen behind an `Arc` and only read afterwards.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::metric::Metric;

/// Error returned by plugin code
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Opaque plugin settings (everything in the plugin's config except the timeout)
pub type PluginSettings = serde_json::Map<String, serde_json::Value>;

/// Pipeline stage a plugin runs in (also the `type` label of plugin counters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageType {
    Input,
    Processor,
    Output,
    Exporter,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Processor => "Processor",
            Self::Output => "Output",
            Self::Exporter => "Exporter",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-plugin configuration: a call timeout plus opaque settings.
///
/// A zero timeout means calls are not bounded.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PluginConfig {
    #[serde(default)]
    timeout_ms: u64,
    #[serde(flatten)]
    settings: PluginSettings,
}

impl PluginConfig {
    pub fn new(timeout: Duration, settings: PluginSettings) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            settings,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }
}

/// Lifecycle shared by every plugin kind
pub trait Plugin: Send + Sync {
    /// Validate and apply settings. Called exactly once before any other call.
    fn init(&mut self, _settings: &PluginSettings) -> Result<(), PluginError> {
        Ok(())
    }

    /// Release resources held by the plugin
    fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        ""
    }

    fn description(&self) -> &'static str;
}

pub trait Input: Plugin {
    fn collect(&self) -> Result<Vec<Metric>, PluginError>;
}

pub trait Processor: Plugin {
    fn process(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>, PluginError>;
}

pub trait Output: Plugin {
    fn write(&self, metrics: &[Metric]) -> Result<(), PluginError>;
}

pub trait Exporter: Plugin {
    fn export(&self, metrics: &[Metric]) -> Result<Vec<u8>, PluginError>;
}

type Factory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

/// Name-keyed factories for one stage
pub struct PluginRegistry<T: ?Sized> {
    stage: StageType,
    factories: HashMap<String, Factory<T>>,
}

impl<T: ?Sized> PluginRegistry<T> {
    pub fn new(stage: StageType) -> Self {
        Self {
            stage,
            factories: HashMap::new(),
        }
    }

    /// Register a factory under `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered for this stage. Registration
    /// happens at startup, so a collision is a build mistake, not a runtime
    /// condition.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            panic!("{} plugin {} is already registered", self.stage, name);
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Build a fresh plugin object
    pub fn get(&self, name: &str) -> EngineResult<Box<T>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::PluginNotFound {
                stage: self.stage,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The four stage registries
pub struct Plugins {
    pub inputs: PluginRegistry<dyn Input>,
    pub processors: PluginRegistry<dyn Processor>,
    pub outputs: PluginRegistry<dyn Output>,
    pub exporters: PluginRegistry<dyn Exporter>,
}

impl Default for Plugins {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugins {
    /// Empty registries
    pub fn new() -> Self {
        Self {
            inputs: PluginRegistry::new(StageType::Input),
            processors: PluginRegistry::new(StageType::Processor),
            outputs: PluginRegistry::new(StageType::Output),
            exporters: PluginRegistry::new(StageType::Exporter),
        }
    }

    /// Registries pre-populated with the plugins shipped in this crate
    pub fn with_builtins() -> Self {
        let mut plugins = Self::new();
        crate::plugins::register_builtins(&mut plugins);
        plugins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl Plugin for Nop {
        fn description(&self) -> &'static str {
            "does nothing"
        }
    }

    impl Input for Nop {
        fn collect(&self) -> Result<Vec<Metric>, PluginError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_registry_get_builds_fresh_instance() {
        let mut registry: PluginRegistry<dyn Input> = PluginRegistry::new(StageType::Input);
        registry.register("nop", || Box::new(Nop));

        let plugin = registry.get("nop").unwrap();
        assert_eq!(plugin.description(), "does nothing");
        assert!(registry.contains("nop"));
        assert_eq!(registry.names(), vec!["nop"]);
    }

    #[test]
    fn test_registry_get_unknown() {
        let registry: PluginRegistry<dyn Input> = PluginRegistry::new(StageType::Input);
        match registry.get("missing") {
            Err(EngineError::PluginNotFound { stage, name }) => {
                assert_eq!(stage, StageType::Input);
                assert_eq!(name, "missing");
            }
            other => panic!("expected PluginNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_registry_duplicate_panics() {
        let mut registry: PluginRegistry<dyn Input> = PluginRegistry::new(StageType::Input);
        registry.register("nop", || Box::new(Nop));
        registry.register("nop", || Box::new(Nop));
    }

    #[test]
    fn test_plugin_config_parse() {
        let config: PluginConfig =
            serde_json::from_str(r#"{"timeout_ms": 250, "dsn": "root@tcp(localhost)"}"#).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(
            config.settings().get("dsn").and_then(|v| v.as_str()),
            Some("root@tcp(localhost)")
        );
        assert!(!config.settings().contains_key("timeout_ms"));
    }

    #[test]
    fn test_plugin_config_default_timeout_is_unbounded() {
        let config: PluginConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.timeout(), Duration::ZERO);
    }

    #[test]
    fn test_builtins_registered() {
        let plugins = Plugins::with_builtins();
        assert!(plugins.inputs.contains("static"));
        assert!(plugins.processors.contains("retag"));
        assert!(plugins.outputs.contains("log"));
        assert!(plugins.exporters.contains("prometheus"));
    }
}
