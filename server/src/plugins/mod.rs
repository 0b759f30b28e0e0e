//! Plugins shipped with the agent
//!
//! Each plugin reads its settings from the opaque settings object of its
//! `PluginConfig`. Unknown settings keys are rejected at `init`.

mod log_output;
mod prometheus_exporter;
mod retag;
mod static_input;

use serde::de::DeserializeOwned;

use crate::engine::{PluginError, PluginSettings, Plugins};

pub use log_output::LogOutput;
pub use prometheus_exporter::PrometheusExporter;
pub use retag::Retag;
pub use static_input::StaticInput;

/// Register every built-in plugin under its public name
pub fn register_builtins(plugins: &mut Plugins) {
    plugins
        .inputs
        .register(StaticInput::NAME, || Box::new(StaticInput::default()));
    plugins
        .processors
        .register(Retag::NAME, || Box::new(Retag::default()));
    plugins
        .outputs
        .register(LogOutput::NAME, || Box::new(LogOutput::default()));
    plugins
        .exporters
        .register(PrometheusExporter::NAME, || Box::new(PrometheusExporter::default()));
}

fn parse_settings<T: DeserializeOwned>(settings: &PluginSettings) -> Result<T, PluginError> {
    serde_json::from_value(serde_json::Value::Object(settings.clone())).map_err(Into::into)
}
