//! Builds runtime pipeline instances from a module config.
//!
//! Construction only: plugins are not resolved here, so an unknown plugin name
//! surfaces at `init`. The one check performed is the push/pull sink rule.

use std::sync::Arc;

use super::error::EngineResult;
use super::instance::{PluginInstance, StagePlugin};
use super::model::{PipelineModule, PipelineNode, PluginNode};
use super::pipeline::Pipeline;
use super::pipeline_instance::PipelineInstance;
use super::route_manager::RouteManager;
use super::stats::EngineStats;

pub fn create_pipeline_instances(
    module: &PipelineModule,
    routes: &Arc<RouteManager>,
    stats: &Arc<EngineStats>,
) -> EngineResult<Vec<Arc<PipelineInstance>>> {
    module
        .pipelines
        .iter()
        .map(|node| create_pipeline_instance(&module.name, node, routes, stats))
        .collect()
}

fn create_pipeline_instance(
    module: &str,
    node: &PipelineNode,
    routes: &Arc<RouteManager>,
    stats: &Arc<EngineStats>,
) -> EngineResult<Arc<PipelineInstance>> {
    let structure = &node.structure;

    let pipeline = Pipeline::new(
        format!("{}/{}", module, node.name),
        structure.inputs.iter().map(|n| plugin_instance(n, stats)).collect(),
        structure.processors.iter().map(|n| plugin_instance(n, stats)).collect(),
        structure.output.as_ref().map(|n| plugin_instance(n, stats)),
        structure.exporter.as_ref().map(|n| plugin_instance(n, stats)),
    );

    PipelineInstance::new(pipeline, node.config.clone(), Arc::clone(routes), Arc::clone(stats))
        .map(Arc::new)
}

fn plugin_instance<P>(node: &PluginNode, stats: &Arc<EngineStats>) -> PluginInstance<P>
where
    P: StagePlugin + ?Sized + 'static,
{
    PluginInstance::new(node.plugin_name.clone(), node.config.clone(), Arc::clone(stats))
}
