//! Pull routes
//!
//! Maps an HTTP path to the trigger pipelines exposed on it. A pull on a path
//! runs every pipeline in the group concurrently and concatenates what their
//! exporters produce into one body.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::{EngineError, EngineResult};
use super::pipeline_instance::PipelineInstance;

pub const PATH_NOT_REGISTERED: &str = "The current path is not registered successfully.";
pub const NO_EXECUTABLE_PIPELINE: &str = "The current path does not have an executable pipeline.";

#[derive(Default)]
pub struct RouteManager {
    routes: RwLock<HashMap<String, Vec<Arc<PipelineInstance>>>>,
}

impl RouteManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` once. Returns `false` if it was already known.
    pub fn register_route(&self, path: &str) -> bool {
        let mut routes = self.routes.write();
        if routes.contains_key(path) {
            return false;
        }
        routes.insert(path.to_string(), Vec::new());
        tracing::info!(path = %path, "Registered pull route");
        true
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.routes.read().contains_key(path)
    }

    /// Append `pipeline` to the group on `path`, creating the route if needed
    pub fn add_pipeline(&self, path: &str, pipeline: Arc<PipelineInstance>) {
        self.routes
            .write()
            .entry(path.to_string())
            .or_default()
            .push(pipeline);
    }

    /// Remove `pipeline` from the group on `path` by identity
    pub fn remove_pipeline(&self, path: &str, pipeline: &Arc<PipelineInstance>) -> EngineResult<()> {
        let mut routes = self.routes.write();
        let group = routes
            .get_mut(path)
            .ok_or_else(|| EngineError::RouteNotRegistered(path.to_string()))?;

        let position = group
            .iter()
            .position(|p| Arc::ptr_eq(p, pipeline))
            .ok_or_else(|| EngineError::PipelineNotExist(pipeline.name().to_string()))?;
        group.remove(position);
        Ok(())
    }

    /// Snapshot of the group on `path`; the lock is not held by the caller
    pub fn get_pipeline_group(&self, path: &str) -> Option<Vec<Arc<PipelineInstance>>> {
        self.routes.read().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.read().keys().cloned().collect();
        paths.sort_unstable();
        paths
    }

    /// Serve one pull on `path`.
    ///
    /// Unknown paths and empty groups are answered with a message in the body.
    /// Pipelines that fail or produce nothing are left out of the body.
    pub async fn pull(&self, path: &str) -> Vec<u8> {
        let Some(group) = self.get_pipeline_group(path) else {
            return PATH_NOT_REGISTERED.as_bytes().to_vec();
        };
        if group.is_empty() {
            return NO_EXECUTABLE_PIPELINE.as_bytes().to_vec();
        }

        let tasks = group.into_iter().map(|pipeline| {
            tokio::spawn(async move { pipeline.pull_export().await })
        });

        let mut body = Vec::new();
        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(Some(buffer)) => body.extend_from_slice(&buffer),
                Ok(None) => {}
                Err(e) => tracing::error!(path = %path, error = %e, "Pull task failed"),
            }
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::PipelineConfig;
    use crate::engine::pipeline::Pipeline;
    use crate::engine::test_support::{self, StubCounters};
    use crate::engine::plugin::Plugins;

    fn pull_instance(
        routes: &Arc<RouteManager>,
        name: &str,
        input: &str,
        exporter: &str,
    ) -> Arc<PipelineInstance> {
        let pipeline = Pipeline::new(
            name,
            vec![test_support::input(input)],
            vec![],
            None,
            Some(test_support::exporter(exporter)),
        );
        Arc::new(
            PipelineInstance::new(
                pipeline,
                PipelineConfig::trigger("/x"),
                routes.clone(),
                test_support::stats(),
            )
            .unwrap(),
        )
    }

    fn started(
        routes: &Arc<RouteManager>,
        plugins: &Plugins,
        name: &str,
        input: &str,
        exporter: &str,
    ) -> Arc<PipelineInstance> {
        let instance = pull_instance(routes, name, input, exporter);
        instance.init(plugins).unwrap();
        instance.start().unwrap();
        instance
    }

    #[test]
    fn test_register_route_once() {
        let routes = RouteManager::new();
        assert!(routes.register_route("/x"));
        assert!(!routes.register_route("/x"));
        assert!(routes.is_registered("/x"));
        assert_eq!(routes.paths(), vec!["/x".to_string()]);
    }

    #[test]
    fn test_route_round_trip() {
        let routes = Arc::new(RouteManager::new());
        let p = pull_instance(&routes, "m/p", "fixed", "test");
        routes.register_route("/x");

        routes.add_pipeline("/x", p.clone());
        let group = routes.get_pipeline_group("/x").unwrap();
        assert!(group.iter().any(|q| Arc::ptr_eq(q, &p)));

        routes.remove_pipeline("/x", &p).unwrap();
        let group = routes.get_pipeline_group("/x").unwrap();
        assert!(!group.iter().any(|q| Arc::ptr_eq(q, &p)));
    }

    #[test]
    fn test_remove_unknown_pipeline() {
        let routes = Arc::new(RouteManager::new());
        let p = pull_instance(&routes, "m/p", "fixed", "test");
        routes.register_route("/x");

        let err = routes.remove_pipeline("/x", &p).unwrap_err();
        assert!(matches!(err, EngineError::PipelineNotExist(_)));
        assert!(err.to_string().contains("pipeline is not exist"));
    }

    #[test]
    fn test_remove_from_unknown_path() {
        let routes = Arc::new(RouteManager::new());
        let p = pull_instance(&routes, "m/p", "fixed", "test");
        assert!(matches!(
            routes.remove_pipeline("/nope", &p),
            Err(EngineError::RouteNotRegistered(_))
        ));
    }

    #[test]
    fn test_identity_not_equality() {
        let routes = Arc::new(RouteManager::new());
        let a = pull_instance(&routes, "m/p", "fixed", "test");
        let b = pull_instance(&routes, "m/p", "fixed", "test");
        routes.add_pipeline("/x", a.clone());

        assert!(routes.remove_pipeline("/x", &b).is_err());
        assert_eq!(routes.get_pipeline_group("/x").unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_removal() {
        let routes = Arc::new(RouteManager::new());
        let p = pull_instance(&routes, "m/p", "fixed", "test");
        routes.add_pipeline("/x", p.clone());

        let snapshot = routes.get_pipeline_group("/x").unwrap();
        routes.remove_pipeline("/x", &p).unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_pull_unknown_path() {
        let routes = RouteManager::new();
        assert_eq!(routes.pull("/nope").await, PATH_NOT_REGISTERED.as_bytes());
    }

    #[tokio::test]
    async fn test_pull_drained_group_runs_nothing() {
        let counters = StubCounters::default();
        let plugins = test_support::plugins_with_counters(&counters);
        let routes = Arc::new(RouteManager::new());
        let p = started(&routes, &plugins, "m/p", "counted", "test");

        p.stop().unwrap();
        assert_eq!(routes.pull("/x").await, NO_EXECUTABLE_PIPELINE.as_bytes());
        assert_eq!(counters.collects(), 0);
    }

    #[tokio::test]
    async fn test_pull_concatenates_and_skips_failures() {
        let plugins = test_support::plugins();
        let routes = Arc::new(RouteManager::new());
        let _a = started(&routes, &plugins, "m/a", "fixed", "test");
        let _b = started(&routes, &plugins, "m/b", "fixed", "test");
        let _c = started(&routes, &plugins, "m/c", "fixed", "failing");
        let _d = started(&routes, &plugins, "m/d", "failing", "test");

        let body = routes.pull("/x").await;
        let expected = test_support::EXPORTED.repeat(2);
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }
}
