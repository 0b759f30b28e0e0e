//! Desired module configuration
//!
//! The config manager keeps `module -> PipelineModule` for every module that
//! is running. A change is converted into pipeline instances and forwarded to
//! the pipeline manager; the stored config changes only once that succeeds.
//!
//! `apply` picks add, update or delete from the actor's own view of which
//! modules exist, so concurrent notifications for one module never race on
//! that choice.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::converter::create_pipeline_instances;
use super::error::{EngineError, EngineResult};
use super::model::{ModuleStatus, PipelineModule};
use super::pipeline_manager::PipelineManager;
use super::route_manager::RouteManager;
use super::stats::EngineStats;

const ACTOR: &str = "config manager";

type Reply<T> = oneshot::Sender<T>;

/// What applying a module notification does to the running set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleAction {
    Add,
    Update,
    Delete,
    Ignore,
}

impl ModuleAction {
    pub fn decide(exists: bool, status: ModuleStatus) -> Self {
        match (exists, status) {
            (false, ModuleStatus::Active) => Self::Add,
            (true, ModuleStatus::Active) => Self::Update,
            (true, ModuleStatus::Inactive) => Self::Delete,
            (false, ModuleStatus::Inactive) => Self::Ignore,
        }
    }
}

enum ConfigEvent {
    Apply {
        module: PipelineModule,
        reply: Reply<EngineResult<ModuleAction>>,
    },
    Add {
        module: PipelineModule,
        reply: Reply<EngineResult<()>>,
    },
    Update {
        module: PipelineModule,
        reply: Reply<EngineResult<()>>,
    },
    Delete {
        name: String,
        reply: Reply<EngineResult<()>>,
    },
    Get {
        name: String,
        reply: Reply<Option<PipelineModule>>,
    },
    Modules {
        reply: Reply<Vec<String>>,
    },
}

/// Handle to the config manager actor
#[derive(Clone)]
pub struct ConfigManager {
    tx: mpsc::Sender<ConfigEvent>,
}

impl ConfigManager {
    pub fn spawn(
        pipelines: PipelineManager,
        routes: Arc<RouteManager>,
        stats: Arc<EngineStats>,
        buffer: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let actor = ConfigActor {
            pipelines,
            routes,
            stats,
            configs: HashMap::new(),
        };
        let handle = tokio::spawn(actor.run(rx, shutdown));
        (Self { tx }, handle)
    }

    /// Add, update or delete `module` depending on its status and on whether
    /// it is already known. Returns the action that was carried out.
    pub async fn apply(&self, module: PipelineModule) -> EngineResult<ModuleAction> {
        self.request(|reply| ConfigEvent::Apply { module, reply })
            .await?
    }

    pub async fn add(&self, module: PipelineModule) -> EngineResult<()> {
        self.request(|reply| ConfigEvent::Add { module, reply }).await?
    }

    pub async fn update(&self, module: PipelineModule) -> EngineResult<()> {
        self.request(|reply| ConfigEvent::Update { module, reply })
            .await?
    }

    pub async fn delete(&self, name: &str) -> EngineResult<()> {
        self.request(|reply| ConfigEvent::Delete {
            name: name.to_string(),
            reply,
        })
        .await?
    }

    pub async fn get_config(&self, name: &str) -> EngineResult<Option<PipelineModule>> {
        self.request(|reply| ConfigEvent::Get {
            name: name.to_string(),
            reply,
        })
        .await
    }

    pub async fn module_names(&self) -> EngineResult<Vec<String>> {
        self.request(|reply| ConfigEvent::Modules { reply }).await
    }

    async fn request<T>(&self, event: impl FnOnce(Reply<T>) -> ConfigEvent) -> EngineResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(event(reply))
            .await
            .map_err(|_| EngineError::ActorClosed(ACTOR))?;
        response.await.map_err(|_| EngineError::ActorClosed(ACTOR))
    }
}

struct ConfigActor {
    pipelines: PipelineManager,
    routes: Arc<RouteManager>,
    stats: Arc<EngineStats>,
    configs: HashMap<String, PipelineModule>,
}

impl ConfigActor {
    async fn run(mut self, mut rx: mpsc::Receiver<ConfigEvent>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
        tracing::debug!(modules = self.configs.len(), "Config manager stopped");
    }

    async fn handle(&mut self, event: ConfigEvent) {
        match event {
            ConfigEvent::Apply { module, reply } => {
                let _ = reply.send(self.apply(module).await);
            }
            ConfigEvent::Add { module, reply } => {
                let _ = reply.send(self.add(module).await);
            }
            ConfigEvent::Update { module, reply } => {
                let _ = reply.send(self.update(module).await);
            }
            ConfigEvent::Delete { name, reply } => {
                let _ = reply.send(self.delete(&name).await);
            }
            ConfigEvent::Get { name, reply } => {
                let _ = reply.send(self.configs.get(&name).cloned());
            }
            ConfigEvent::Modules { reply } => {
                let mut names: Vec<String> = self.configs.keys().cloned().collect();
                names.sort_unstable();
                let _ = reply.send(names);
            }
        }
    }

    async fn apply(&mut self, module: PipelineModule) -> EngineResult<ModuleAction> {
        let action = ModuleAction::decide(self.configs.contains_key(&module.name), module.status);
        tracing::info!(module = %module.name, action = ?action, "Applying pipeline module");

        match action {
            ModuleAction::Add => self.add(module).await?,
            ModuleAction::Update => self.update(module).await?,
            ModuleAction::Delete => self.delete(&module.name).await?,
            ModuleAction::Ignore => {}
        }
        Ok(action)
    }

    async fn add(&mut self, module: PipelineModule) -> EngineResult<()> {
        if self.configs.contains_key(&module.name) {
            return Err(EngineError::ModuleExists(module.name));
        }

        let instances = create_pipeline_instances(&module, &self.routes, &self.stats)?;
        self.pipelines.add(&module.name, instances).await?;

        tracing::info!(module = %module.name, pipelines = module.pipelines.len(), "Module added");
        self.configs.insert(module.name.clone(), module);
        Ok(())
    }

    async fn update(&mut self, module: PipelineModule) -> EngineResult<()> {
        if !self.configs.contains_key(&module.name) {
            return Err(EngineError::ModuleNotFound(module.name));
        }

        let instances = create_pipeline_instances(&module, &self.routes, &self.stats)?;
        self.pipelines.update(&module.name, instances).await?;

        tracing::info!(module = %module.name, pipelines = module.pipelines.len(), "Module updated");
        self.configs.insert(module.name.clone(), module);
        Ok(())
    }

    async fn delete(&mut self, name: &str) -> EngineResult<()> {
        if !self.configs.contains_key(name) {
            return Err(EngineError::ModuleNotFound(name.to_string()));
        }

        self.pipelines.delete(name).await?;

        tracing::info!(module = %name, "Module deleted");
        self.configs.remove(name);
        Ok(())
    }
}
