//! Running pipeline sets, one per module
//!
//! A single actor task owns `module -> [PipelineInstance]`. Every request
//! carries its own oneshot reply, so callers may share a handle freely and
//! requests for all modules are applied in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::error::{EngineError, EngineResult};
use super::pipeline_instance::PipelineInstance;
use super::plugin::Plugins;

const ACTOR: &str = "pipeline manager";

type Pipelines = Vec<Arc<PipelineInstance>>;
type Reply<T> = oneshot::Sender<T>;

enum PipelineEvent {
    Add {
        module: String,
        pipelines: Pipelines,
        reply: Reply<EngineResult<()>>,
    },
    Update {
        module: String,
        pipelines: Pipelines,
        reply: Reply<EngineResult<()>>,
    },
    Delete {
        module: String,
        reply: Reply<EngineResult<()>>,
    },
    Get {
        module: String,
        reply: Reply<Option<Pipelines>>,
    },
    Modules {
        reply: Reply<Vec<String>>,
    },
}

/// Handle to the pipeline manager actor
#[derive(Clone)]
pub struct PipelineManager {
    tx: mpsc::Sender<PipelineEvent>,
}

impl PipelineManager {
    /// Spawn the actor. It runs until `shutdown` flips or every handle is dropped,
    /// stopping all running pipelines on the way out.
    pub fn spawn(
        plugins: Arc<Plugins>,
        buffer: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let actor = PipelineActor {
            plugins,
            pipelines: HashMap::new(),
        };
        let handle = tokio::spawn(actor.run(rx, shutdown));
        (Self { tx }, handle)
    }

    /// Init, start and store a new pipeline set. Fails if `module` is known.
    pub async fn add(&self, module: &str, pipelines: Pipelines) -> EngineResult<()> {
        self.request(|reply| PipelineEvent::Add {
            module: module.to_string(),
            pipelines,
            reply,
        })
        .await?
    }

    /// Replace the running set of `module`. If the new set fails to init the
    /// old one keeps running untouched.
    pub async fn update(&self, module: &str, pipelines: Pipelines) -> EngineResult<()> {
        self.request(|reply| PipelineEvent::Update {
            module: module.to_string(),
            pipelines,
            reply,
        })
        .await?
    }

    /// Stop and forget the stored set of `module`
    pub async fn delete(&self, module: &str) -> EngineResult<()> {
        self.request(|reply| PipelineEvent::Delete {
            module: module.to_string(),
            reply,
        })
        .await?
    }

    pub async fn get(&self, module: &str) -> EngineResult<Option<Pipelines>> {
        self.request(|reply| PipelineEvent::Get {
            module: module.to_string(),
            reply,
        })
        .await
    }

    pub async fn module_names(&self) -> EngineResult<Vec<String>> {
        self.request(|reply| PipelineEvent::Modules { reply }).await
    }

    async fn request<T>(&self, event: impl FnOnce(Reply<T>) -> PipelineEvent) -> EngineResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(event(reply))
            .await
            .map_err(|_| EngineError::ActorClosed(ACTOR))?;
        response.await.map_err(|_| EngineError::ActorClosed(ACTOR))
    }
}

struct PipelineActor {
    plugins: Arc<Plugins>,
    pipelines: HashMap<String, Pipelines>,
}

impl PipelineActor {
    async fn run(mut self, mut rx: mpsc::Receiver<PipelineEvent>, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Pipeline manager started");

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

        self.stop_everything();
        tracing::debug!("Pipeline manager stopped");
    }

    async fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Add {
                module,
                pipelines,
                reply,
            } => {
                let result = self.add(&module, pipelines).await;
                log_result("add", &module, &result);
                let _ = reply.send(result);
            }
            PipelineEvent::Update {
                module,
                pipelines,
                reply,
            } => {
                let result = self.update(&module, pipelines).await;
                log_result("update", &module, &result);
                let _ = reply.send(result);
            }
            PipelineEvent::Delete { module, reply } => {
                let result = self.delete(&module);
                log_result("delete", &module, &result);
                let _ = reply.send(result);
            }
            PipelineEvent::Get { module, reply } => {
                let _ = reply.send(self.pipelines.get(&module).cloned());
            }
            PipelineEvent::Modules { reply } => {
                let mut names: Vec<String> = self.pipelines.keys().cloned().collect();
                names.sort_unstable();
                let _ = reply.send(names);
            }
        }
    }

    async fn add(&mut self, module: &str, pipelines: Pipelines) -> EngineResult<()> {
        if self.pipelines.contains_key(module) {
            return Err(EngineError::ModuleExists(module.to_string()));
        }

        init_all(&self.plugins, &pipelines).await?;
        if let Err(e) = start_all(&pipelines) {
            close_all(&pipelines);
            return Err(e);
        }

        self.pipelines.insert(module.to_string(), pipelines);
        Ok(())
    }

    async fn update(&mut self, module: &str, pipelines: Pipelines) -> EngineResult<()> {
        let Some(old) = self.pipelines.get(module).cloned() else {
            return Err(EngineError::ModuleNotFound(module.to_string()));
        };

        init_all(&self.plugins, &pipelines).await?;

        stop_all(&old);
        if let Err(e) = start_all(&pipelines) {
            close_all(&pipelines);
            if let Err(restart) = start_all(&old) {
                tracing::error!(module = %module, error = %restart, "Failed to restart previous pipelines");
            }
            return Err(e);
        }
        close_all(&old);

        self.pipelines.insert(module.to_string(), pipelines);
        Ok(())
    }

    fn delete(&mut self, module: &str) -> EngineResult<()> {
        let old = self
            .pipelines
            .remove(module)
            .ok_or_else(|| EngineError::ModuleNotFound(module.to_string()))?;

        stop_all(&old);
        close_all(&old);
        Ok(())
    }

    fn stop_everything(&mut self) {
        for (module, pipelines) in self.pipelines.drain() {
            tracing::debug!(module = %module, "Stopping module pipelines");
            stop_all(&pipelines);
            close_all(&pipelines);
        }
    }
}

/// Init every pipeline on the blocking pool. On failure the pipelines that
/// already initialized are closed again and nothing is started.
///
/// Plugin panics during init come back as `PluginPanic` errors. If the task
/// dies anyway the whole set is closed, which is safe for stages that never
/// initialized.
async fn init_all(plugins: &Arc<Plugins>, pipelines: &Pipelines) -> EngineResult<()> {
    let task = {
        let plugins = Arc::clone(plugins);
        let pipelines = pipelines.clone();
        tokio::task::spawn_blocking(move || {
            for (index, pipeline) in pipelines.iter().enumerate() {
                if let Err(e) = pipeline.init(&plugins) {
                    close_all(&pipelines[..index]);
                    return Err(e);
                }
            }
            Ok(())
        })
    };

    match task.await {
        Ok(result) => result,
        Err(e) => {
            close_all(pipelines);
            Err(EngineError::InitTask(e.to_string()))
        }
    }
}

/// Start every pipeline; if one fails, stop those already started in this call
fn start_all(pipelines: &[Arc<PipelineInstance>]) -> EngineResult<()> {
    for (index, pipeline) in pipelines.iter().enumerate() {
        if let Err(e) = pipeline.start() {
            stop_all(&pipelines[..index]);
            return Err(e);
        }
    }
    Ok(())
}

fn stop_all(pipelines: &[Arc<PipelineInstance>]) {
    for pipeline in pipelines {
        if let Err(e) = pipeline.stop() {
            tracing::warn!(pipeline = %pipeline.name(), error = %e, "Failed to stop pipeline");
        }
    }
}

fn close_all(pipelines: &[Arc<PipelineInstance>]) {
    for pipeline in pipelines {
        pipeline.close();
    }
}

fn log_result(op: &str, module: &str, result: &EngineResult<()>) {
    match result {
        Ok(()) => tracing::info!(module = %module, op = %op, "Module pipelines applied"),
        Err(e) => tracing::warn!(module = %module, op = %op, error = %e, "Module pipelines rejected"),
    }
}
