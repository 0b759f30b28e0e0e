//! Core application

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ApiServer, Authorizer, BasicAuth, Credentials};
use crate::core::cli::{self, CliConfig};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::engine::{Engine, PipelineModule, Plugins};
use crate::module::{ModuleCallback, ModuleConfigStore};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub engine: Engine,
    pub auth: Arc<BasicAuth>,
    pub store: Arc<ModuleConfigStore>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let cli_config = cli::parse();
        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let shutdown = ShutdownService::new(config.engine.shutdown_grace);

        let (engine, handles) = Engine::spawn(
            Plugins::with_builtins(),
            config.engine.event_buffer,
            shutdown.subscribe(),
        )
        .context("Failed to initialize engine stats")?;
        for handle in handles {
            shutdown.register(handle).await;
        }

        let auth = Arc::new(BasicAuth::new(config.auth.clone().map(Credentials::from)));
        let callback = Arc::new(ModuleCallback::new(
            engine.configs.clone(),
            Arc::clone(&auth),
        ));
        let store = Arc::new(ModuleConfigStore::new(callback));

        Ok(Self {
            shutdown,
            config,
            engine,
            auth,
            store,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        if let Some(dir) = &app.config.modules.dir {
            app.load_startup_modules(dir).await;
        }

        tracing::info!(
            host = %app.config.server.host,
            port = app.config.server.port,
            auth = app.auth.is_enabled(),
            "Starting {}",
            APP_NAME_LOWER
        );

        let server = ApiServer::new(
            app.engine.clone(),
            Arc::clone(&app.store),
            Arc::clone(&app.auth),
        );
        let served = server.start(&app.config.server, &app.shutdown).await;
        app.shutdown.shutdown().await;

        served
    }

    /// Load the modules dir at startup. An unreadable dir is logged and the
    /// agent starts without modules.
    async fn load_startup_modules(&self, dir: &Path) -> usize {
        match self.load_modules(dir).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Modules dir not loaded, starting without modules");
                0
            }
        }
    }

    /// Add every `*.json` module found in `dir`, in file name order.
    ///
    /// A module that fails to load is logged and skipped so one bad file does
    /// not keep the agent from starting.
    pub async fn load_modules(&self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read modules dir: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let module = match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|json| PipelineModule::from_json(&json).map_err(anyhow::Error::from))
            {
                Ok(module) => module,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable module file");
                    continue;
                }
            };

            if !module.is_active() {
                tracing::debug!(module = %module.name, "Skipping inactive module");
                continue;
            }

            let name = module.name.clone();
            match self.engine.configs.add(module).await {
                Ok(()) => {
                    tracing::info!(module = %name, path = %path.display(), "Module loaded");
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(module = %name, path = %path.display(), error = %e, "Failed to load module");
                }
            }
        }

        tracing::debug!(count = loaded, "Module directory loaded");
        Ok(loaded)
    }
}
