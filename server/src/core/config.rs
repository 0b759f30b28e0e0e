use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_EVENT_BUFFER, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_SHUTDOWN_GRACE_MS,
};

// =============================================================================
// File Configuration
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Engine configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EngineFileConfig {
    pub event_buffer: Option<usize>,
    pub shutdown_grace_ms: Option<u64>,
}

/// Modules configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ModulesFileConfig {
    pub dir: Option<String>,
}

/// Basic auth configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuthFileConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub engine: Option<EngineFileConfig>,
    pub modules: Option<ModulesFileConfig>,
    pub auth: Option<AuthFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            if server.host.is_some() {
                current.host = server.host;
            }
            if server.port.is_some() {
                current.port = server.port;
            }
        }

        if let Some(engine) = other.engine {
            let current = self.engine.get_or_insert_with(EngineFileConfig::default);
            if engine.event_buffer.is_some() {
                current.event_buffer = engine.event_buffer;
            }
            if engine.shutdown_grace_ms.is_some() {
                current.shutdown_grace_ms = engine.shutdown_grace_ms;
            }
        }

        if let Some(modules) = other.modules {
            let current = self.modules.get_or_insert_with(ModulesFileConfig::default);
            if modules.dir.is_some() {
                current.dir = modules.dir;
            }
        }

        // Credentials are replaced as a pair so a username never pairs with a stale password
        if let Some(auth) = other.auth
            && (auth.username.is_some() || auth.password.is_some())
        {
            self.auth = Some(auth);
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub event_buffer: usize,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct ModulesConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub modules: ModulesConfig,
    /// Initial basic auth credentials; `None` leaves the API open
    pub auth: Option<AuthConfig>,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.pipeagent/pipeagent.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let profile = get_profile_config_path();
        Self::load_with_profile(cli, profile.as_deref())
    }

    fn load_with_profile(cli: &CliConfig, profile_path: Option<&Path>) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = profile_path
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let file_server = file_config.server.unwrap_or_default();
        let file_engine = file_config.engine.unwrap_or_default();
        let file_modules = file_config.modules.unwrap_or_default();

        let host = cli
            .host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT);

        let modules_dir = cli
            .modules_dir
            .clone()
            .or_else(|| file_modules.dir.map(|d| expand_path(&d)));

        // --no-auth wins over any configured credentials
        let auth = if cli.no_auth {
            None
        } else {
            file_config.auth.map(|a| AuthConfig {
                username: a.username.unwrap_or_default(),
                password: a.password.unwrap_or_default(),
            })
        };

        let config = Self {
            server: ServerConfig { host, port },
            engine: EngineConfig {
                event_buffer: file_engine.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER),
                shutdown_grace: Duration::from_millis(
                    file_engine
                        .shutdown_grace_ms
                        .unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS),
                ),
            },
            modules: ModulesConfig { dir: modules_dir },
            auth,
        };

        config.validate()?;
        tracing::debug!(config = ?config, "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.engine.event_buffer == 0 {
            anyhow::bail!("Configuration error: engine.event_buffer must be greater than 0");
        }
        if let Some(auth) = &self.auth {
            if auth.username.is_empty() {
                anyhow::bail!("Configuration error: auth.username must not be empty");
            }
            if auth.password.is_empty() {
                anyhow::bail!("Configuration error: auth.password must not be empty");
            }
        }
        // A missing dir is tolerated and reported when modules are loaded
        if let Some(dir) = &self.modules.dir
            && dir.exists()
            && !dir.is_dir()
        {
            anyhow::bail!(
                "Configuration error: modules.dir is not a directory: {}",
                dir.display()
            );
        }
        Ok(())
    }
}

/// Get the profile config path (~/.pipeagent/pipeagent.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Expand `~` and make relative paths absolute against the working directory
fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    let expanded = if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}
