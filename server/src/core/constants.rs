// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths, identifiers and the log filter)
pub const APP_NAME_LOWER: &str = "pipeagent";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".pipeagent";

/// Process name reported in module notifications
pub const PROCESS_NAME: &str = "pipeagent";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "pipeagent.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "PIPEAGENT_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "PIPEAGENT_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "PIPEAGENT_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "PIPEAGENT_LOG";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 9464;

/// Default request body limit (1MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Realm sent in basic auth challenges
pub const BASIC_AUTH_REALM: &str = "pipeagent";

// =============================================================================
// Modules
// =============================================================================

/// Environment variable for the module config directory
pub const ENV_MODULES_DIR: &str = "PIPEAGENT_MODULES_DIR";

/// Module key carrying a JSON pipeline module
pub const KEY_PIPELINE_CONFIG: &str = "pipeline.config";

/// Module key carrying JSON basic auth credentials (empty clears them)
pub const KEY_BASIC_AUTH: &str = "http.basic_auth";

// =============================================================================
// Engine
// =============================================================================

/// Default capacity of each manager's event channel
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Default time to wait for background tasks on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;
