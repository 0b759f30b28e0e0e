use clap::Parser;

use std::path::PathBuf;

use super::constants::{ENV_CONFIG, ENV_HOST, ENV_MODULES_DIR, ENV_PORT};

#[derive(Parser)]
#[command(name = "pipeagent")]
#[command(version, about = "Telemetry pipeline agent", long_about = None)]
pub struct Cli {
    /// Server host address
    #[arg(long, short = 'H', env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Directory of module files (*.json) loaded at startup
    #[arg(long, short = 'm', env = ENV_MODULES_DIR)]
    pub modules_dir: Option<PathBuf>,

    /// Disable basic auth even if credentials are configured
    #[arg(long)]
    pub no_auth: bool,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub modules_dir: Option<PathBuf>,
    pub no_auth: bool,
}

/// Parse CLI arguments
pub fn parse() -> CliConfig {
    let cli = Cli::parse();
    CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        modules_dir: cli.modules_dir,
        no_auth: cli.no_auth,
    }
}
