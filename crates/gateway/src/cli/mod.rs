//! CLI surface, trimmed to the subcommands a headless control plane needs:
//! start the server, or inspect/validate its configuration. Grounded on the
//! teacher's `Cli`/`Command`/`ConfigCommand` shape and `load_config` helper,
//! minus the chat/import/systemd/doctor/oauth-login commands that belonged
//! to the chat-agent CLI surface this binary no longer has.

pub mod config;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sa-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path named by `SA_CONFIG` (or
/// `config.toml` by default). Shared by `serve` and `config` subcommands.
pub fn load_config() -> anyhow::Result<(sa_domain::config::Config, String)> {
    let config_path = std::env::var("SA_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = sa_domain::config::Config::load(Some(std::path::Path::new(&config_path)))?;
    Ok((config, config_path))
}
