//! Command-line surface for the `orchestratord` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "orchestratord", about = "Agent orchestration server")]
pub struct Cli {
    /// Path to the TOML config file. Missing file falls back to defaults.
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to the hot-reloadable routing patterns file. Overrides
    /// `routing_config_path` in the config file when set.
    #[arg(long)]
    pub routing_config: Option<PathBuf>,

    /// Run a single query against the orchestrator and print the answer,
    /// instead of starting the HTTP server.
    #[arg(long)]
    pub query: Option<String>,
}
