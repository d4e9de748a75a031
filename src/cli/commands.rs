use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(name = "round-player")]
#[command(author, version, about = "Round-coordination player for engine-driven matches", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "ROUND_PLAYER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// SQLite database path (overrides store.db_path)
    #[arg(long, global = true, env = "ROUND_PLAYER_DB")]
    pub db: Option<PathBuf>,
}

/// Output format for CLI results.
/// - Text: Human-readable tables (default)
/// - Json: One JSON document per command
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve peers, start the match and run every consumer until Ctrl-C
    Run {
        /// Player name (overrides player.name)
        #[arg(long, env = "ROUND_PLAYER_NAME")]
        name: Option<String>,

        /// Team name (overrides player.team)
        #[arg(long, env = "ROUND_PLAYER_TEAM")]
        team: Option<String>,

        /// Engine address (overrides engine.address)
        #[arg(long, env = "ROUND_PLAYER_ENGINE")]
        engine: Option<String>,

        /// Peer server listen address (overrides server.listen_address)
        #[arg(long, env = "ROUND_PLAYER_LISTEN")]
        listen: Option<String>,

        /// Skip asking the engine to start a match
        #[arg(long)]
        no_start_match: bool,
    },

    /// List local rounds
    Rounds,

    /// List parts held for an engine round
    Parts {
        /// Engine round id
        external_id: i64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write the default configuration to the config path
    Init,
}
