use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use round_player::cli::{Cli, Commands, ConfigAction, Display};
use round_player::config::PlayerConfig;
use round_player::error::{PlayerError, Result};
use round_player::node::PlayerNode;
use round_player::output::OutputWriter;
use round_player::state::{RoundStore, SqliteStore};

/// Overrides applied to the loaded configuration for `run`.
struct RunOverrides {
    name: Option<String>,
    team: Option<String>,
    engine: Option<String>,
    listen: Option<String>,
    no_start_match: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Display::new().print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("round_player=debug")
    } else {
        EnvFilter::new("round_player=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Run {
            name,
            team,
            engine,
            listen,
            no_start_match,
        } => {
            let overrides = RunOverrides {
                name,
                team,
                engine,
                listen,
                no_start_match,
            };
            cmd_run(&cli.config, cli.db, overrides).await
        }
        Commands::Rounds => cmd_rounds(&writer, &cli.config, cli.db).await,
        Commands::Parts { external_id } => {
            cmd_parts(&writer, &cli.config, cli.db, external_id).await
        }
        Commands::Config { action } => cmd_config(&writer, &cli.config, cli.db, action).await,
    }
}

async fn load_config(path: &Path, db: Option<PathBuf>) -> Result<PlayerConfig> {
    let mut config = PlayerConfig::load(path).await?;
    if let Some(db) = db {
        config.store.db_path = db;
    }
    Ok(config)
}

fn open_store(config: &PlayerConfig) -> Result<SqliteStore> {
    SqliteStore::with_read_pool_size(&config.store.db_path, config.store.read_pool_size)
}

async fn cmd_run(path: &Path, db: Option<PathBuf>, overrides: RunOverrides) -> Result<()> {
    let mut config = load_config(path, db).await?;
    if let Some(name) = overrides.name {
        config.player.name = name;
    }
    if let Some(team) = overrides.team {
        config.player.team = team;
    }
    if let Some(engine) = overrides.engine {
        config.engine.address = engine;
    }
    if let Some(listen) = overrides.listen {
        config.server.listen_address = listen;
    }
    if overrides.no_start_match {
        config.matchmaking.start_match = false;
    }

    let node = PlayerNode::from_config(config)?.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    node.shutdown().await;
    Ok(())
}

async fn cmd_rounds(writer: &OutputWriter, path: &Path, db: Option<PathBuf>) -> Result<()> {
    let config = load_config(path, db).await?;
    let store = open_store(&config)?;
    let rounds = store.list_rounds().await?;
    writer.emit_rounds(&rounds);
    Ok(())
}

async fn cmd_parts(
    writer: &OutputWriter,
    path: &Path,
    db: Option<PathBuf>,
    external_id: i64,
) -> Result<()> {
    let config = load_config(path, db).await?;
    let store = open_store(&config)?;
    let round = store
        .lookup_by_external_id(external_id)
        .await?
        .ok_or_else(|| PlayerError::RoundNotFound(format!("external id {}", external_id)))?;
    let parts = store.list_parts(round.id).await?;
    writer.emit_parts(&round, &parts);
    Ok(())
}

async fn cmd_config(
    writer: &OutputWriter,
    path: &Path,
    db: Option<PathBuf>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path, db).await?;
            writer.emit_config(&config.to_toml()?, &config);
        }
        ConfigAction::Init => {
            if path.exists() {
                return Err(PlayerError::Config(format!(
                    "{} already exists",
                    path.display()
                )));
            }
            let mut config = PlayerConfig::default();
            if let Some(db) = db {
                config.store.db_path = db;
            }
            config.save(path).await?;
            writer.emit_message(&format!("Wrote default configuration to {}", path.display()));
        }
    }
    Ok(())
}
