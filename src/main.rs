//! entity-manager CLI - inspect entity stores

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use entity_manager::config::{self, ManagerConfig};
use entity_manager::SqliteStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "entity-manager")]
#[command(version)]
#[command(about = "Inspect SQLite stores written by entity-manager")]
#[command(long_about = r#"
Reads the tables and schema version records that entity-manager keeps for
every registered entity type.

Example usage:
  entity-manager init --database ./data/entities.db
  entity-manager versions
  entity-manager tables --database ./data/entities.db
  entity-manager stats --format json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    pub fn is_human(&self) -> bool {
        matches!(self, OutputMode::Text)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with default connection settings
    Init {
        /// Database file the config points at
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// List schema version records and row counts
    Versions {
        /// Path to the database file (overrides the config)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputMode,
    },

    /// List entity tables with their columns
    Tables {
        /// Path to the database file (overrides the config)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputMode,
    },

    /// Show statistics about the store
    Stats {
        /// Path to the database file (overrides the config)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputMode,
    },
}

/// Open the store named on the command line, falling back to the config file
fn open_store(config_path: Option<&Path>, database: Option<PathBuf>) -> anyhow::Result<SqliteStore> {
    let mut config = config::load_config(config_path)?.unwrap_or_default();
    if database.is_some() {
        config.database = database;
    }
    let Some(path) = &config.database else {
        anyhow::bail!("no database given (pass --database or run `entity-manager init`)");
    };
    if !path.exists() {
        anyhow::bail!("database {} does not exist", path.display());
    }
    tracing::debug!("Opening {}", path.display());
    Ok(SqliteStore::open_with(&config)?)
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = run(cli) {
        entity_manager::ui::error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { database, force } => {
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(config::default_config_path);
            let base = std::env::current_dir()?;
            let config = ManagerConfig {
                database: Some(database.unwrap_or_else(|| config::default_database_path_in(&base))),
                ..ManagerConfig::default()
            };
            commands::run_init(&path, &config, force)?;
        }

        Commands::Versions { database, format } => {
            let store = open_store(config_path, database)?;
            commands::run_versions(&store, format)?;
        }

        Commands::Tables { database, format } => {
            let store = open_store(config_path, database)?;
            commands::run_tables(&store, format)?;
        }

        Commands::Stats { database, format } => {
            let store = open_store(config_path, database)?;
            commands::run_stats(&store, format)?;
        }
    }

    Ok(())
}
