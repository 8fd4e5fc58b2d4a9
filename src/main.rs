use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use studydesk::config::{self, Config};
use studydesk::gateway;
use studydesk::store::{migrations, Store};

#[derive(Parser)]
#[command(name = "studydesk", version, about = "Notes, quiz exercises, and a file archive on your own machine")]
struct Cli {
    /// Path to config.toml (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the database, uploads, and default config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the web server (the default when no command is given)
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Bring the database schema up to date, then exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("studydesk=info")),
        )
        .init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    let mut config = Config::load(data_dir, cli.config)?;
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data dir {}", config.data_dir.display()))?;
    // First run: persist the defaults so there is a file to edit.
    if !config.config_path.exists() {
        config.save()?;
        tracing::info!("wrote default config to {}", config.config_path.display());
    }

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let store = Store::open(&config.db_path())?;
            let applied = store.migrate()?;
            if applied > 0 {
                tracing::info!(steps = applied, "schema migrated");
            }

            gateway::run(config, store).await
        }
        Command::Migrate => {
            let store = Store::open(&config.db_path())?;
            let applied = store.migrate()?;
            let version = migrations::schema_version(&store.conn()?)?;
            println!("Applied {applied} migration step(s); schema version is now {version}.");
            Ok(())
        }
    }
}
