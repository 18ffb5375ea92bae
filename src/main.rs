//! Project Tracker - Main Server
//!
//! REST backend for projects, milestones and tasks backed by SQLite.

use anyhow::Result;
use clap::{Parser, Subcommand};
use project_tracker::{AppState, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Project tracking REST server")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true, env = "TRACKER_CONFIG")]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config.yaml and SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database URL, e.g. sqlite://tracker.db
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Print the status narrative of a project
    Summary {
        /// Project id
        project_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,project_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, database_url } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            if let Some(url) = database_url {
                config.database_url = url;
            }
            project_tracker::start_server(config).await
        }
        Commands::Summary { project_id } => run_summary(config, project_id).await,
    }
}

async fn run_summary(config: Config, project_id: Uuid) -> Result<()> {
    let state = AppState::new(config).await?;
    tracing::debug!("Connected to database");

    let summary = state.tracker.status_summary(project_id).await?;
    println!("{}", summary.summary);
    Ok(())
}
