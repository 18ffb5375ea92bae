//! Project Tracker
//!
//! A REST backend for hierarchical project tracking:
//! - Projects, milestones, phases and tasks in SQLite
//! - Idempotent task creation and natural-key upsert under concurrent writers
//! - Optimistic concurrency on task updates via `lock_version`
//! - Effort roll-ups and next-action ranking per project
//! - Personas, bugs, an event log and repository context snapshots

pub mod api;
pub mod attachments;
pub mod error;
pub mod store;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use error::{TrackerError, TrackerResult};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub database: DatabaseYamlConfig,
    pub attachments: AttachmentsYamlConfig,
    pub status: StatusYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Database configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseYamlConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseYamlConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://tracker.db".into(),
            max_connections: 4,
            busy_timeout_ms: 5000,
        }
    }
}

/// Attachment storage section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttachmentsYamlConfig {
    pub dir: String,
}

impl Default for AttachmentsYamlConfig {
    fn default() -> Self {
        Self {
            dir: "./data/attachments".into(),
        }
    }
}

/// Status aggregation section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusYamlConfig {
    pub next_action_limit: usize,
}

impl Default for StatusYamlConfig {
    fn default() -> Self {
        Self {
            next_action_limit: tracker::status::DEFAULT_NEXT_ACTION_LIMIT,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Runtime configuration: environment variables override `config.yaml`,
/// which overrides built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_busy_timeout: Duration,
    pub attachments_dir: PathBuf,
    pub next_action_limit: usize,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        // 1. Load YAML config (or defaults if file not found)
        let yaml = Self::load_yaml(yaml_path);

        // 2. Build Config with env var overrides
        Ok(Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(yaml.server.host),
            server_port: env_parse("SERVER_PORT")
                .or_else(|| env_parse("API_PORT"))
                .unwrap_or(yaml.server.port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(yaml.database.url),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(yaml.database.max_connections),
            database_busy_timeout: Duration::from_millis(yaml.database.busy_timeout_ms),
            attachments_dir: std::env::var("ATTACHMENTS_DIR")
                .unwrap_or(yaml.attachments.dir)
                .into(),
            next_action_limit: yaml.status.next_action_limit,
        })
    }

    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn store_config(&self) -> store::SqliteStoreConfig {
        store::SqliteStoreConfig {
            url: self.database_url.clone(),
            max_connections: self.database_max_connections,
            busy_timeout: self.database_busy_timeout,
        }
    }
}

/// Wired application services
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<tracker::TrackerManager>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn store::TrackerStore> =
            Arc::new(store::SqliteStore::connect(&config.store_config()).await?);
        let blobs = Arc::new(attachments::FsBlobStore::new(config.attachments_dir.clone()));
        let tracker = Arc::new(tracker::TrackerManager::new(
            store,
            blobs,
            config.next_action_limit,
        ));

        Ok(Self {
            tracker,
            config: Arc::new(config),
        })
    }

    /// Router with all API routes bound to this state
    pub fn router(&self) -> axum::Router {
        api::create_router(Arc::new(api::ServerState::new(self.tracker.clone())))
    }
}

/// Bind the configured address and serve until the process is stopped
pub async fn start_server(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(config).await?;
    let app = state.router();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
