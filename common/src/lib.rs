/*!
common/src/lib.rs

Shared configuration types and ledger DB helpers for the competitor watcher.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a default + override pair of TOML files
- Helpers to initialize and migrate the SQLite ledger database
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite ledger file (e.g. "data/watcher.db")
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// HTTP accessor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Fixed pause between the first attempt and the retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Total attempts per request, clamped to 1..=2
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Number of sources fetched at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
            user_agent: default_user_agent(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            concurrency: default_concurrency(),
        }
    }
}

/// Selection policy tunables. All counts of zero mean "disabled".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_max_items")]
    pub max_items_per_source: usize,
    #[serde(default)]
    pub since_hours: u32,
    #[serde(default)]
    pub force_seed_per_source: usize,
    #[serde(default)]
    pub seed_latest_per_source: usize,
    /// Report new items without writing anything to the ledger
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_items_per_source: default_max_items(),
            since_hours: 0,
            force_seed_per_source: 0,
            seed_latest_per_source: 0,
            dry_run: false,
        }
    }
}

/// Remote LLM config for the optional summarization step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
}

/// Where the rendered digest goes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub output_path: Option<String>,
}

/// CSS selectors used to pull items out of an HTML page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorsConfig {
    pub item: String,
    pub title: String,
    #[serde(default = "default_link_attr")]
    pub link_attr: String,
    pub date: Option<String>,
}

/// One `[[sources]]` entry, as written in the config file.
/// Kind and category stay strings here; the watcher validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: String,
    pub category: String,
    pub url: String,
    pub selectors: Option<SelectorsConfig>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    pub llm: Option<LlmConfig>,
    pub delivery: Option<DeliveryConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_db_path() -> String {
    "data/watcher.db".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    12
}

fn default_user_agent() -> String {
    "CompetitorWatcher/1.0".to_string()
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    2
}

fn default_concurrency() -> usize {
    4
}

fn default_max_items() -> usize {
    50
}

fn default_link_attr() -> String {
    "href".to_string()
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

/// Deep-merge `b` into `a`. Tables merge key by key; arrays and scalars are replaced,
/// so an override file that lists `[[sources]]` replaces the default list entirely.
fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Run SQL migrations using sqlx's migration macro.
/// This expects the `migrations` directory at the workspace root, which is embedded at
/// compile time.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("Failed to run sqlx migrations")?;

    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary and return a configured
/// `SqlitePool` in WAL mode. Connections are handed out per operation, so the pool is
/// kept small.
///
/// Example:
///   let pool = init_db_pool("data/watcher.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
