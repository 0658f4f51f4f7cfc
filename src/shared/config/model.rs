use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub bulk: BulkConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub http_addr: String,
    /// Base URL clients use to reach this server; signed bulk URLs are built on it.
    pub public_url: String,
    /// Bearer token required on every route except signed downloads. Empty disables auth.
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub keep_alive: bool,
    /// 0 or unset means no limit
    #[serde(default)]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub stdout_level: String,
    pub file_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub tables: Vec<TableSource>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            tables: Vec::new(),
        }
    }
}

fn default_batch_size() -> usize {
    8192
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Csv,
    Parquet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSource {
    pub name: String,
    pub path: String,
    pub format: TableFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchConfig {
    /// Split deferred stream results into endpoints of at most this many rows (0 = one endpoint).
    #[serde(default)]
    pub partition_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkStoreKind {
    Memory,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkConfig {
    pub store: BulkStoreKind,
    #[serde(default)]
    pub root_dir: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
    pub signing_key: String,
}

impl BulkConfig {
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }
}

fn default_key_prefix() -> String {
    "results".to_string()
}

fn default_url_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionKind {
    #[default]
    Unbounded,
    Ttl,
    Lru,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub retention: RetentionKind,
    pub ttl_secs: Option<u64>,
    pub max_entries: Option<usize>,
}

use std::env;

pub fn load_settings() -> Result<Settings, config::ConfigError> {
    let config_path = env::var("GLIDE_CONFIG").unwrap_or_else(|_| "config".to_string());

    let settings: Settings = config::Config::builder()
        .add_source(config::File::with_name(&config_path))
        .add_source(config::Environment::with_prefix("GLIDE").separator("__"))
        .build()?
        .try_deserialize()?;

    Ok(settings)
}
