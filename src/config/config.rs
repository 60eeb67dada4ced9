use config::{Config, ConfigError, File};
use serde::Deserialize;

/// TzKT indexer API configuration.
///
/// The provider paginates operation listings with `limit`/`offset`;
/// both default to the API's maximum page size.
#[derive(Debug, Deserialize, Clone)]
pub struct TzktSettings {
    pub url: String,
    #[serde(default = "default_tzkt_limit")]
    pub limit: u32,
    #[serde(default = "default_tzkt_offset")]
    pub offset: u32,
}

fn default_tzkt_limit() -> u32 {
    1000
}

fn default_tzkt_offset() -> u32 {
    1000
}

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Transaction records
/// - Pool/token/system aggregates
/// - Spot prices and per-pool checkpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Core pipeline configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerSettings {
    /// UDP port on which block-level notifications arrive
    #[serde(default = "default_block_port")]
    pub block_port: u16,
    /// Number of levels held back from the notified head to sidestep reorgs
    #[serde(default = "default_reorg_lag")]
    pub reorg_lag: u64,
    /// First level to index when no cursor file exists yet
    pub indexing_start: u64,
    /// Durable marker file holding the last fully processed level
    #[serde(default = "default_level_file")]
    pub level_file: String,
    /// Time-to-live of the cached pool/token registry, in seconds
    #[serde(default = "default_registry_ttl")]
    pub registry_ttl_seconds: u64,
    /// The native/wrapped pair pool whose swap entrypoints encode direction
    pub tez_ctez_pool: String,
    /// Reference-asset tree: group 0 is hard-pegged to $1, later groups
    /// are priced transitively through earlier ones
    #[serde(default = "default_pricing_tree")]
    pub pricing_tree: Vec<Vec<String>>,
}

fn default_block_port() -> u16 {
    6024
}

fn default_reorg_lag() -> u64 {
    2
}

fn default_level_file() -> String {
    "data/level.json".to_string()
}

fn default_registry_ttl() -> u64 {
    60
}

fn default_pricing_tree() -> Vec<Vec<String>> {
    vec![
        vec!["USDt".to_string(), "USDC.e".to_string()],
        vec!["CTez".to_string()],
        vec!["uUSD".to_string(), "kUSD".to_string()],
        vec!["YOU".to_string()],
    ]
}

/// Uptime heartbeat configuration.
///
/// When a URL is set, the process GETs it periodically; a missed ping is
/// the operational signal that the pipeline is down.
#[derive(Debug, Deserialize, Clone)]
pub struct HeartbeatSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub interval_seconds: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            url: None,
            interval_seconds: default_heartbeat_interval(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    60
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub tzkt: TzktSettings,
    pub postgres: PostgresSettings,
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
