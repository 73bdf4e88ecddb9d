//! Configuration Module — process-level, TOML + environment configuration.
//!
//! This covers only process-level ambient concerns not owned by
//! `ListenerConfig`: sink tuning, structured-log level, venue
//! endpoints/timeouts, Kalshi credentials, and the manager's reload
//! cadence. `ListenerConfig`
//! records themselves are loaded through the `ConfigStore` port
//! — they are externally owned, never read from this file.

pub mod loader;

use serde::Deserialize;

/// Top-level process configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub sink: SinkConfig,
    pub polymarket: PolymarketConfig,
    pub kalshi: KalshiConfig,
    pub manager: ManagerConfig,
    pub metrics: MetricsConfig,
    pub config_store: ConfigStoreConfig,
}

/// Structured logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" for production, "pretty" for local development.
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Sink batching/retry tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Directory the default JSONL `RecordWriter` writes under.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Polymarket endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PolymarketConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_base_url: String,
    #[serde(default = "default_polymarket_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_timeout_s")]
    pub request_timeout_s: u64,
    #[serde(default = "default_discovery_page_size")]
    pub discovery_page_size: u32,
}

/// Kalshi endpoints + RSA-PSS credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiConfig {
    #[serde(default = "default_kalshi_rest_url")]
    pub rest_base_url: String,
    #[serde(default = "default_kalshi_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_timeout_s")]
    pub request_timeout_s: u64,
    /// `KALSHI-ACCESS-KEY` header value.
    pub key_id: Option<String>,
    /// Path to a PEM-encoded RSA private key.
    pub private_key_path: Option<String>,
    /// Inline PEM, used when `private_key_path` is not set.
    pub private_key_pem: Option<String>,
}

/// Listener Manager cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_reload_interval_s")]
    pub reload_interval_s: u64,
    #[serde(default = "default_shutdown_deadline_s")]
    pub shutdown_deadline_s: u64,
}

/// Prometheus + health server.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub bind_address: String,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

/// Where the (pluggable) `ConfigStore` reads listener configs from.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigStoreConfig {
    #[serde(default = "default_listener_configs_path")]
    pub path: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_flush_interval_ms() -> u64 {
    1_000
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_polymarket_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}
fn default_kalshi_rest_url() -> String {
    "https://api.elections.kalshi.com/trade-api/v2".to_string()
}
fn default_kalshi_ws_url() -> String {
    "wss://api.elections.kalshi.com/trade-api/ws/v2".to_string()
}
fn default_timeout_s() -> u64 {
    30
}
fn default_discovery_page_size() -> u32 {
    100
}
fn default_reload_interval_s() -> u64 {
    60
}
fn default_shutdown_deadline_s() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_health_port() -> u16 {
    8080
}
fn default_listener_configs_path() -> String {
    "listeners".to_string()
}
