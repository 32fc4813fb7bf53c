//! Configuration types for stork-relay

use crate::telemetry::LogFormat;
use crate::upstream::{UpstreamSettings, STORK_WS_URL};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the upstream credential
pub const CREDENTIAL_ENV: &str = "STORK_API_KEY";
/// Environment variable overriding the listening port
pub const PORT_ENV: &str = "RELAY_PORT";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Missing credential: set STORK_API_KEY")]
    MissingCredential,
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Upstream credential, only ever read from the environment
    #[serde(skip)]
    pub credential: Option<String>,
}

/// Upstream feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Feed WebSocket endpoint
    #[serde(default = "default_url")]
    pub url: String,

    /// Symbols named in the subscription request
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Symbol whose price is relayed downstream
    #[serde(default = "default_price_symbol")]
    pub price_symbol: String,

    /// Keepalive ping interval (seconds)
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Pong wait before the connection is considered dead (seconds)
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    /// Event channel capacity
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_url() -> String {
    STORK_WS_URL.to_string()
}
fn default_symbols() -> Vec<String> {
    vec!["BTCUSD".to_string()]
}
fn default_price_symbol() -> String {
    "BTCUSD".to_string()
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_pong_timeout_secs() -> u64 {
    10
}
fn default_buffer_size() -> usize {
    1024
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            symbols: default_symbols(),
            price_symbol: default_price_symbol(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Downstream listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-client outbound queue; frames beyond it are dropped
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8081
}
fn default_client_buffer() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_buffer: default_client_buffer(),
        }
    }
}

impl RelayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply `.env` and process environment overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Missing .env is fine
        dotenvy::dotenv().ok();
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(CREDENTIAL_ENV).filter(|k| !k.trim().is_empty()) {
            self.credential = Some(key.trim().to_string());
        }

        if let Some(port) = lookup(PORT_ENV) {
            self.relay.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: PORT_ENV,
                value: port.clone(),
            })?;
        }

        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.symbols.is_empty() {
            return Err(ConfigError::Invalid(
                "upstream.symbols must not be empty".to_string(),
            ));
        }
        if self.upstream.price_symbol.is_empty() {
            return Err(ConfigError::Invalid(
                "upstream.price_symbol must not be empty".to_string(),
            ));
        }
        if self.upstream.buffer_size == 0 || self.relay.client_buffer == 0 {
            return Err(ConfigError::Invalid(
                "buffer sizes must be greater than zero".to_string(),
            ));
        }
        if self.upstream.ping_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream.ping_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.upstream.pong_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream.pong_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.upstream.symbols.contains(&self.upstream.price_symbol) {
            tracing::warn!(
                price_symbol = %self.upstream.price_symbol,
                symbols = ?self.upstream.symbols,
                "Relayed symbol is not in the subscription list"
            );
        }
        Ok(())
    }

    /// The upstream credential; required to run the relay
    pub fn credential(&self) -> Result<&str, ConfigError> {
        self.credential
            .as_deref()
            .ok_or(ConfigError::MissingCredential)
    }

    /// Credential safe for logs: first four characters only
    pub fn masked_credential(&self) -> String {
        match &self.credential {
            Some(key) => format!("{}****", key.chars().take(4).collect::<String>()),
            None => "<unset>".to_string(),
        }
    }

    /// Build upstream client settings
    pub fn upstream_settings(&self) -> Result<UpstreamSettings, ConfigError> {
        let credential = self.credential()?;
        Ok(UpstreamSettings::new(&self.upstream.url, credential)
            .symbols(self.upstream.symbols.iter().cloned())
            .ping_interval(Duration::from_secs(self.upstream.ping_interval_secs))
            .pong_timeout(Duration::from_secs(self.upstream.pong_timeout_secs))
            .buffer_size(self.upstream.buffer_size))
    }
}
