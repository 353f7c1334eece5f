//! Client configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `#[serde(default = ...)]` functions below
//! 2. **Config file**: TOML file named by the `CONCORD_CONFIG` env var
//! 3. **Environment variables**: `CONCORD__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ClientConfig`]: relay endpoint, providers, quorums, timeout
//! - [`HttpClientConfig`]: HTTP concurrency and retries
//! - [`LoggingConfig`]: log level and format
//! - `keys`: extra or replacement provider public keys
//!
//! # Example
//!
//! ```toml
//! [client]
//! url = "https://relay.example.com/rpc"
//! api_key = "my-dkey"
//! provider_ids = ["p2p-01", "attestant", "p-ops"]
//! quorum_of = 2
//! quorum_from = 3
//! timeout_ms = 5000
//!
//! [keys]
//! my-node = "04..."
//! ```

use crate::transport::HttpClientConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};

/// Which transport the client talks to the relay with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    Websocket,
}

/// Relay client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay HTTP endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Relay WebSocket endpoint, required when `transport = "websocket"`.
    #[serde(default)]
    pub ws_url: Option<String>,

    #[serde(default)]
    pub transport: TransportKind,

    /// Credential sent as `dkey` with every request.
    #[serde(default)]
    pub api_key: String,

    /// Providers to address. Empty lets the relay choose.
    #[serde(default)]
    pub provider_ids: Vec<String>,

    /// Identical replies needed to trust a result. Defaults to `quorum_from`, else 1.
    #[serde(default)]
    pub quorum_of: Option<u32>,

    /// Providers that must answer each subrequest. Defaults to `quorum_of`, else 1.
    #[serde(default)]
    pub quorum_from: Option<u32>,

    /// Deadline for a whole call, in milliseconds. Defaults to `5000`.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Accept replies without checking provider signatures. Defaults to `false`.
    #[serde(default)]
    pub skip_signature_check: bool,

    /// Network label forwarded to the relay. Defaults to `"ethereum"`.
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_url() -> String {
    "https://main.drpc.org".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_network() -> String {
    "ethereum".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ws_url: None,
            transport: TransportKind::default(),
            api_key: String::new(),
            provider_ids: Vec::new(),
            quorum_of: None,
            quorum_from: None,
            timeout_ms: default_timeout_ms(),
            skip_signature_check: false,
            network: default_network(),
        }
    }
}

impl ClientConfig {
    /// Effective agreement threshold.
    #[must_use]
    pub fn quorum_of(&self) -> u32 {
        self.quorum_of.or(self.quorum_from).unwrap_or(1)
    }

    /// Effective liveness threshold, sent to the relay as `quorum`.
    #[must_use]
    pub fn quorum_from(&self) -> u32 {
        self.quorum_from.or(self.quorum_of).unwrap_or(1)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates client settings.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("Invalid relay URL: {}", self.url));
        }
        if let Some(ref ws_url) = self.ws_url {
            if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
                return Err(format!("Invalid relay WebSocket URL: {ws_url}"));
            }
        }
        if self.transport == TransportKind::Websocket && self.ws_url.is_none() {
            return Err("WebSocket transport requires ws_url".to_string());
        }

        if self.quorum_of == Some(0) || self.quorum_from == Some(0) {
            return Err("Quorum must be greater than 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        // Finalization stops at quorum_from providers, so a larger quorum_of is unreachable.
        if self.quorum_of() > self.quorum_from() {
            return Err(format!(
                "quorum_of ({}) cannot exceed quorum_from ({})",
                self.quorum_of(),
                self.quorum_from()
            ));
        }
        if !self.provider_ids.is_empty() && self.provider_ids.len() < self.quorum_from() as usize {
            return Err("Not enough provider_ids for quorum".to_string());
        }

        Ok(())
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root configuration.
///
/// Loaded with the `CONCORD` prefix for environment overrides using `__` as a separator,
/// e.g. `CONCORD__CLIENT__TIMEOUT_MS=2000`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub http: HttpClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider id to hex public key, merged over the built-in table.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error; defaults and environment apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("CONCORD")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("client.provider_ids")
                    .try_parsing(true),
            )
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml`, or the path in `CONCORD_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONCORD_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        self.client.validate()?;

        if self.http.concurrent_limit == 0 {
            return Err("HTTP concurrent limit must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        for (provider_id, key) in &self.keys {
            if key.len() % 2 != 0 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(format!("Public key for {provider_id} is not valid hex"));
            }
        }

        Ok(())
    }
}
