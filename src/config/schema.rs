//! Process settings schema.
//!
//! These are the proxy's own settings, read once at startup from a TOML file.
//! The routing document itself lives in the config store (see `document`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings for the proxy process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxySettings {
    /// Listener configuration (bind address, public scheme).
    pub listener: ListenerConfig,

    /// Where the routing document is stored and watched.
    pub store: StoreConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Watch loop tuning.
    pub sync: SyncConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Scheme assumed for inbound requests when no forwarding header says otherwise.
    pub scheme: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            scheme: "http".to_string(),
        }
    }
}

/// Which store backend holds the routing document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// NATS JetStream key-value bucket.
    #[default]
    Nats,
    /// JSON file on local disk.
    File,
    /// In-process only; nothing persists.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nats" => Ok(StoreBackend::Nats),
            "file" => Ok(StoreBackend::File),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Config store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// NATS server URL.
    pub nats_url: String,

    /// Key-value bucket name.
    pub bucket: String,

    /// Key holding the routing document.
    pub key: String,

    /// Token authentication.
    pub token: Option<String>,

    /// User/password authentication.
    pub user: Option<String>,
    pub password: Option<String>,

    /// NATS credentials file (JWT + NKey seed).
    pub creds_file: Option<PathBuf>,

    /// Document path for the file backend.
    pub file_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Nats,
            nats_url: "nats://localhost:4222".to_string(),
            bucket: "proxy".to_string(),
            key: "route-config".to_string(),
            token: None,
            user: None,
            password: None,
            creds_file: None,
            file_path: PathBuf::from("route-config.json"),
        }
    }
}

/// Timeout configuration for upstream traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Watch loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// First delay before re-establishing a lost watch, in milliseconds.
    pub watch_backoff_base_ms: u64,

    /// Upper bound for the re-watch delay, in milliseconds.
    pub watch_backoff_max_ms: u64,

    /// Notifications buffered between the watch pump and the sync loop.
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watch_backoff_base_ms: 250,
            watch_backoff_max_ms: 30_000,
            channel_capacity: 64,
        }
    }
}
