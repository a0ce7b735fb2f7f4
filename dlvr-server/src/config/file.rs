//! TOML file configuration structures.
//!
//! These structs directly map to the `dlvr-config.toml` file format. Every
//! section is optional; missing values fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Lifecycle simulation section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Wall-clock seconds per simulated minute. Lower it to speed up demos.
    #[serde(default = "default_minute_secs")]
    pub minute_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            minute_secs: default_minute_secs(),
        }
    }
}

fn default_minute_secs() -> f64 {
    60.0
}

/// Notification transport section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_presence_window_secs")]
    pub presence_window_secs: u64,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            presence_window_secs: default_presence_window_secs(),
            page_limit: default_page_limit(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_presence_window_secs() -> u64 {
    10
}

fn default_page_limit() -> usize {
    100
}

/// Out-of-band alert section. Reloaded on SIGHUP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Push gateway URL. Alerts are disabled when absent.
    #[serde(default)]
    pub endpoint: Option<Url>,
    #[serde(default = "default_alert_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_alert_timeout_secs(),
        }
    }
}

fn default_alert_timeout_secs() -> u64 {
    5
}

/// Where notifications are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    /// PostgreSQL at `DATABASE_URL`.
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}
