//! Configuration module for dlvr-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{FileConfig, StoreBackend};
use dlvr_core::config::{AlertConfig, SchedulerConfig, StreamConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub scheduler: SchedulerConfig,
    pub stream: StreamConfig,
    pub alerts: AlertConfig,
    pub store: StoreBackend,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, validate and convert the configuration file.
    ///
    /// A missing file is not an error; every setting has a default.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str::<FileConfig>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?self.config_path, "Config file not found, using defaults");
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let minute = config.simulation.minute_secs;
    if !minute.is_finite() || minute <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "simulation.minute_secs must be a positive number, got {minute}"
        )));
    }
    if config.stream.heartbeat_secs == 0 {
        return Err(ConfigError::ValidationError(
            "stream.heartbeat_secs must be at least 1".to_string(),
        ));
    }
    if config.stream.page_limit == 0 {
        return Err(ConfigError::ValidationError(
            "stream.page_limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    LoadedConfig {
        listen: file_config.server.listen,
        scheduler: SchedulerConfig {
            minute: Duration::from_secs_f64(file_config.simulation.minute_secs),
        },
        stream: StreamConfig {
            heartbeat_interval: Duration::from_secs(file_config.stream.heartbeat_secs),
            presence_window: Duration::from_secs(file_config.stream.presence_window_secs),
            page_limit: file_config.stream.page_limit,
        },
        alerts: AlertConfig {
            endpoint: file_config.alerts.endpoint,
            request_timeout: Duration::from_secs(file_config.alerts.timeout_secs),
        },
        store: file_config.store.backend,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "dlvr-config-{name}-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_applies_listen_override() {
        let path = write_config("override", "[simulation]\nminute_secs = 2.0\n");
        let override_addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::new(&path, Some(override_addr)).load().unwrap();
        assert_eq!(loaded.listen, override_addr);
        assert_eq!(loaded.scheduler.minute, Duration::from_secs(2));
        assert_eq!(loaded.stream.heartbeat_interval, Duration::from_secs(30));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loaded = ConfigLoader::new("/nonexistent/dlvr-config.toml", None)
            .load()
            .unwrap();
        assert_eq!(loaded.listen.port(), 8080);
        assert_eq!(loaded.scheduler, SchedulerConfig::default());
        assert_eq!(loaded.store, StoreBackend::Memory);
    }

    #[test]
    fn test_rejects_non_positive_minute() {
        let path = write_config("minute", "[simulation]\nminute_secs = 0.0\n");
        let err = ConfigLoader::new(&path, None).load().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        std::fs::remove_file(path).unwrap();
    }
}
