#![allow(dead_code)]
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::Validate;

/// Top-level application configuration. Operational knobs live here and are
/// loaded once at startup; the enforcement settings (power limit, profile,
/// priority list, ...) live in [`crate::domain::Settings`] and are owned by
/// the supervisor because they can change at runtime via the settings store.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub meter: MeterConfig,

    #[validate(nested)]
    pub charger: ChargerConfig,

    #[validate(nested)]
    pub persistence: PersistenceConfig,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

/// HTTP server configuration for the status/settings API.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("failed to parse socket address")
    }
}

/// Meter connector (C2) timing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MeterConfig {
    #[serde(default = "default_meter_poll_secs")]
    #[validate(range(min = 1, max = 300))]
    pub poll_interval_secs: u64,

    #[serde(default = "default_event_staleness_secs")]
    #[validate(range(min = 1, max = 300))]
    pub event_staleness_secs: u64,

    #[serde(default = "default_watchdog_secs")]
    #[validate(range(min = 1, max = 300))]
    pub watchdog_interval_secs: u64,

    #[serde(default = "default_silent_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub silent_timeout_secs: u64,

    #[serde(default = "default_unavailable_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub unavailable_timeout_secs: u64,
}

/// Charger adapter (C4) retry/confirmation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ChargerConfig {
    #[serde(default = "default_charger_poll_secs")]
    #[validate(range(min = 1, max = 120))]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_retries")]
    #[validate(range(min = 0, max = 10))]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
}

/// Where supervisor state is persisted: the host settings store plus an
/// on-disk JSON backup used to recover when the store is empty at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PersistenceConfig {
    #[serde(default = "default_backup_path")]
    pub backup_file_path: PathBuf,

    #[serde(default = "default_save_queue_drain_secs")]
    #[validate(range(min = 1, max = 60))]
    pub save_queue_drain_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_write_retries: u32,
}

/// Logging / observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_true() -> bool {
    true
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_meter_poll_secs() -> u64 {
    10
}
fn default_event_staleness_secs() -> u64 {
    8
}
fn default_watchdog_secs() -> u64 {
    10
}
fn default_silent_timeout_secs() -> u64 {
    60
}
fn default_unavailable_timeout_secs() -> u64 {
    30
}
fn default_charger_poll_secs() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_confirmation_timeout_ms() -> u64 {
    60_000
}
fn default_save_queue_drain_secs() -> u64 {
    3
}
fn default_backup_path() -> PathBuf {
    PathBuf::from("loadguard-state-backup.json")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/<environment>.toml` (or `config/development.toml` if none given)
    /// 3. Environment variables with an `LG__` prefix, double-underscore nested
    ///    (`LG__SERVER__PORT` -> `server.port`)
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    pub fn load_with_env(environment: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Some(env) = environment {
            figment = figment.merge(Toml::file(format!("config/{}.toml", env)));
        } else {
            figment = figment.merge(Toml::file("config/development.toml").nested());
        }

        figment = figment.merge(Env::prefixed("LG__").split("__"));

        let config: AppConfig = figment.extract().context("failed to parse configuration")?;
        config.validate().context("configuration validation failed")?;
        Ok(config)
    }

    pub fn validate_config(self) -> Result<Self> {
        self.validate().context("configuration validation failed")?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_socket_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 10,
            enable_cors: true,
        };
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn meter_config_defaults_validate() {
        let config = MeterConfig {
            poll_interval_secs: default_meter_poll_secs(),
            event_staleness_secs: default_event_staleness_secs(),
            watchdog_interval_secs: default_watchdog_secs(),
            silent_timeout_secs: default_silent_timeout_secs(),
            unavailable_timeout_secs: default_unavailable_timeout_secs(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn charger_config_rejects_out_of_range_retries() {
        let config = ChargerConfig {
            poll_interval_secs: 5,
            max_retries: 50,
            retry_base_delay_ms: 1000,
            confirmation_timeout_ms: 60_000,
        };
        assert!(config.validate().is_err());
    }
}
