//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::SessionLimits;

pub const MAX_CHUNK_SIZE_BYTES: usize = 16 * 1024 * 1024;
const ENV_PREFIX: &str = "SHAREPORT_";

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "shareport")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("shareport.toml"))
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listen port, 0 lets the OS pick
    pub port: u16,
    /// Exit once the session reaches a terminal phase
    pub auto_exit: bool,
    pub auto_exit_delay_ms: u64,
    /// Bytes per read/write step when streaming
    pub chunk_size: usize,
    /// Idle interval between event-stream heartbeats
    pub heartbeat_ms: u64,
    pub log_capacity: usize,
    pub subscriber_buffer: usize,
    pub max_upload_bytes: u64,
    pub show_qr: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 0,
            auto_exit: false,
            auto_exit_delay_ms: 500,
            chunk_size: 64 * 1024,
            heartbeat_ms: 500,
            log_capacity: 100,
            subscriber_buffer: 10,
            max_upload_bytes: 10 * 1024 * 1024 * 1024,
            show_qr: true,
        }
    }
}

impl AppConfig {
    /// Rejects values that would stall or break streaming.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.chunk_size > 0, "Invalid config: chunk_size must be > 0");
        ensure!(
            self.chunk_size <= MAX_CHUNK_SIZE_BYTES,
            "Invalid config: chunk_size must be <= {MAX_CHUNK_SIZE_BYTES}"
        );
        ensure!(self.heartbeat_ms > 0, "Invalid config: heartbeat_ms must be > 0");
        ensure!(self.log_capacity > 0, "Invalid config: log_capacity must be > 0");
        ensure!(
            self.subscriber_buffer > 0,
            "Invalid config: subscriber_buffer must be > 0"
        );
        ensure!(
            self.max_upload_bytes > 0,
            "Invalid config: max_upload_bytes must be > 0"
        );
        Ok(())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn auto_exit_delay(&self) -> Duration {
        Duration::from_millis(self.auto_exit_delay_ms)
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            log_capacity: self.log_capacity,
            subscriber_buffer: self.subscriber_buffer,
        }
    }

    /// Upload body limit, saturated to the platform's usize.
    pub fn upload_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes).unwrap_or(usize::MAX)
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_exit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_qr: Option<bool>,
}

/// Loads config from defaults/file/env.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

/// Loads config using `path` as the TOML layer. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .context("Failed to load configuration")?;

    config.validate()?;

    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(auto_exit) = overrides.auto_exit {
        config.auto_exit = auto_exit;
    }
    if let Some(show_qr) = overrides.show_qr {
        config.show_qr = show_qr;
    }
    config
}
