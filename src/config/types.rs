//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::defaults::{
    default_bridge_url, default_connect_timeout, default_retry_base, default_retry_max,
    default_shutdown_grace, default_stable, default_username,
};
use super::listen::ListenConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },
}

/// Relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Subscriber WebSocket listener.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Upstream live-stream source.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Retry and shutdown-grace timing.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Optional HTTP endpoints (config discovery, status, metrics).
    #[serde(default)]
    pub http: HttpConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to built-in defaults
    /// when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Apply the process environment on top of the loaded file.
    ///
    /// | Variable            | Field                  |
    /// |---------------------|------------------------|
    /// | `TIKTOK_USERNAME`   | `upstream.username`    |
    /// | `PORT`              | `listen.address` port  |
    /// | `TIKTOK_BACKEND`    | `http.backend_url`     |
    /// | `TIKTOK_BRIDGE_URL` | `upstream.bridge_url`  |
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup("TIKTOK_USERNAME") {
            self.upstream.username = username;
        }
        if let Some(port) = lookup("PORT") {
            let parsed = port.trim().parse::<u16>().map_err(|_| ConfigError::Env {
                name: "PORT",
                value: port.clone(),
            })?;
            self.listen.address.set_port(parsed);
        }
        if let Some(backend) = lookup("TIKTOK_BACKEND") {
            self.http.backend_url = Some(backend);
        }
        if let Some(bridge) = lookup("TIKTOK_BRIDGE_URL") {
            self.upstream.bridge_url = bridge;
        }
        Ok(())
    }
}

/// Upstream source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Account whose live stream is relayed (e.g., "@someone").
    #[serde(default = "default_username")]
    pub username: String,
    /// WebSocket URL of the upstream bridge.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Seconds to wait for the bridge to report a joined room.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            bridge_url: default_bridge_url(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Upstream lifecycle timing.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Delay after the first failed connect attempt.
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: u64,
    /// Upper bound on the retry delay.
    #[serde(default = "default_retry_max")]
    pub retry_max_secs: u64,
    /// How long the upstream stays connected after the last subscriber leaves.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Uptime after which a session's earlier losses no longer back off.
    #[serde(default = "default_stable")]
    pub stable_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retry_base_secs: default_retry_base(),
            retry_max_secs: default_retry_max(),
            shutdown_grace_secs: default_shutdown_grace(),
            stable_secs: default_stable(),
        }
    }
}

impl LifecycleConfig {
    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn stable_period(&self) -> Duration {
        Duration::from_secs(self.stable_secs)
    }
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    /// Address for `/config`, `/status` and `/metrics`. Absent disables HTTP.
    pub address: Option<SocketAddr>,
    /// Relay URL advertised by `/config`.
    pub backend_url: Option<String>,
}

impl HttpConfig {
    /// The advertised relay URL, defaulting to the local listener port.
    pub fn backend_url(&self, listen: &ListenConfig) -> String {
        self.backend_url
            .clone()
            .unwrap_or_else(|| format!("ws://localhost:{}", listen.address.port()))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
