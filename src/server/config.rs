//! Server configuration parsing.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::store::{ConnectOptions, DEFAULT_INDEX, DEFAULT_SPACE};

/// Server configuration loaded from TOML file. Every section may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Store connection settings.
    pub tarantool: TarantoolConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Server bind settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1" or "0.0.0.0").
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Apply a listen setting: `8080`, `:8080` (all interfaces) or `host:8080`.
    pub fn set_listen(&mut self, listen: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::Listen(listen.to_string());
        let listen = listen.trim();
        match listen.rsplit_once(':') {
            Some((host, port)) => {
                self.port = port.parse().map_err(|_| invalid())?;
                self.bind = if host.is_empty() {
                    "0.0.0.0".to_string()
                } else {
                    host.trim_start_matches('[').trim_end_matches(']').to_string()
                };
            }
            None => self.port = listen.parse().map_err(|_| invalid())?,
        }
        Ok(())
    }
}

/// Tarantool connection and layout.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TarantoolConfig {
    /// `host:port` of the instance.
    pub address: String,
    pub user: String,
    pub password: Option<String>,
    /// Seconds allowed for connecting and authenticating.
    pub connect_timeout_secs: u64,
    /// Space holding `[key, value]` records.
    pub space: String,
    /// Primary index on the key field.
    pub index: String,
}

impl Default for TarantoolConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3301".to_string(),
            user: "guest".to_string(),
            password: None,
            connect_timeout_secs: 5,
            space: DEFAULT_SPACE.to_string(),
            index: DEFAULT_INDEX.to_string(),
        }
    }
}

impl TarantoolConfig {
    /// Client options for this configuration.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            address: self.address.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "tarantool_kv=debug,tower_http=info".
    pub level: String,
    pub format: LogFormat,
    /// "stdout", "stderr", or a file path to append to.
    pub output: String,
    /// ANSI colors (text format on a terminal only).
    pub color: bool,
    pub timestamps: bool,
    /// Include the event target (module path).
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: "stdout".to_string(),
            color: true,
            timestamps: true,
            target: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Get the socket address string for binding.
    pub fn bind_addr(&self) -> String {
        if self.server.bind.contains(':') {
            format!("[{}]:{}", self.server.bind, self.server.port)
        } else {
            format!("{}:{}", self.server.bind, self.server.port)
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(String, std::io::Error),
    /// TOML parse error.
    Parse(toml::de::Error),
    /// Listen setting is neither a port nor `host:port`.
    Listen(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Failed to read config file '{}': {}", path, e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Listen(value) => write!(f, "Invalid listen address '{}'", value),
        }
    }
}

impl std::error::Error for ConfigError {}
