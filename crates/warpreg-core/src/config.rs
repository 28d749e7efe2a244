//! warpreg.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::addr::{is_valid_url, url_from_host_port};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub server: ServerConfig,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret expected in `X-API-Key`, both on inbound API calls and
    /// on outbound worker probes.
    pub api_key: String,
}

/// Health sweep and probe parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Time between sweeps (e.g. "10s").
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Worker liveness path.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-attempt timeout.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Probe attempts before a worker is evicted.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Fixed delay between failed attempts.
    #[serde(default = "default_backoff")]
    pub backoff: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Embedded redb database.
    #[default]
    Redb,
    /// Single JSON document on disk.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_interval() -> String {
    "10s".to_string()
}

fn default_endpoint() -> String {
    "/healthcheck".to_string()
}

fn default_timeout() -> String {
    "5s".to_string()
}

fn default_attempts() -> u32 {
    4
}

fn default_backoff() -> String {
    "100ms".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("warpreg.redb")
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            endpoint: default_endpoint(),
            timeout: default_timeout(),
            attempts: default_attempts(),
            backoff: default_backoff(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(10))
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn backoff(&self) -> Duration {
        parse_duration(&self.backoff).unwrap_or(Duration::from_millis(100))
    }
}

impl RegistryConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal in-process config, mostly useful for tests and embedding.
    pub fn with_api_key(api_key: &str) -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig {
                port: default_port(),
                api_key: api_key.to_string(),
            },
            health: HealthSettings::default(),
            store: StoreConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("server.api_key must not be empty".into()));
        }
        if self.health.attempts == 0 {
            return Err(ConfigError::Invalid("health.attempts must be at least 1".into()));
        }
        if !self.health.endpoint.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "health.endpoint must start with '/': {}",
                self.health.endpoint
            )));
        }
        // Probes are sent to this path on every worker; a path that cannot
        // form a URL would fail every probe and evict every worker.
        let probe_url = format!("{}{}", url_from_host_port("worker", 1), self.health.endpoint);
        if !is_valid_url(&probe_url) {
            return Err(ConfigError::Invalid(format!(
                "health.endpoint is not a valid URL path: {:?}",
                self.health.endpoint
            )));
        }
        for (field, value) in [
            ("health.interval", &self.health.interval),
            ("health.timeout", &self.health.timeout),
            ("health.backoff", &self.health.backoff),
        ] {
            match parse_duration(value) {
                Some(d) if field == "health.interval" && d.is_zero() => {
                    return Err(ConfigError::Invalid("health.interval must be non-zero".into()));
                }
                Some(_) => {}
                None => {
                    return Err(ConfigError::Invalid(format!("{field}: bad duration {value:?}")));
                }
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
