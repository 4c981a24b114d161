//! Relay configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub app: AppSettings,
    pub listen: ListenConfig,
    pub upstream: UpstreamConfig,
    pub session: SessionConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(()),
        }
    }
}

/// WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Route the WebSocket upgrade is served on
    #[serde(default = "default_path")]
    pub path: String,
}

impl ListenConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream TCP peer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// `host:port` dialed once per session
    pub address: String,
    /// Bound on the dial; `None` waits as long as the OS does
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout_secs: None,
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Per-session forwarding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Maximum bytes read from the upstream per binary message
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Idle bound on each direction's next read; `None` forwards until closed
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// Admission limit; `None` accepts every client
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

impl SessionConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            idle_timeout_secs: None,
            max_sessions: None,
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "stream-relay".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8855
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_chunk_size() -> usize {
    4096
}

impl RelayConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `UPSTREAM_ADDR` is missing or any variable has an invalid value
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default(),
            },
            listen: ListenConfig {
                host: lookup("RELAY_HOST").unwrap_or_else(default_host),
                port: parse_var(&lookup, "RELAY_PORT")?.unwrap_or_else(default_port),
                path: lookup("RELAY_PATH").unwrap_or_else(default_path),
            },
            upstream: UpstreamConfig {
                address: lookup("UPSTREAM_ADDR").ok_or(ConfigError::MissingVar("UPSTREAM_ADDR"))?,
                connect_timeout_secs: parse_var(&lookup, "UPSTREAM_CONNECT_TIMEOUT_SECS")?,
            },
            session: SessionConfig {
                chunk_size: parse_var(&lookup, "RELAY_CHUNK_SIZE")?
                    .unwrap_or_else(default_chunk_size),
                idle_timeout_secs: parse_var(&lookup, "RELAY_IDLE_TIMEOUT_SECS")?,
                max_sessions: parse_var(&lookup, "RELAY_MAX_SESSIONS")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that parsing alone cannot catch
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.listen.path.starts_with('/') {
            return Err(ConfigError::InvalidValue(
                "RELAY_PATH",
                format!("{} (must start with '/')", self.listen.path),
            ));
        }

        let has_port = self
            .upstream
            .address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !has_port {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_ADDR",
                format!("{} (expected host:port)", self.upstream.address),
            ));
        }

        if self.session.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("RELAY_CHUNK_SIZE", "0".to_string()));
        }

        if self.session.max_sessions == Some(0) {
            return Err(ConfigError::InvalidValue("RELAY_MAX_SESSIONS", "0".to_string()));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
