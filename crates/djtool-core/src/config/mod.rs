//! Configuration module for djtool core.
//!
//! Configuration is read from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a working setup:
//!
//! ```toml
//! [server]
//! address = "127.0.0.1:50051"
//! enable_grpc_web = true
//! heartbeat_interval_ms = 1000
//!
//! [session]
//! liveness_window_ms = 3000
//! max_retries = 5
//! unary_timeout_ms = 2000
//!
//! [session.backoff]
//! base_ms = 250
//! multiplier = 2.0
//! max_delay_ms = 10000
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DjtoolError, Result};

/// Environment variable naming a TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "DJTOOL_CONFIG";

/// Environment variable overriding `server.address`.
pub const ADDRESS_ENV: &str = "DJTOOL_ADDRESS";

/// Daemon heartbeat cadence.
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Heartbeat intervals that may pass before a connection is considered stale.
const LIVENESS_MULTIPLIER: u64 = 3;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address to bind the gRPC server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// The address to bind the gRPC-Web server to (optional).
    #[serde(default)]
    pub web_address: Option<SocketAddr>,
    /// Enable gRPC-Web support.
    #[serde(default = "default_true")]
    pub enable_grpc_web: bool,
    /// Interval between heartbeats on every open session stream.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50051))
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

impl ServerConfig {
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Check that the daemon can run with these values.
    ///
    /// # Errors
    ///
    /// Returns [`DjtoolError::Config`] if the heartbeat interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(DjtoolError::Config("server.heartbeat_interval_ms must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            web_address: None,
            enable_grpc_web: true,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

/// Reconnection backoff: `base * multiplier^(retry - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_backoff_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max_delay_ms() -> u64 {
    10_000
}

impl BackoffConfig {
    #[must_use]
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            multiplier: default_backoff_multiplier(),
            max_delay_ms: default_backoff_max_delay_ms(),
        }
    }
}

/// Client-side session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Longest gap between heartbeats before the connection is considered stale.
    #[serde(default = "default_liveness_window_ms")]
    pub liveness_window_ms: u64,
    /// Reconnection attempts after a failure before the session gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for the unary `Disconnect` call.
    #[serde(default = "default_unary_timeout_ms")]
    pub unary_timeout_ms: u64,
    /// Events buffered per subscriber before the slowest one starts losing them.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Reconnection backoff policy.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_liveness_window_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS * LIVENESS_MULTIPLIER
}

fn default_max_retries() -> u32 {
    5
}

fn default_unary_timeout_ms() -> u64 {
    2_000
}

fn default_event_buffer() -> usize {
    256
}

impl SessionConfig {
    #[must_use]
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    #[must_use]
    pub fn unary_timeout(&self) -> Duration {
        Duration::from_millis(self.unary_timeout_ms)
    }

    /// Check that the values describe a usable policy.
    ///
    /// # Errors
    ///
    /// Returns [`DjtoolError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.liveness_window_ms == 0 {
            return Err(DjtoolError::Config("session.liveness_window_ms must be non-zero".into()));
        }
        if self.unary_timeout_ms == 0 {
            return Err(DjtoolError::Config("session.unary_timeout_ms must be non-zero".into()));
        }
        if self.event_buffer == 0 {
            return Err(DjtoolError::Config("session.event_buffer must be non-zero".into()));
        }
        if !self.backoff.multiplier.is_finite() || self.backoff.multiplier < 1.0 {
            return Err(DjtoolError::Config(format!(
                "session.backoff.multiplier must be >= 1.0, got {}",
                self.backoff.multiplier
            )));
        }
        if self.backoff.base_ms > self.backoff.max_delay_ms {
            return Err(DjtoolError::Config(format!(
                "session.backoff.base_ms ({}) exceeds max_delay_ms ({})",
                self.backoff.base_ms, self.backoff.max_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_window_ms: default_liveness_window_ms(),
            backoff: BackoffConfig::default(),
            max_retries: default_max_retries(),
            unary_timeout_ms: default_unary_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Root configuration for djtool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate both the server and the session sections.
    ///
    /// # Errors
    ///
    /// Returns [`DjtoolError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.session.validate()
    }

    /// Load configuration from the file named by `DJTOOL_CONFIG` (if set),
    /// then apply the `DJTOOL_ADDRESS` override.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, the address
    /// override is not a socket address, or validation fails.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Ok(address) = std::env::var(ADDRESS_ENV) {
            config.server.address = address.parse()?;
            debug!(address = %config.server.address, "Server address overridden from environment");
        }

        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse and validate a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML for [`Config`] or
    /// validation fails.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "127.0.0.1:50051".parse().unwrap());
        assert!(config.enable_grpc_web);
        assert_eq!(config.web_address, None);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.liveness_window(), Duration::from_secs(3));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.unary_timeout(), Duration::from_secs(2));
        assert_eq!(config.backoff.base(), Duration::from_millis(250));
        assert_eq!(config.backoff.max_delay(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_liveness_window_spans_several_heartbeats() {
        let config = Config::default();
        assert!(config.session.liveness_window() > config.server.heartbeat_interval() * 2);
    }

    #[test]
    fn test_config_deserialize_minimal() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_deserialize_full() {
        let toml = r#"
            [server]
            address = "0.0.0.0:8080"
            web_address = "0.0.0.0:8081"
            enable_grpc_web = false
            heartbeat_interval_ms = 500

            [session]
            liveness_window_ms = 1500
            max_retries = 2
            unary_timeout_ms = 100

            [session.backoff]
            base_ms = 50
            multiplier = 3.0
            max_delay_ms = 400
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.server.web_address, Some("0.0.0.0:8081".parse().unwrap()));
        assert!(!config.server.enable_grpc_web);
        assert_eq!(config.server.heartbeat_interval_ms, 500);
        assert_eq!(config.session.liveness_window_ms, 1500);
        assert_eq!(config.session.max_retries, 2);
        assert_eq!(config.session.unary_timeout_ms, 100);
        assert_eq!(config.session.backoff.base_ms, 50);
        assert!((config.session.backoff.multiplier - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.session.backoff.max_delay_ms, 400);
        assert_eq!(config.session.event_buffer, 256);
    }

    #[test]
    fn test_config_partial_backoff_keeps_defaults() {
        let config = Config::from_toml_str("[session.backoff]\nbase_ms = 100\n").unwrap();
        assert_eq!(config.session.backoff.base_ms, 100);
        assert_eq!(config.session.backoff.max_delay_ms, 10_000);
    }

    #[test]
    fn test_config_rejects_zero_liveness_window() {
        let err = Config::from_toml_str("[session]\nliveness_window_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("liveness_window_ms"));
    }

    #[test]
    fn test_config_rejects_zero_heartbeat_interval() {
        let err = Config::from_toml_str("[server]\nheartbeat_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, DjtoolError::Config(_)));
        assert!(err.to_string().contains("heartbeat_interval_ms"));
    }

    #[test]
    fn test_server_config_validate() {
        assert!(ServerConfig::default().validate().is_ok());
        let config = ServerConfig { heartbeat_interval_ms: 0, ..ServerConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_shrinking_backoff() {
        let err = Config::from_toml_str("[session.backoff]\nmultiplier = 0.5\n").unwrap_err();
        assert!(err.to_string().contains("multiplier"));
    }

    #[test]
    fn test_config_rejects_base_above_cap() {
        let toml = "[session.backoff]\nbase_ms = 5000\nmax_delay_ms = 1000\n";
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("exceeds max_delay_ms"));
    }

    #[test]
    fn test_config_rejects_invalid_toml() {
        let err = Config::from_toml_str("[server\naddress = 1").unwrap_err();
        assert!(matches!(err, DjtoolError::ConfigParse(_)));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("djtool.toml");
        std::fs::write(&path, "[server]\naddress = \"127.0.0.1:6000\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.address.port(), 6000);
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, DjtoolError::Io(_)));
    }

    #[test]
    fn test_config_serializes_back_to_toml() {
        let config = Config::default();
        let rendered = toml::to_string(&config).unwrap();
        assert_eq!(Config::from_toml_str(&rendered).unwrap(), config);
    }
}
