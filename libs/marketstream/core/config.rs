//! Stream configuration
//!
//! Loaded from YAML with environment overrides for the values that differ
//! between deployments (endpoint and feed tier).

use crate::codec::WsMessage;
use crate::reconnect::ExponentialBackoff;
use crate::transport::Feed;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default upstream endpoint; the feed name is appended as the last segment
pub const DEFAULT_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2";

/// Default number of history entries kept per symbol
pub const DEFAULT_HISTORY_LENGTH: usize = 100;

pub const URL_ENV_VAR: &str = "MARKET_STREAM_URL";
pub const FEED_ENV_VAR: &str = "MARKET_STREAM_FEED";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reconnection backoff settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fraction of each delay that may be randomly shaved off (0.0 - 1.0)
    #[serde(default)]
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    pub fn strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(self.jitter)
    }
}

/// Periodic keep-alive frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    pub payload: String,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn message(&self) -> WsMessage {
        WsMessage::Text(self.payload.clone())
    }
}

/// Market-data stream configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub feed: Feed,

    /// Bounded history length per symbol
    #[serde(default = "default_history_length")]
    pub history_length: usize,

    /// Failed opens tolerated before `initialize()` reports failure
    #[serde(default = "default_initial_attempts")]
    pub initial_attempts: usize,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub heartbeat: Option<HeartbeatConfig>,

    /// Treat the session as dead after this long without an inbound frame
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            feed: Feed::default(),
            history_length: DEFAULT_HISTORY_LENGTH,
            initial_attempts: default_initial_attempts(),
            backoff: BackoffConfig::default(),
            heartbeat: None,
            idle_timeout_secs: None,
        }
    }
}

impl StreamConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path.as_ref())?;
        let mut config = Self::from_yaml_str(&yaml_content)?;
        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            "Loaded stream config from {:?} (feed: {}, history: {})",
            config_path.as_ref(),
            config.feed,
            config.history_length
        );
        Ok(config)
    }

    /// Parse configuration from YAML without touching the environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StreamConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(URL_ENV_VAR) {
            self.url = url;
        }
        if let Ok(feed) = std::env::var(FEED_ENV_VAR) {
            self.feed = feed
                .parse()
                .map_err(|e| ConfigError::ValidationError(format!("{}: {}", FEED_ENV_VAR, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("url must not be empty".into()));
        }
        if self.history_length == 0 {
            return Err(ConfigError::ValidationError(
                "history_length must be greater than 0".into(),
            ));
        }
        if self.initial_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "initial_attempts must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::ValidationError(format!(
                "backoff.jitter must be within [0, 1], got {}",
                self.backoff.jitter
            )));
        }
        if self.backoff.max_delay_ms < self.backoff.initial_delay_ms {
            return Err(ConfigError::ValidationError(
                "backoff.max_delay_ms must be >= backoff.initial_delay_ms".into(),
            ));
        }
        if let Some(ref heartbeat) = self.heartbeat {
            if heartbeat.interval_secs == 0 {
                return Err(ConfigError::ValidationError(
                    "heartbeat.interval_secs must be greater than 0".into(),
                ));
            }
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "idle_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

fn default_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_history_length() -> usize {
    DEFAULT_HISTORY_LENGTH
}

fn default_initial_attempts() -> usize {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}
