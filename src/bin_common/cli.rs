//! CLI utilities for binaries
//!
//! Handles configuration loading and environment variables
//! for all binary executables.

use anyhow::Context;
use marketstream::StreamConfig;
use std::path::PathBuf;
use tracing::warn;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Stream configuration (config/stream.yaml)
    Stream,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Stream => "config/stream.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable that overrides this config type's path
    ///
    /// An explicit custom path is never overridden.
    pub fn env_var_name(&self) -> Option<&str> {
        match self {
            ConfigType::Stream => Some("STREAM_CONFIG_PATH"),
            ConfigType::Custom(_) => None,
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use dashboard_stream::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Stream);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    config_type
        .env_var_name()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| config_type.default_path().to_string())
        .into()
}

/// Load the stream config from the resolved path
///
/// A missing file falls back to defaults plus environment overrides; a file
/// that exists but does not parse or validate is an error.
pub fn load_stream_config(config_type: ConfigType) -> anyhow::Result<StreamConfig> {
    let path = load_config_from_env(config_type);

    if !path.exists() {
        warn!("Config file {:?} not found, using defaults", path);
        return StreamConfig::from_env().context("invalid stream configuration");
    }

    StreamConfig::load(&path).with_context(|| format!("failed to load {:?}", path))
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
