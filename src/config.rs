//! Configuration management for Ratefold.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RateFoldError, Result};
use crate::ratelimit::{DEFAULT_DEPTH, MAX_DEPTH};

/// Prefix for environment overrides, e.g. `RATEFOLD_LIMITER__DEPTH=6`.
pub const ENV_PREFIX: &str = "RATEFOLD";

/// Top-level settings for the replay tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Limiter tuning
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Path to the restriction file
    #[serde(default)]
    pub restrictions_path: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Tuning knobs for [`crate::ratelimit::RateLimiter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Number of fold levels per counter
    #[serde(default = "default_depth")]
    pub depth: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
        }
    }
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

impl LimiterConfig {
    /// Create a configuration with the given depth.
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 || self.depth > MAX_DEPTH {
            return Err(RateFoldError::Config(format!(
                "depth must be between 1 and {}, got {}",
                MAX_DEPTH, self.depth
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Settings {
    /// Load settings from an optional file, then apply `RATEFOLD_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    /// Load settings from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RateFoldError::Config(e.to_string()))?;
        settings.limiter.validate()?;
        Ok(settings)
    }
}
