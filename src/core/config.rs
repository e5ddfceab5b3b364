//! Configuration parsing and validation.
//!
//! Braid configuration is loaded from TOML files by the embedding service.
//! All values have defaults, so an empty document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Braid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Aggregation layer configuration.
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Aggregation layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Maximum number of partition list calls in flight per request.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Page size applied when the request carries no usable `limit`.
    ///
    /// Clients must assume any list response may be truncated and follow
    /// the continue token.
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,

    /// Buffered events on the merged watch channel before backpressure.
    #[serde(default = "default_watch_channel_capacity")]
    pub watch_channel_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            default_page_limit: default_page_limit(),
            watch_channel_capacity: default_watch_channel_capacity(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_concurrency() -> usize {
    3
}

fn default_page_limit() -> usize {
    100_000
}

fn default_watch_channel_capacity() -> usize {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        if self.aggregator.concurrency == 0 {
            anyhow::bail!("aggregator.concurrency must be > 0");
        }

        if self.aggregator.default_page_limit == 0 {
            anyhow::bail!("aggregator.default_page_limit must be > 0");
        }

        if self.aggregator.watch_channel_capacity == 0 {
            anyhow::bail!("aggregator.watch_channel_capacity must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }

        Ok(())
    }
}
