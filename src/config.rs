//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - UpstreamConfig: Where the sensor server lives and how to reconnect.
//!     - HistoryConfig: How many samples each pin's chart keeps.
//!     - ServerConfig: Where the dashboard itself listens.
//!     - LoggingConfig: Default log level and per-reading logging.
//!
//! every section and field has a default, so a partial file is fine.
//!
//! ==============================================================================

use crate::history::MAX_HISTORY_POINTS;
use crate::session::SessionConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub upstream: UpstreamConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    /// serves both GET /cache and the socket.io endpoint
    pub base_url: String,
    pub reconnect_delay_ms: u64,
    pub snapshot_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_points: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// page auto-refresh period
    pub refresh_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            reconnect_delay_ms: 1000,
            snapshot_timeout_ms: 5000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_points: MAX_HISTORY_POINTS }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            refresh_seconds: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: false,
        }
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DashboardConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback
    ///
    /// returns the path that was used, if any, so the caller can log it
    /// once the subscriber is up.
    pub fn load_or_default() -> (Self, Result<PathBuf, String>) {
        let paths = [
            PathBuf::from("config").join("dashboard.toml"),
            PathBuf::from("..").join("config").join("dashboard.toml"),
        ];

        let mut problems = Vec::new();
        for path in paths {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return (config, Ok(path)),
                    Err(e) => problems.push(format!("{}: {:#}", path.display(), e)),
                }
            }
        }

        let reason = if problems.is_empty() {
            "No config file found - using defaults".to_string()
        } else {
            format!("Failed to load {} - using defaults", problems.join("; "))
        };
        (Self::default(), Err(reason))
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.base_url()?;
        anyhow::ensure!(self.history.max_points > 0, "history.max_points must be at least 1");
        anyhow::ensure!(
            self.upstream.reconnect_delay_ms > 0,
            "upstream.reconnect_delay_ms must be positive"
        );
        Ok(())
    }

    pub fn base_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.upstream.base_url)
            .with_context(|| format!("Invalid upstream.base_url {:?}", self.upstream.base_url))
    }

    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        Ok(SessionConfig {
            base_url: self.base_url()?,
            reconnect_delay: Duration::from_millis(self.upstream.reconnect_delay_ms),
            snapshot_timeout: Duration::from_millis(self.upstream.snapshot_timeout_ms),
            max_points: self.history.max_points,
            show_sensor_data: self.logging.show_sensor_data,
        })
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        info!("┌─────────────────────────────────────────┐");
        info!("│        DASHBOARD CONFIGURATION          │");
        info!("├─────────────────────────────────────────┤");
        info!("│ Upstream: {}", self.upstream.base_url);
        info!("│ Reconnect Delay: {}ms", self.upstream.reconnect_delay_ms);
        info!("│ History Points: {}", self.history.max_points);
        info!("│ Listen: {}", self.server.bind);
        info!("│ Log Level: {}", self.logging.level);
        info!("└─────────────────────────────────────────┘");
        if self.upstream.snapshot_timeout_ms == 0 {
            warn!("upstream.snapshot_timeout_ms is 0, snapshot requests will fail immediately");
        }
    }
}
