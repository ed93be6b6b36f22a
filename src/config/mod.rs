//! # Configuration Management Module
//!
//! TOML configuration for the Microlink monitor, organized into sections:
//!
//! - [`UpsConfig`] — serial device settings (port path, baud rate)
//! - [`LinkConfig`] — protocol timing: poll cadence, probe/reset intervals,
//!   sweep-stall and liveness timeouts
//! - [`LoggingConfig`] — level and optional log file
//!
//! All values are validated on load and every section has usable defaults,
//! so a missing section never prevents startup.
//!
//! ```toml
//! [ups]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [link]
//! poll_interval_ms = 250
//! liveness_timeout_ms = 5000
//!
//! [logging]
//! level = "info"
//! ```
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::protocol::link::LinkTimeouts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ups: UpsConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsConfig {
    /// Serial device path, e.g. /dev/ttyUSB0. May be overridden by --port.
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    9600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Bounded transport wait per engine cycle; also the cadence of the
    /// time-based liveness checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Silence in INIT before a reset is issued.
    #[serde(default = "default_init_threshold_ms")]
    pub init_threshold_ms: u64,
    #[serde(default = "default_reset_cooldown_ms")]
    pub reset_cooldown_ms: u64,
    #[serde(default = "default_sweep_stall_ms")]
    pub sweep_stall_ms: u64,
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}
fn default_probe_interval_ms() -> u64 {
    2000
}
fn default_init_threshold_ms() -> u64 {
    6000
}
fn default_reset_cooldown_ms() -> u64 {
    1000
}
fn default_sweep_stall_ms() -> u64 {
    5000
}
fn default_liveness_timeout_ms() -> u64 {
    5000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            init_threshold_ms: default_init_threshold_ms(),
            reset_cooldown_ms: default_reset_cooldown_ms(),
            sweep_stall_ms: default_sweep_stall_ms(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
        }
    }
}

impl LinkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeouts(&self) -> LinkTimeouts {
        LinkTimeouts {
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            init_threshold: Duration::from_millis(self.init_threshold_ms),
            reset_cooldown: Duration::from_millis(self.reset_cooldown_ms),
            sweep_stall: Duration::from_millis(self.sweep_stall_ms),
            liveness: Duration::from_millis(self.liveness_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; when set, log lines are appended there in
    /// addition to the console (when on a TTY).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ups: UpsConfig {
                port: String::new(),
                baud_rate: default_baud_rate(),
            },
            link: LinkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("invalid config file {}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ups.baud_rate == 0 {
            return Err(anyhow!("ups.baud_rate must be non-zero"));
        }
        if self.link.poll_interval_ms == 0 {
            return Err(anyhow!("link.poll_interval_ms must be non-zero"));
        }
        if self.link.liveness_timeout_ms <= self.link.poll_interval_ms {
            return Err(anyhow!(
                "link.liveness_timeout_ms must exceed link.poll_interval_ms"
            ));
        }
        if self.link.sweep_stall_ms == 0 || self.link.reset_cooldown_ms == 0 {
            return Err(anyhow!("link timeouts must be non-zero"));
        }
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => return Err(anyhow!("unknown logging.level '{}'", other)),
        }
        Ok(())
    }

    /// Write a starter config file with defaults.
    pub async fn create_default(path: &str) -> Result<()> {
        let serialized = toml::to_string_pretty(&Config::default())?;
        fs::write(path, serialized)
            .await
            .with_context(|| format!("failed to write config file {}", path))?;
        Ok(())
    }
}
