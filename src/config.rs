//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - DeviceConfig: simulate flag, port hint, serial parameters.
//!     - PollingConfig: monitor cadence per transport, stop bound.
//!     - HistoryConfig: ring buffer capacity.
//!     - ThresholdConfig: initial alert thresholds.
//!     - LoggingConfig: log level, per-sample debug output.
//!
//! every section and field has a default, so a partial file is fine.
//!
//! ==============================================================================

use crate::domain::Thresholds;
use crate::serial::{SerialSettings, DEFAULT_BAUD_RATE, DEFAULT_SIGNATURES};

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// environment variables that force the synthetic transport
pub const SIMULATE_ENV_VARS: [&str; 2] = ["RENDER", "TELEMETRY_SIMULATE"];

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub device: DeviceConfig,
    pub polling: PollingConfig,
    pub history: HistoryConfig,
    pub thresholds: ThresholdConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    /// use the simulator instead of a serial board
    pub simulate: bool,
    /// preferred channel, e.g. "/dev/ttyACM0"; discovery when absent
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_secs: u64,
    pub settle_delay_ms: u64,
    /// substrings matched (case-insensitively) against channel descriptions
    pub vendor_signatures: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_secs: 10,
            settle_delay_ms: 2000,
            vendor_signatures: DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub real_interval_seconds: u64,
    pub synthetic_interval_seconds: u64,
    /// how long stop waits for the monitor task before abandoning it
    pub stop_timeout_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            real_interval_seconds: 5,
            synthetic_interval_seconds: 2,
            stop_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: crate::history::DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ThresholdConfig {
    pub gas: u32,
    pub water_critical_cm: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            gas: t.gas,
            water_critical_cm: t.water_critical_cm,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: false,
        }
    }
}

/// what `load_or_default` found; logged once tracing is up
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// file existed but could not be used
    Fallback { path: PathBuf, error: String },
    Defaults,
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: HostConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        Ok(config)
    }

    /// first existing candidate among config/host.toml and ../config/host.toml
    pub fn locate() -> Option<PathBuf> {
        [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }

    /// Load with default fallback
    pub fn load_or_default() -> (Self, ConfigSource) {
        match Self::locate() {
            Some(path) => match Self::load(&path) {
                Ok(config) => (config, ConfigSource::File(path)),
                Err(e) => (
                    Self::default(),
                    ConfigSource::Fallback {
                        path,
                        error: format!("{:#}", e),
                    },
                ),
            },
            None => (Self::default(), ConfigSource::Defaults),
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// any simulate variable set to a truthy value forces the simulator
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let forced = SIMULATE_ENV_VARS
            .iter()
            .filter_map(|&key| lookup(key))
            .any(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"));
        if forced {
            self.device.simulate = true;
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            gas: self.thresholds.gas,
            water_critical_cm: self.thresholds.water_critical_cm,
        }
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.device.baud_rate,
            read_timeout: Duration::from_secs(self.device.read_timeout_secs),
            settle_delay: Duration::from_millis(self.device.settle_delay_ms),
            poll_interval: Duration::from_secs(self.polling.real_interval_seconds),
            signatures: self.device.vendor_signatures.clone(),
        }
    }

    pub fn synthetic_interval(&self) -> Duration {
        Duration::from_secs(self.polling.synthetic_interval_seconds)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.polling.stop_timeout_seconds)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let mode = if self.device.simulate { "synthetic" } else { "serial" };
        let interval = if self.device.simulate {
            self.polling.synthetic_interval_seconds
        } else {
            self.polling.real_interval_seconds
        };
        println!("┌─────────────────────────────────────────┐");
        println!("│           HOST CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Mode: {:<34}│", mode);
        println!("│ Port: {:<34}│", self.device.port.as_deref().unwrap_or("auto"));
        println!("│ Poll Interval: {:<25}│", format!("{}s", interval));
        println!("│ History: {:<31}│", self.history.capacity);
        println!("│ Gas Threshold: {:<25}│", self.thresholds.gas);
        println!("│ Water Critical: {:<24}│", format!("{} cm", self.thresholds.water_critical_cm));
        println!("│ Log Level: {:<29}│", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
