// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Configuration module

mod settings;

pub use settings::{DetectionSettings, DomainSettings, SettingsError, SettingsStore, ThresholdSet};
pub(crate) use settings::{ensure_count, ensure_dbm, ensure_positive_ms};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::detection::SightingHistory;
use crate::sensors::{Domain, SupervisorConfig};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated sensors)
    pub demo_mode: bool,

    /// Capacity of every event bus channel
    pub event_bus_capacity: usize,

    /// Sightings kept per emitter
    pub history_capacity: usize,

    /// Scan loop supervision
    pub supervisor: SupervisorConfig,

    /// Per-domain scanner configuration
    pub scanners: ScannerConfig,

    /// Classifier thresholds and pattern switches
    pub detection: DetectionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Flockwatch".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            demo_mode: true,
            event_bus_capacity: 1024,
            history_capacity: SightingHistory::DEFAULT_CAPACITY,
            supervisor: SupervisorConfig::default(),
            scanners: ScannerConfig::default(),
            detection: DetectionSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        if self.event_bus_capacity == 0 {
            return Err(anyhow!("event_bus_capacity must be at least 1"));
        }
        if self.history_capacity == 0 {
            return Err(anyhow!("history_capacity must be at least 1"));
        }
        if self.supervisor.failure_threshold == 0 {
            return Err(anyhow!("supervisor.failure_threshold must be at least 1"));
        }
        for domain in Domain::ALL {
            let scanner = self.scanners.get(domain);
            if scanner.enabled && scanner.poll_interval_ms == 0 {
                return Err(anyhow!("scanners.{}.poll_interval_ms must be non-zero", domain));
            }
        }
        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("flockwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Scanner settings for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    pub enabled: bool,

    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl ScannerSettings {
    fn every(poll_interval_ms: u64) -> Self {
        Self { enabled: true, poll_interval_ms }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub cellular: ScannerSettings,
    pub satellite: ScannerSettings,
    pub ble: ScannerSettings,
    pub wifi: ScannerSettings,
    pub rf: ScannerSettings,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cellular: ScannerSettings::every(5_000),
            satellite: ScannerSettings::every(2_000),
            ble: ScannerSettings::every(3_000),
            wifi: ScannerSettings::every(10_000),
            rf: ScannerSettings::every(1_000),
        }
    }
}

impl ScannerConfig {
    pub fn get(&self, domain: Domain) -> &ScannerSettings {
        match domain {
            Domain::Cellular => &self.cellular,
            Domain::Satellite => &self.satellite,
            Domain::Ble => &self.ble,
            Domain::Wifi => &self.wifi,
            Domain::Rf => &self.rf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.scanners, config.scanners);
        assert_eq!(parsed.supervisor, config.supervisor);
        assert_eq!(parsed.detection, config.detection);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            demo_mode = false

            [scanners.wifi]
            enabled = true
            poll_interval_ms = 4000

            [supervisor.weights]
            cellular = 2.0
            "#,
        )
        .unwrap();
        assert!(!parsed.demo_mode);
        assert_eq!(parsed.scanners.wifi.poll_interval(), Duration::from_secs(4));
        assert_eq!(parsed.scanners.rf.poll_interval_ms, 1_000);
        assert_eq!(parsed.supervisor.failure_threshold, 5);
        assert_eq!(parsed.supervisor.weights.get("cellular"), Some(&2.0));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = Config::default();
        config.scanners.ble.poll_interval_ms = 0;
        assert!(config.validate().is_err());
        config.scanners.ble.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("flockwatch-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_dir_all(&dir);

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.scanners, created.scanners);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
