// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Detection settings - per-domain gates and thresholds, hot-swappable

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::detection::{
    BleThresholds, CellularThresholds, PatternKind, RfThresholds, SatelliteThresholds,
    WifiThresholds,
};
use crate::sensors::Domain;

/// Rejected settings snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{domain}.{field} = {value}: {expectation}")]
    OutOfRange {
        domain: Domain,
        field: &'static str,
        value: String,
        expectation: &'static str,
    },

    #[error("{domain}: {reason}")]
    Inconsistent { domain: Domain, reason: String },
}

impl SettingsError {
    pub(crate) fn out_of_range(
        domain: Domain,
        field: &'static str,
        value: impl ToString,
        expectation: &'static str,
    ) -> Self {
        SettingsError::OutOfRange {
            domain,
            field,
            value: value.to_string(),
            expectation,
        }
    }
}

/// Checks shared by every threshold struct
pub(crate) fn ensure_positive_ms(domain: Domain, field: &'static str, value: i64) -> Result<(), SettingsError> {
    if value <= 0 {
        return Err(SettingsError::out_of_range(domain, field, value, "must be > 0 ms"));
    }
    Ok(())
}

pub(crate) fn ensure_dbm(domain: Domain, field: &'static str, value: i32) -> Result<(), SettingsError> {
    if !(-150..=0).contains(&value) {
        return Err(SettingsError::out_of_range(domain, field, value, "must be within -150..=0 dBm"));
    }
    Ok(())
}

pub(crate) fn ensure_count(domain: Domain, field: &'static str, value: usize) -> Result<(), SettingsError> {
    if value == 0 {
        return Err(SettingsError::out_of_range(domain, field, value, "must be >= 1"));
    }
    Ok(())
}

/// A domain's threshold struct
pub trait ThresholdSet:
    Debug + Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Pattern: PatternKind;

    /// Cooldown applied to every pattern of the domain
    fn min_anomaly_interval_ms(&self) -> i64;

    /// How much history the pattern looks back over
    fn window_ms(&self, pattern: Self::Pattern) -> i64;

    fn validate(&self) -> Result<(), SettingsError>;
}

/// Two-level gate plus thresholds for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "", default)]
pub struct DomainSettings<T: ThresholdSet> {
    pub enabled: bool,
    pub enabled_patterns: BTreeSet<T::Pattern>,
    pub thresholds: T,
}

impl<T: ThresholdSet> DomainSettings<T> {
    pub fn is_pattern_enabled(&self, pattern: T::Pattern) -> bool {
        self.enabled && self.enabled_patterns.contains(&pattern)
    }

    /// Longest window over every pattern of the domain.
    ///
    /// Ignores both gates so that switching a domain or a pattern off keeps its history.
    pub fn retention_ms(&self) -> i64 {
        <T::Pattern as PatternKind>::ALL
            .iter()
            .map(|p| self.thresholds.window_ms(*p))
            .max()
            .unwrap_or(0)
    }

    pub fn with_pattern(mut self, pattern: T::Pattern, enabled: bool) -> Self {
        if enabled {
            self.enabled_patterns.insert(pattern);
        } else {
            self.enabled_patterns.remove(&pattern);
        }
        self
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let domain = <T::Pattern as PatternKind>::DOMAIN;
        if self.thresholds.min_anomaly_interval_ms() < 0 {
            return Err(SettingsError::out_of_range(
                domain,
                "min_anomaly_interval_ms",
                self.thresholds.min_anomaly_interval_ms(),
                "must be >= 0 ms",
            ));
        }
        self.thresholds.validate()
    }
}

impl<T: ThresholdSet> Default for DomainSettings<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            enabled_patterns: T::Pattern::ALL.iter().copied().collect(),
            thresholds: T::default(),
        }
    }
}

/// Immutable snapshot consumed by the classifiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub cellular: DomainSettings<CellularThresholds>,
    pub satellite: DomainSettings<SatelliteThresholds>,
    pub ble: DomainSettings<BleThresholds>,
    pub wifi: DomainSettings<WifiThresholds>,
    pub rf: DomainSettings<RfThresholds>,
}

impl DetectionSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.cellular.validate()?;
        self.satellite.validate()?;
        self.ble.validate()?;
        self.wifi.validate()?;
        self.rf.validate()?;
        Ok(())
    }

    pub fn is_domain_enabled(&self, domain: Domain) -> bool {
        match domain {
            Domain::Cellular => self.cellular.enabled,
            Domain::Satellite => self.satellite.enabled,
            Domain::Ble => self.ble.enabled,
            Domain::Wifi => self.wifi.enabled,
            Domain::Rf => self.rf.enabled,
        }
    }
}

/// Single-writer, many-reader holder of the current settings snapshot
pub struct SettingsStore {
    tx: watch::Sender<Arc<DetectionSettings>>,
}

impl SettingsStore {
    pub fn new(initial: DetectionSettings) -> Result<Self, SettingsError> {
        initial.validate()?;
        let (tx, _) = watch::channel(Arc::new(initial));
        Ok(Self { tx })
    }

    pub fn current(&self) -> Arc<DetectionSettings> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DetectionSettings>> {
        self.tx.subscribe()
    }

    /// Swap in a new snapshot; on rejection the prior snapshot stays in effect
    pub fn update(&self, settings: DetectionSettings) -> Result<(), SettingsError> {
        if let Err(e) = settings.validate() {
            warn!("Rejected detection settings update: {}", e);
            return Err(e);
        }
        self.tx.send_replace(Arc::new(settings));
        info!("Detection settings updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::WifiPattern;

    #[test]
    fn test_defaults_validate() {
        assert!(DetectionSettings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_update_keeps_prior_snapshot() {
        let store = SettingsStore::new(DetectionSettings::default()).unwrap();

        let mut bad = DetectionSettings::default();
        bad.wifi.thresholds.proximity_alert_rssi = 20;
        let err = store.update(bad).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::OutOfRange { domain: Domain::Wifi, field: "proximity_alert_rssi", .. }
        ));
        assert_eq!(store.current().wifi.thresholds.proximity_alert_rssi, -50);

        let mut good = DetectionSettings::default();
        good.wifi.thresholds.proximity_alert_rssi = -45;
        store.update(good).unwrap();
        assert_eq!(store.current().wifi.thresholds.proximity_alert_rssi, -45);
    }

    #[test]
    fn test_retention_ignores_gates() {
        let mut wifi = DomainSettings::<WifiThresholds>::default();
        assert_eq!(wifi.retention_ms(), wifi.thresholds.tracking_duration_ms);

        wifi = wifi.with_pattern(WifiPattern::Tracking, false);
        assert_eq!(wifi.retention_ms(), wifi.thresholds.tracking_duration_ms);
        assert!(!wifi.is_pattern_enabled(WifiPattern::Tracking));

        wifi.enabled = false;
        assert_eq!(wifi.retention_ms(), wifi.thresholds.tracking_duration_ms);

        wifi.thresholds.tracking_duration_ms = 1_000;
        let t = &wifi.thresholds;
        assert_eq!(wifi.retention_ms(), t.deauth_window_ms.max(t.karma_window_ms).max(1_000));
    }

    #[test]
    fn test_settings_toml_roundtrip_partial() {
        let text = r#"
            [ble]
            enabled = false

            [wifi]
            enabled_patterns = ["ProximityAlert"]
        "#;
        let parsed: DetectionSettings = toml::from_str(text).unwrap();
        assert!(!parsed.ble.enabled);
        assert_eq!(parsed.wifi.enabled_patterns.len(), 1);
        assert!(parsed.wifi.is_pattern_enabled(WifiPattern::ProximityAlert));
        assert!(parsed.cellular.enabled);
    }
}
