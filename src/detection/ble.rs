// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! BLE classifier - trackers, proximity and advertisement spam

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Deserialize, Serialize};

use super::{
    Confidence, DomainClassifier, DomainRules, Finding, PatternId, PatternKind, PatternScope,
    Sighting, SightingHistory, ThreatLevel, TrackingCorrelator, TrackingParams,
};
use crate::config::{ensure_count, ensure_dbm, ensure_positive_ms, DetectionSettings, DomainSettings, SettingsError, ThresholdSet};
use crate::sensors::{BleAdvertisement, BleScan, Domain, Reading};

pub type BleClassifier = DomainClassifier<BleRules>;

// Bluetooth SIG company identifiers
const MANUFACTURER_APPLE: u16 = 0x004C;
const MANUFACTURER_SAMSUNG: u16 = 0x0075;

const APPLE_TYPE_FINDMY: u8 = 0x12;
const AIRTAG_MIN_PAYLOAD: usize = 25;

const TILE_SERVICE_UUIDS: [u16; 2] = [0xFEED, 0xFEEC];
const CHIPOLO_SERVICE_UUID: u16 = 0xFE50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlePattern {
    KnownTracker,
    ProximityAlert,
    Tracking,
    AdvertisementSpam,
}

impl PatternKind for BlePattern {
    const DOMAIN: Domain = Domain::Ble;
    const ALL: &'static [Self] = &[
        BlePattern::KnownTracker,
        BlePattern::ProximityAlert,
        BlePattern::Tracking,
        BlePattern::AdvertisementSpam,
    ];

    fn name(&self) -> &'static str {
        match self {
            BlePattern::KnownTracker => "KnownTracker",
            BlePattern::ProximityAlert => "ProximityAlert",
            BlePattern::Tracking => "Tracking",
            BlePattern::AdvertisementSpam => "AdvertisementSpam",
        }
    }

    fn scope(&self) -> PatternScope {
        match self {
            BlePattern::AdvertisementSpam => PatternScope::Scan,
            _ => PatternScope::Observation,
        }
    }

    fn id(self) -> PatternId {
        PatternId::Ble(self)
    }
}

impl From<BlePattern> for PatternId {
    fn from(p: BlePattern) -> Self {
        p.id()
    }
}

/// Consumer trackers recognisable from their advertisements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerKind {
    AirTag,
    FindMy,
    SmartTag,
    Tile,
    Chipolo,
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackerKind::AirTag => "AirTag",
            TrackerKind::FindMy => "Find My accessory",
            TrackerKind::SmartTag => "Galaxy SmartTag",
            TrackerKind::Tile => "Tile",
            TrackerKind::Chipolo => "Chipolo",
        };
        f.write_str(s)
    }
}

/// Identify a tracker from manufacturer data and service UUIDs
pub fn identify_tracker(adv: &BleAdvertisement) -> Option<TrackerKind> {
    let data = &adv.manufacturer_data;
    match adv.manufacturer_id {
        Some(MANUFACTURER_APPLE) if data.len() >= 3 && data[0] == APPLE_TYPE_FINDMY => {
            return Some(if data.len() >= AIRTAG_MIN_PAYLOAD {
                TrackerKind::AirTag
            } else {
                TrackerKind::FindMy
            });
        }
        Some(MANUFACTURER_SAMSUNG) if data.len() >= 4 => return Some(TrackerKind::SmartTag),
        _ => {}
    }

    if adv.service_uuids.iter().any(|u| TILE_SERVICE_UUIDS.contains(u)) {
        return Some(TrackerKind::Tile);
    }
    if adv.service_uuids.contains(&CHIPOLO_SERVICE_UUID) {
        return Some(TrackerKind::Chipolo);
    }
    None
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleThresholds {
    pub proximity_alert_rssi: i32,
    /// Floor: weaker advertisements are recorded but never alert
    pub min_rssi_for_alert: i32,
    pub tracking_duration_ms: i64,
    pub min_seen_count_for_tracking: usize,
    pub location_noise_radius_m: f64,
    pub spam_window_ms: i64,
    /// Distinct addresses per manufacturer within the spam window
    pub spam_address_threshold: usize,
    pub min_anomaly_interval_ms: i64,
}

impl Default for BleThresholds {
    fn default() -> Self {
        Self {
            proximity_alert_rssi: -50,
            min_rssi_for_alert: -85,
            tracking_duration_ms: 300_000,
            min_seen_count_for_tracking: 5,
            location_noise_radius_m: 50.0,
            spam_window_ms: 10_000,
            spam_address_threshold: 20,
            min_anomaly_interval_ms: 60_000,
        }
    }
}

impl BleThresholds {
    pub fn tracking_params(&self) -> TrackingParams {
        TrackingParams {
            tracking_duration_ms: self.tracking_duration_ms,
            min_seen_count: self.min_seen_count_for_tracking,
            location_noise_radius_m: self.location_noise_radius_m,
        }
    }
}

impl ThresholdSet for BleThresholds {
    type Pattern = BlePattern;

    fn min_anomaly_interval_ms(&self) -> i64 {
        self.min_anomaly_interval_ms
    }

    fn window_ms(&self, pattern: BlePattern) -> i64 {
        match pattern {
            BlePattern::Tracking => self.tracking_duration_ms,
            BlePattern::AdvertisementSpam => self.spam_window_ms,
            _ => 0,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let d = Domain::Ble;
        ensure_dbm(d, "proximity_alert_rssi", self.proximity_alert_rssi)?;
        ensure_dbm(d, "min_rssi_for_alert", self.min_rssi_for_alert)?;
        ensure_positive_ms(d, "tracking_duration_ms", self.tracking_duration_ms)?;
        ensure_count(d, "min_seen_count_for_tracking", self.min_seen_count_for_tracking)?;
        ensure_positive_ms(d, "spam_window_ms", self.spam_window_ms)?;
        ensure_count(d, "spam_address_threshold", self.spam_address_threshold)?;
        if !(self.location_noise_radius_m >= 0.0) {
            return Err(SettingsError::out_of_range(
                d,
                "location_noise_radius_m",
                self.location_noise_radius_m,
                "must be >= 0 m",
            ));
        }
        if self.proximity_alert_rssi < self.min_rssi_for_alert {
            return Err(SettingsError::Inconsistent {
                domain: d,
                reason: "proximity_alert_rssi is below min_rssi_for_alert and could never fire".into(),
            });
        }
        Ok(())
    }
}

/// Rule state: recent advertisers per manufacturer
#[derive(Debug, Default)]
pub struct BleRules {
    advertisers: BTreeMap<u16, BTreeMap<String, i64>>,
}

impl BleRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn known_tracker(&self, adv: &BleAdvertisement) -> Option<Finding> {
        let kind = identify_tracker(adv)?;
        Some(
            Finding::new(
                BlePattern::KnownTracker,
                ThreatLevel::Low,
                Confidence::High,
                format!("{} nearby ({} dBm)", kind, adv.rssi),
            )
            .details(format!(
                "manufacturer {:?}, services {:04X?}",
                adv.manufacturer_id, adv.service_uuids
            )),
        )
    }

    fn proximity(&self, adv: &BleAdvertisement, t: &BleThresholds) -> Option<Finding> {
        if adv.rssi < t.proximity_alert_rssi {
            return None;
        }
        let label = adv.name.as_deref().unwrap_or(&adv.address);
        Some(
            Finding::new(
                BlePattern::ProximityAlert,
                ThreatLevel::Medium,
                Confidence::from_margin(i64::from(adv.rssi) - i64::from(t.proximity_alert_rssi)),
                format!("BLE device {} very close ({} dBm)", label, adv.rssi),
            )
            .factor(format!("threshold {} dBm", t.proximity_alert_rssi)),
        )
    }

    fn tracking(
        &self,
        adv: &BleAdvertisement,
        sighting: &Sighting,
        history: &SightingHistory,
        t: &BleThresholds,
    ) -> Option<Finding> {
        let verdict = TrackingCorrelator::evaluate(
            history,
            &sighting.emitter_id,
            sighting.timestamp,
            &t.tracking_params(),
        )?;

        let tracker = identify_tracker(adv);
        let severity = if tracker.is_some() { ThreatLevel::Critical } else { verdict.severity };
        let what = tracker.map_or_else(|| "BLE device".to_string(), |k| k.to_string());

        let mut finding = Finding::new(
            BlePattern::Tracking,
            severity,
            verdict.confidence,
            format!("{} {} appears to be following you", what, adv.address),
        )
        .details(format!(
            "{} sightings over {} s",
            verdict.sightings,
            verdict.span_ms / 1000
        ));
        finding = if verdict.located() {
            finding.factor(format!("{} distinct locations", verdict.distinct_locations))
        } else {
            finding.factor("no location data")
        };
        if let Some(kind) = tracker {
            finding = finding.factor(format!("identified as {}", kind));
        }
        Some(finding)
    }

    fn spam(&self, t: &BleThresholds) -> Vec<Finding> {
        self.advertisers
            .iter()
            .filter(|(_, addresses)| addresses.len() >= t.spam_address_threshold)
            .map(|(manufacturer, addresses)| {
                let margin = (addresses.len() - t.spam_address_threshold) as i64;
                Finding::new(
                    BlePattern::AdvertisementSpam,
                    ThreatLevel::Medium,
                    Confidence::from_margin(margin + 10),
                    format!(
                        "{} addresses advertising as manufacturer 0x{:04X}",
                        addresses.len(),
                        manufacturer
                    ),
                )
                .emitter(format!("mfr-0x{:04X}", manufacturer))
                .details(format!("within {} ms", t.spam_window_ms))
                .factor("popup spam rotates random addresses")
                .related(addresses.keys().take(10).cloned())
            })
            .collect()
    }
}

impl DomainRules for BleRules {
    type Thresholds = BleThresholds;
    type Scan = BleScan;
    type Observation = BleAdvertisement;

    fn settings(all: &DetectionSettings) -> &DomainSettings<BleThresholds> {
        &all.ble
    }

    fn scan(reading: &Reading) -> Option<&BleScan> {
        match reading {
            Reading::Ble(scan) => Some(scan),
            _ => None,
        }
    }

    fn observations(scan: &BleScan) -> &[BleAdvertisement] {
        &scan.advertisements
    }

    fn sighting(adv: &BleAdvertisement) -> Sighting {
        Sighting {
            emitter_id: adv.address.clone(),
            domain: Domain::Ble,
            timestamp: adv.timestamp,
            signal_strength: adv.rssi,
            location: adv.location,
        }
    }

    fn alert_floor(t: &BleThresholds) -> Option<i32> {
        Some(t.min_rssi_for_alert)
    }

    fn observe(&mut self, adv: &BleAdvertisement, _sighting: &Sighting, t: &BleThresholds) {
        if adv.rssi < t.min_rssi_for_alert {
            return;
        }
        if let Some(manufacturer) = adv.manufacturer_id {
            self.advertisers
                .entry(manufacturer)
                .or_default()
                .insert(adv.address.clone(), adv.timestamp);
        }
    }

    fn observe_scan(&mut self, _scan: &BleScan, now: i64, t: &BleThresholds) {
        let cutoff = now - t.spam_window_ms;
        self.advertisers.retain(|_, addresses| {
            addresses.retain(|_, ts| *ts >= cutoff);
            !addresses.is_empty()
        });
    }

    fn evaluate(
        &self,
        pattern: BlePattern,
        adv: &BleAdvertisement,
        sighting: &Sighting,
        history: &SightingHistory,
        t: &BleThresholds,
    ) -> Option<Finding> {
        match pattern {
            BlePattern::KnownTracker => self.known_tracker(adv),
            BlePattern::ProximityAlert => self.proximity(adv, t),
            BlePattern::Tracking => self.tracking(adv, sighting, history, t),
            BlePattern::AdvertisementSpam => None,
        }
    }

    fn evaluate_scan(
        &self,
        pattern: BlePattern,
        _scan: &BleScan,
        _now: i64,
        _history: &SightingHistory,
        t: &BleThresholds,
    ) -> Vec<Finding> {
        match pattern {
            BlePattern::AdvertisementSpam => self.spam(t),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::detection::{Anomaly, Classifier, CooldownGate};
    use crate::sensors::{GeoPoint, ScanReport};

    fn adv(address: &str, rssi: i32, ts: i64) -> BleAdvertisement {
        BleAdvertisement {
            address: address.to_string(),
            name: None,
            rssi,
            manufacturer_id: None,
            manufacturer_data: Vec::new(),
            service_uuids: Vec::new(),
            timestamp: ts,
            location: None,
        }
    }

    fn airtag(ts: i64, location: Option<GeoPoint>) -> BleAdvertisement {
        let mut data = vec![0u8; 27];
        data[0] = APPLE_TYPE_FINDMY;
        BleAdvertisement {
            manufacturer_id: Some(MANUFACTURER_APPLE),
            manufacturer_data: data,
            location,
            ..adv("11:22:33:44:55:66", -70, ts)
        }
    }

    fn report(advertisements: Vec<BleAdvertisement>, ts: i64) -> ScanReport {
        ScanReport {
            domain: Domain::Ble,
            timestamp: ts,
            reading: Reading::Ble(BleScan { advertisements }),
        }
    }

    fn classifier() -> BleClassifier {
        BleClassifier::new(BleRules::new(), 64, Arc::new(CooldownGate::new()))
    }

    fn of(anomalies: &[Anomaly], pattern: BlePattern) -> Vec<Anomaly> {
        anomalies.iter().filter(|a| a.anomaly_type == pattern.id()).cloned().collect()
    }

    #[test]
    fn test_identify_trackers() {
        assert_eq!(identify_tracker(&airtag(0, None)), Some(TrackerKind::AirTag));

        let mut findmy = airtag(0, None);
        findmy.manufacturer_data.truncate(10);
        assert_eq!(identify_tracker(&findmy), Some(TrackerKind::FindMy));

        let tile = BleAdvertisement { service_uuids: vec![0xFEED], ..adv("t", -60, 0) };
        assert_eq!(identify_tracker(&tile), Some(TrackerKind::Tile));

        let chipolo = BleAdvertisement { service_uuids: vec![CHIPOLO_SERVICE_UUID], ..adv("c", -60, 0) };
        assert_eq!(identify_tracker(&chipolo), Some(TrackerKind::Chipolo));

        assert_eq!(identify_tracker(&adv("x", -60, 0)), None);
    }

    #[test]
    fn test_proximity_and_floor() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        let out = c.classify(&report(vec![adv("near", -45, 0), adv("far", -95, 0)], 0), &settings);
        let prox = of(&out, BlePattern::ProximityAlert);
        assert_eq!(prox.len(), 1);
        assert_eq!(prox[0].emitter_id.as_deref(), Some("near"));
        assert_eq!(prox[0].confidence, Confidence::Low);

        // Below the floor still lands in history
        assert!(c.history().latest("far").is_some());
    }

    #[test]
    fn test_tracker_following_is_critical() {
        let mut settings = DetectionSettings::default();
        settings.ble.thresholds.min_seen_count_for_tracking = 3;
        settings.ble.thresholds.tracking_duration_ms = 600_000;
        let mut c = classifier();

        let mut tracking = Vec::new();
        for i in 0..3 {
            let ts = i * 60_000;
            let here = GeoPoint::new(47.60 + 0.01 * i as f64, -122.33);
            let out = c.classify(&report(vec![airtag(ts, Some(here))], ts), &settings);
            tracking.extend(of(&out, BlePattern::Tracking));
        }
        assert_eq!(tracking.len(), 1);
        assert_eq!(tracking[0].severity, ThreatLevel::Critical);
        assert_eq!(tracking[0].timestamp, 120_000);
    }

    #[test]
    fn test_disabling_pattern_stops_anomalies() {
        let mut settings = DetectionSettings::default();
        let mut c = classifier();

        assert_eq!(of(&c.classify(&report(vec![adv("a", -40, 0)], 0), &settings), BlePattern::ProximityAlert).len(), 1);

        settings.ble = settings.ble.with_pattern(BlePattern::ProximityAlert, false);
        let out = c.classify(&report(vec![adv("b", -40, 1_000)], 1_000), &settings);
        assert!(of(&out, BlePattern::ProximityAlert).is_empty());
    }

    #[test]
    fn test_disabled_domain_keeps_history() {
        let mut settings = DetectionSettings::default();
        settings.ble.thresholds.min_seen_count_for_tracking = 3;
        settings.ble.enabled = false;
        let mut c = classifier();

        for i in 0..2 {
            let out = c.classify(&report(vec![adv("tag", -70, i * 1_000)], i * 1_000), &settings);
            assert!(out.is_empty());
        }
        assert_eq!(c.history().within("tag", 0).count(), 2);

        settings.ble.enabled = true;
        let out = c.classify(&report(vec![adv("tag", -70, 2_000)], 2_000), &settings);
        let tracking = of(&out, BlePattern::Tracking);
        assert_eq!(tracking.len(), 1);
        assert_eq!(tracking[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_pattern_toggle_keeps_history() {
        let mut settings = DetectionSettings::default();
        let mut c = classifier();
        let mut tracking = Vec::new();

        for i in 0..6 {
            let ts = i * 20_000;
            settings.ble = settings.ble.with_pattern(BlePattern::Tracking, i != 4);
            let out = c.classify(&report(vec![adv("tag", -70, ts)], ts), &settings);
            tracking.extend(of(&out, BlePattern::Tracking));
            if i == 4 {
                assert_eq!(c.history().within("tag", 0).count(), 5);
            }
        }

        assert_eq!(c.history().within("tag", 0).count(), 6);
        assert_eq!(tracking.len(), 1);
        assert_eq!(tracking[0].timestamp, 100_000);
    }

    #[test]
    fn test_history_pruned_against_report_time() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        // Stamped before the report's retention window
        let out = c.classify(&report(vec![adv("stale", -70, 0), adv("fresh", -70, 400_000)], 400_000), &settings);
        assert!(out.is_empty());
        assert!(c.history().latest("stale").is_none());
        assert!(c.history().latest("fresh").is_some());
    }

    #[test]
    fn test_advertisement_spam() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        let flood: Vec<_> = (0..25)
            .map(|i| BleAdvertisement {
                manufacturer_id: Some(MANUFACTURER_APPLE),
                manufacturer_data: vec![0x07, 0x19, 0x01],
                ..adv(&format!("02:00:00:00:00:{:02X}", i), -60, 0)
            })
            .collect();
        let out = c.classify(&report(flood, 0), &settings);
        let spam = of(&out, BlePattern::AdvertisementSpam);
        assert_eq!(spam.len(), 1);
        assert_eq!(spam[0].emitter_id.as_deref(), Some("mfr-0x004C"));
        assert_eq!(spam[0].related_emitters.len(), 10);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let settings = DetectionSettings::default();
        let scans: Vec<ScanReport> = (0..6)
            .map(|i| report(vec![airtag(i * 30_000, None), adv("near", -42, i * 30_000)], i * 30_000))
            .collect();

        let run = || {
            let mut c = classifier();
            scans.iter().flat_map(|s| c.classify(s, &settings)).collect::<Vec<_>>()
        };
        let first = run();
        assert!(!first.is_empty());
        assert_eq!(first, run());
    }
}
