// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Wi-Fi classifier - rogue access points, deauth floods, following APs

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use serde::{Deserialize, Serialize};

use super::{
    Confidence, DomainClassifier, DomainRules, Finding, PatternId, PatternKind, PatternScope,
    Sighting, SightingHistory, ThreatLevel, TrackingCorrelator, TrackingParams,
};
use crate::config::{ensure_count, ensure_dbm, ensure_positive_ms, DetectionSettings, DomainSettings, SettingsError, ThresholdSet};
use crate::sensors::{Domain, Reading, WifiBeacon, WifiScan, WifiSecurity};

pub type WifiClassifier = DomainClassifier<WifiRules>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WifiPattern {
    ProximityAlert,
    Tracking,
    HiddenNetworkStrong,
    SuspiciousOpenNetwork,
    WeakEncryption,
    EvilTwin,
    DeauthFlood,
    KarmaAttack,
}

impl PatternKind for WifiPattern {
    const DOMAIN: Domain = Domain::Wifi;
    const ALL: &'static [Self] = &[
        WifiPattern::ProximityAlert,
        WifiPattern::Tracking,
        WifiPattern::HiddenNetworkStrong,
        WifiPattern::SuspiciousOpenNetwork,
        WifiPattern::WeakEncryption,
        WifiPattern::EvilTwin,
        WifiPattern::DeauthFlood,
        WifiPattern::KarmaAttack,
    ];

    fn name(&self) -> &'static str {
        match self {
            WifiPattern::ProximityAlert => "ProximityAlert",
            WifiPattern::Tracking => "Tracking",
            WifiPattern::HiddenNetworkStrong => "HiddenNetworkStrong",
            WifiPattern::SuspiciousOpenNetwork => "SuspiciousOpenNetwork",
            WifiPattern::WeakEncryption => "WeakEncryption",
            WifiPattern::EvilTwin => "EvilTwin",
            WifiPattern::DeauthFlood => "DeauthFlood",
            WifiPattern::KarmaAttack => "KarmaAttack",
        }
    }

    fn scope(&self) -> PatternScope {
        match self {
            WifiPattern::EvilTwin | WifiPattern::DeauthFlood | WifiPattern::KarmaAttack => {
                PatternScope::Scan
            }
            _ => PatternScope::Observation,
        }
    }

    fn id(self) -> PatternId {
        PatternId::Wifi(self)
    }
}

impl From<WifiPattern> for PatternId {
    fn from(p: WifiPattern) -> Self {
        p.id()
    }
}

fn default_ssid_keywords() -> Vec<String> {
    [
        "free", "public", "guest", "wifi", "open", "hotspot", "starbucks", "mcdonald", "airport",
        "hotel",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiThresholds {
    pub proximity_alert_rssi: i32,
    pub min_rssi_for_alert: i32,
    pub tracking_duration_ms: i64,
    pub min_seen_count_for_tracking: usize,
    pub location_noise_radius_m: f64,
    pub hidden_strong_rssi: i32,
    /// Same SSID from more BSSIDs than this within one scan
    pub evil_twin_bssid_count: usize,
    pub suspicious_ssid_keywords: Vec<String>,
    pub deauth_window_ms: i64,
    pub deauth_threshold_count: usize,
    pub karma_window_ms: i64,
    pub karma_ssid_threshold: usize,
    pub min_anomaly_interval_ms: i64,
}

impl Default for WifiThresholds {
    fn default() -> Self {
        Self {
            proximity_alert_rssi: -50,
            min_rssi_for_alert: -85,
            tracking_duration_ms: 300_000,
            min_seen_count_for_tracking: 5,
            location_noise_radius_m: 50.0,
            hidden_strong_rssi: -55,
            evil_twin_bssid_count: 1,
            suspicious_ssid_keywords: default_ssid_keywords(),
            deauth_window_ms: 5_000,
            deauth_threshold_count: 10,
            karma_window_ms: 60_000,
            karma_ssid_threshold: 3,
            min_anomaly_interval_ms: 60_000,
        }
    }
}

impl WifiThresholds {
    pub fn tracking_params(&self) -> TrackingParams {
        TrackingParams {
            tracking_duration_ms: self.tracking_duration_ms,
            min_seen_count: self.min_seen_count_for_tracking,
            location_noise_radius_m: self.location_noise_radius_m,
        }
    }
}

impl ThresholdSet for WifiThresholds {
    type Pattern = WifiPattern;

    fn min_anomaly_interval_ms(&self) -> i64 {
        self.min_anomaly_interval_ms
    }

    fn window_ms(&self, pattern: WifiPattern) -> i64 {
        match pattern {
            WifiPattern::Tracking => self.tracking_duration_ms,
            WifiPattern::DeauthFlood => self.deauth_window_ms,
            WifiPattern::KarmaAttack => self.karma_window_ms,
            _ => 0,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let d = Domain::Wifi;
        ensure_dbm(d, "proximity_alert_rssi", self.proximity_alert_rssi)?;
        ensure_dbm(d, "min_rssi_for_alert", self.min_rssi_for_alert)?;
        ensure_dbm(d, "hidden_strong_rssi", self.hidden_strong_rssi)?;
        ensure_positive_ms(d, "tracking_duration_ms", self.tracking_duration_ms)?;
        ensure_count(d, "min_seen_count_for_tracking", self.min_seen_count_for_tracking)?;
        ensure_count(d, "evil_twin_bssid_count", self.evil_twin_bssid_count)?;
        ensure_positive_ms(d, "deauth_window_ms", self.deauth_window_ms)?;
        ensure_count(d, "deauth_threshold_count", self.deauth_threshold_count)?;
        ensure_positive_ms(d, "karma_window_ms", self.karma_window_ms)?;
        ensure_count(d, "karma_ssid_threshold", self.karma_ssid_threshold)?;
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

/// Rule state: deauth timeline and probe responses per BSSID
#[derive(Debug, Default)]
pub struct WifiRules {
    deauths: VecDeque<(i64, String)>,
    probe_responses: BTreeMap<String, BTreeMap<String, i64>>,
}

impl WifiRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn proximity(&self, beacon: &WifiBeacon, t: &WifiThresholds) -> Option<Finding> {
        if beacon.rssi < t.proximity_alert_rssi {
            return None;
        }
        Some(
            Finding::new(
                WifiPattern::ProximityAlert,
                ThreatLevel::Medium,
                Confidence::from_margin(i64::from(beacon.rssi) - i64::from(t.proximity_alert_rssi)),
                format!("Access point \"{}\" very close ({} dBm)", beacon.ssid, beacon.rssi),
            )
            .details(format!("channel {}, {:?}", beacon.channel, beacon.security))
            .factor(format!("threshold {} dBm", t.proximity_alert_rssi)),
        )
    }

    fn tracking(
        &self,
        beacon: &WifiBeacon,
        sighting: &Sighting,
        history: &SightingHistory,
        t: &WifiThresholds,
    ) -> Option<Finding> {
        let verdict = TrackingCorrelator::evaluate(
            history,
            &sighting.emitter_id,
            sighting.timestamp,
            &t.tracking_params(),
        )?;

        let finding = Finding::new(
            WifiPattern::Tracking,
            verdict.severity,
            verdict.confidence,
            format!("Access point {} (\"{}\") appears to be following you", beacon.bssid, beacon.ssid),
        )
        .details(format!(
            "{} sightings over {} s",
            verdict.sightings,
            verdict.span_ms / 1000
        ));
        Some(if verdict.located() {
            finding.factor(format!("{} distinct locations", verdict.distinct_locations))
        } else {
            finding.factor("no location data")
        })
    }

    fn hidden_strong(&self, beacon: &WifiBeacon, t: &WifiThresholds) -> Option<Finding> {
        if !beacon.is_hidden() || beacon.rssi <= t.hidden_strong_rssi {
            return None;
        }
        Some(
            Finding::new(
                WifiPattern::HiddenNetworkStrong,
                ThreatLevel::Medium,
                Confidence::from_margin(i64::from(beacon.rssi) - i64::from(t.hidden_strong_rssi)),
                format!("Strong hidden network ({} dBm)", beacon.rssi),
            )
            .details(format!("BSSID {}, channel {}", beacon.bssid, beacon.channel)),
        )
    }

    fn suspicious_open(&self, beacon: &WifiBeacon, t: &WifiThresholds) -> Option<Finding> {
        if beacon.security != WifiSecurity::Open || beacon.is_hidden() {
            return None;
        }
        let ssid = beacon.ssid.to_lowercase();
        let matched: Vec<&String> = t
            .suspicious_ssid_keywords
            .iter()
            .filter(|k| ssid.contains(&k.to_lowercase()))
            .collect();
        if matched.is_empty() {
            return None;
        }

        let mut finding = Finding::new(
            WifiPattern::SuspiciousOpenNetwork,
            ThreatLevel::Low,
            if matched.len() > 1 { Confidence::Medium } else { Confidence::Low },
            format!("Open network \"{}\" looks like a honeypot", beacon.ssid),
        );
        for keyword in matched {
            finding = finding.factor(format!("keyword \"{}\"", keyword));
        }
        Some(finding)
    }

    fn weak_encryption(&self, beacon: &WifiBeacon) -> Option<Finding> {
        if beacon.security != WifiSecurity::Wep {
            return None;
        }
        Some(
            Finding::new(
                WifiPattern::WeakEncryption,
                ThreatLevel::Low,
                Confidence::High,
                format!("\"{}\" uses WEP", beacon.ssid),
            )
            .details("WEP keys are recoverable in minutes"),
        )
    }

    fn evil_twin(&self, scan: &WifiScan, t: &WifiThresholds) -> Vec<Finding> {
        let mut by_ssid: BTreeMap<&str, Vec<&WifiBeacon>> = BTreeMap::new();
        for beacon in scan.beacons.iter().filter(|b| !b.is_hidden() && b.rssi >= t.min_rssi_for_alert) {
            by_ssid.entry(beacon.ssid.as_str()).or_default().push(beacon);
        }

        let mut findings = Vec::new();
        for (ssid, beacons) in by_ssid {
            let bssids: BTreeSet<&str> = beacons.iter().map(|b| b.bssid.as_str()).collect();
            if bssids.len() <= t.evil_twin_bssid_count {
                continue;
            }
            let securities: BTreeSet<String> = beacons.iter().map(|b| format!("{:?}", b.security)).collect();
            let mixed = securities.len() > 1;

            let mut finding = Finding::new(
                WifiPattern::EvilTwin,
                if mixed { ThreatLevel::High } else { ThreatLevel::Medium },
                if mixed { Confidence::High } else { Confidence::Low },
                format!("{} access points broadcasting \"{}\"", bssids.len(), ssid),
            )
            .emitter(ssid)
            .related(bssids.iter().copied());
            if mixed {
                finding = finding.factor(format!(
                    "security differs: {}",
                    securities.into_iter().collect::<Vec<_>>().join(", ")
                ));
            }
            findings.push(finding);
        }
        findings
    }

    fn deauth_flood(&self, now: i64, t: &WifiThresholds) -> Vec<Finding> {
        let since = now - t.deauth_window_ms;
        let recent: Vec<&(i64, String)> = self.deauths.iter().filter(|(ts, _)| *ts >= since).collect();
        if recent.len() < t.deauth_threshold_count {
            return Vec::new();
        }
        let sources: BTreeSet<&str> = recent.iter().map(|(_, s)| s.as_str()).collect();
        let finding = Finding::new(
            WifiPattern::DeauthFlood,
            ThreatLevel::High,
            Confidence::from_margin((recent.len() - t.deauth_threshold_count) as i64 + 10),
            format!("{} deauth frames within {} ms", recent.len(), t.deauth_window_ms),
        )
        .factor("forces clients to reconnect, often to a rogue AP")
        .related(sources.iter().copied());
        vec![finding]
    }

    fn karma(&self, t: &WifiThresholds) -> Vec<Finding> {
        self.probe_responses
            .iter()
            .filter(|(_, ssids)| ssids.len() >= t.karma_ssid_threshold)
            .map(|(bssid, ssids)| {
                Finding::new(
                    WifiPattern::KarmaAttack,
                    ThreatLevel::High,
                    Confidence::from_margin(5 * (ssids.len() - t.karma_ssid_threshold) as i64 + 10),
                    format!("{} answered probes for {} different networks", bssid, ssids.len()),
                )
                .emitter(bssid.clone())
                .details(ssids.keys().cloned().collect::<Vec<_>>().join(", "))
            })
            .collect()
    }
}

impl DomainRules for WifiRules {
    type Thresholds = WifiThresholds;
    type Scan = WifiScan;
    type Observation = WifiBeacon;

    fn settings(all: &DetectionSettings) -> &DomainSettings<WifiThresholds> {
        &all.wifi
    }

    fn scan(reading: &Reading) -> Option<&WifiScan> {
        match reading {
            Reading::Wifi(scan) => Some(scan),
            _ => None,
        }
    }

    fn observations(scan: &WifiScan) -> &[WifiBeacon] {
        &scan.beacons
    }

    fn sighting(beacon: &WifiBeacon) -> Sighting {
        Sighting {
            emitter_id: beacon.bssid.clone(),
            domain: Domain::Wifi,
            timestamp: beacon.timestamp,
            signal_strength: beacon.rssi,
            location: beacon.location,
        }
    }

    fn alert_floor(t: &WifiThresholds) -> Option<i32> {
        Some(t.min_rssi_for_alert)
    }

    fn observe_scan(&mut self, scan: &WifiScan, now: i64, t: &WifiThresholds) {
        for frame in &scan.deauth_frames {
            self.deauths.push_back((frame.timestamp, frame.source.clone()));
        }
        let cutoff = now - t.deauth_window_ms;
        self.deauths.retain(|(ts, _)| *ts >= cutoff);

        for response in &scan.probe_responses {
            self.probe_responses
                .entry(response.bssid.clone())
                .or_default()
                .insert(response.ssid.clone(), response.timestamp);
        }
        let cutoff = now - t.karma_window_ms;
        self.probe_responses.retain(|_, ssids| {
            ssids.retain(|_, ts| *ts >= cutoff);
            !ssids.is_empty()
        });
    }

    fn evaluate(
        &self,
        pattern: WifiPattern,
        beacon: &WifiBeacon,
        sighting: &Sighting,
        history: &SightingHistory,
        t: &WifiThresholds,
    ) -> Option<Finding> {
        match pattern {
            WifiPattern::ProximityAlert => self.proximity(beacon, t),
            WifiPattern::Tracking => self.tracking(beacon, sighting, history, t),
            WifiPattern::HiddenNetworkStrong => self.hidden_strong(beacon, t),
            WifiPattern::SuspiciousOpenNetwork => self.suspicious_open(beacon, t),
            WifiPattern::WeakEncryption => self.weak_encryption(beacon),
            _ => None,
        }
    }

    fn evaluate_scan(
        &self,
        pattern: WifiPattern,
        scan: &WifiScan,
        now: i64,
        _history: &SightingHistory,
        t: &WifiThresholds,
    ) -> Vec<Finding> {
        match pattern {
            WifiPattern::EvilTwin => self.evil_twin(scan, t),
            WifiPattern::DeauthFlood => self.deauth_flood(now, t),
            WifiPattern::KarmaAttack => self.karma(t),
            _ => Vec::new(),
        }
    }
}
