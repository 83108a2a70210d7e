// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Cellular classifier - IMSI catcher signatures

use std::collections::{BTreeSet, HashMap, VecDeque};
use serde::{Deserialize, Serialize};

use super::{
    Confidence, DomainClassifier, DomainRules, Finding, PatternId, PatternKind, PatternScope,
    Sighting, SightingHistory, ThreatLevel,
};
use crate::config::{ensure_count, ensure_positive_ms, DetectionSettings, DomainSettings, SettingsError, ThresholdSet};
use crate::sensors::{CellObservation, CellScan, Domain, Reading};

pub type CellularClassifier = DomainClassifier<CellularRules>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CellularPattern {
    SignalSpike,
    SuspiciousCellParameters,
    RapidCellSwitching,
    EncryptionDowngrade,
}

impl PatternKind for CellularPattern {
    const DOMAIN: Domain = Domain::Cellular;
    const ALL: &'static [Self] = &[
        CellularPattern::SignalSpike,
        CellularPattern::SuspiciousCellParameters,
        CellularPattern::RapidCellSwitching,
        CellularPattern::EncryptionDowngrade,
    ];

    fn name(&self) -> &'static str {
        match self {
            CellularPattern::SignalSpike => "SignalSpike",
            CellularPattern::SuspiciousCellParameters => "SuspiciousCellParameters",
            CellularPattern::RapidCellSwitching => "RapidCellSwitching",
            CellularPattern::EncryptionDowngrade => "EncryptionDowngrade",
        }
    }

    fn scope(&self) -> PatternScope {
        match self {
            CellularPattern::SignalSpike | CellularPattern::SuspiciousCellParameters => {
                PatternScope::Observation
            }
            CellularPattern::RapidCellSwitching | CellularPattern::EncryptionDowngrade => {
                PatternScope::Scan
            }
        }
    }

    fn id(self) -> PatternId {
        PatternId::Cellular(self)
    }
}

impl From<CellularPattern> for PatternId {
    fn from(p: CellularPattern) -> Self {
        p.id()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellularThresholds {
    /// dB change against the last reading of the same tower
    pub signal_spike_threshold: i32,
    pub rapid_switch_window_ms: i64,
    pub rapid_switch_count_stationary: usize,
    pub rapid_switch_count_moving: usize,
    /// Sightings after which a tower is trusted
    pub trusted_cell_threshold: u32,
    pub home_mcc: Option<u16>,
    pub home_mnc: Option<u16>,
    pub min_anomaly_interval_ms: i64,
}

impl Default for CellularThresholds {
    fn default() -> Self {
        Self {
            signal_spike_threshold: 15,
            rapid_switch_window_ms: 60_000,
            rapid_switch_count_stationary: 3,
            rapid_switch_count_moving: 8,
            trusted_cell_threshold: 5,
            home_mcc: None,
            home_mnc: None,
            min_anomaly_interval_ms: 60_000,
        }
    }
}

impl ThresholdSet for CellularThresholds {
    type Pattern = CellularPattern;

    fn min_anomaly_interval_ms(&self) -> i64 {
        self.min_anomaly_interval_ms
    }

    fn window_ms(&self, pattern: CellularPattern) -> i64 {
        match pattern {
            CellularPattern::SuspiciousCellParameters => 0,
            _ => self.rapid_switch_window_ms,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let d = Domain::Cellular;
        if self.signal_spike_threshold <= 0 {
            return Err(SettingsError::out_of_range(
                d,
                "signal_spike_threshold",
                self.signal_spike_threshold,
                "must be > 0 dB",
            ));
        }
        ensure_positive_ms(d, "rapid_switch_window_ms", self.rapid_switch_window_ms)?;
        ensure_count(d, "rapid_switch_count_stationary", self.rapid_switch_count_stationary)?;
        ensure_count(d, "rapid_switch_count_moving", self.rapid_switch_count_moving)?;
        if self.rapid_switch_count_moving < self.rapid_switch_count_stationary {
            return Err(SettingsError::Inconsistent {
                domain: d,
                reason: "rapid_switch_count_moving must not be below rapid_switch_count_stationary".into(),
            });
        }
        if self.home_mcc.is_none() && self.home_mnc.is_some() {
            return Err(SettingsError::Inconsistent {
                domain: d,
                reason: "home_mnc requires home_mcc".into(),
            });
        }
        Ok(())
    }
}

/// Max cell identity per generation; values at the max are placeholders
fn max_cell_id(obs: &CellObservation) -> u64 {
    match obs.technology.generation() {
        2 => 0xFFFF,
        3 => 0x0FFF_FFFF,
        4 => 0x0FFF_FFFF,
        5 => 0xF_FFFF_FFFF,
        _ => u64::MAX,
    }
}

#[derive(Debug, Clone)]
struct ServingEntry {
    timestamp: i64,
    emitter_id: String,
    generation: u8,
}

/// Rule state: monotonic trust counters plus the serving-cell timeline
#[derive(Debug, Default)]
pub struct CellularRules {
    seen_counts: HashMap<String, u32>,
    serving: VecDeque<ServingEntry>,
}

impl CellularRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trusted(&self, emitter_id: &str, thresholds: &CellularThresholds) -> bool {
        self.seen_counts
            .get(emitter_id)
            .map_or(false, |n| *n >= thresholds.trusted_cell_threshold)
    }

    fn spike(
        &self,
        sighting: &Sighting,
        history: &SightingHistory,
        t: &CellularThresholds,
    ) -> Option<Finding> {
        if self.is_trusted(&sighting.emitter_id, t) {
            return None;
        }
        let previous = history.before(&sighting.emitter_id, sighting.timestamp)?;
        let delta = (i64::from(sighting.signal_strength) - i64::from(previous.signal_strength)).abs();
        let threshold = i64::from(t.signal_spike_threshold);
        if delta < threshold {
            return None;
        }

        let severity = if delta >= 2 * threshold {
            ThreatLevel::High
        } else {
            ThreatLevel::Medium
        };
        Some(
            Finding::new(
                CellularPattern::SignalSpike,
                severity,
                Confidence::from_margin(delta - threshold),
                format!("Signal of tower {} jumped {} dB", sighting.emitter_id, delta),
            )
            .details(format!(
                "{} dBm -> {} dBm over {} ms",
                previous.signal_strength,
                sighting.signal_strength,
                sighting.timestamp - previous.timestamp
            ))
            .factor(format!("threshold {} dB", t.signal_spike_threshold)),
        )
    }

    fn suspicious_parameters(&self, obs: &CellObservation, t: &CellularThresholds) -> Option<Finding> {
        if !obs.registered {
            return None;
        }

        let mut factors = Vec::new();
        if obs.cell_id == 0 || obs.cell_id >= max_cell_id(obs) {
            factors.push(format!("invalid cell id {}", obs.cell_id));
        }
        if obs.area_code == 0 || (obs.area_code == 0xFFFF && obs.technology.generation() <= 3) {
            factors.push(format!("invalid area code {}", obs.area_code));
        }
        let identity_invalid = !factors.is_empty();

        if let Some(mcc) = t.home_mcc {
            if obs.mcc != mcc {
                factors.push(format!("MCC {} differs from home {}", obs.mcc, mcc));
            } else if let Some(mnc) = t.home_mnc {
                if obs.mnc != mnc {
                    factors.push(format!("MNC {} differs from home {}", obs.mnc, mnc));
                }
            }
        }

        if factors.is_empty() {
            return None;
        }

        let (severity, confidence) = if identity_invalid {
            (ThreatLevel::High, Confidence::High)
        } else {
            (ThreatLevel::Medium, Confidence::Medium)
        };
        let mut finding = Finding::new(
            CellularPattern::SuspiciousCellParameters,
            severity,
            confidence,
            format!("Serving cell {} has suspicious parameters", obs.emitter_id()),
        )
        .details(format!("{:?} {} dBm", obs.technology, obs.signal_dbm));
        for factor in factors {
            finding = finding.factor(factor);
        }
        Some(finding)
    }

    fn rapid_switching(&self, scan: &CellScan, t: &CellularThresholds) -> Vec<Finding> {
        let distinct: BTreeSet<&str> = self
            .serving
            .iter()
            .map(|e| e.emitter_id.as_str())
            .filter(|id| !self.is_trusted(id, t))
            .collect();

        let limit = if scan.moving {
            t.rapid_switch_count_moving
        } else {
            t.rapid_switch_count_stationary
        };
        if distinct.len() <= limit {
            return Vec::new();
        }

        let finding = Finding::new(
            CellularPattern::RapidCellSwitching,
            ThreatLevel::High,
            Confidence::from_margin(5 * (distinct.len() - limit) as i64),
            format!(
                "{} serving cells within {} s",
                distinct.len(),
                t.rapid_switch_window_ms / 1000
            ),
        )
        .factor(if scan.moving { "device moving" } else { "device stationary" })
        .factor(format!("limit {}", limit))
        .related(distinct.iter().copied());
        vec![finding]
    }

    fn downgrade(&self, scan: &CellScan) -> Vec<Finding> {
        let Some(current) = scan.serving() else {
            return Vec::new();
        };
        if current.technology.generation() != 2 {
            return Vec::new();
        }

        let modern: BTreeSet<&str> = self
            .serving
            .iter()
            .filter(|e| e.generation >= 4)
            .map(|e| e.emitter_id.as_str())
            .collect();
        if modern.is_empty() {
            return Vec::new();
        }

        let finding = Finding::new(
            CellularPattern::EncryptionDowngrade,
            ThreatLevel::Critical,
            Confidence::High,
            format!("Forced downgrade to 2G on cell {}", current.emitter_id()),
        )
        .emitter(current.emitter_id())
        .details("2G offers no mutual authentication and weak or null ciphering")
        .factor("4G/5G serving cell seen within the switch window")
        .related(modern.iter().copied());
        vec![finding]
    }
}

impl DomainRules for CellularRules {
    type Thresholds = CellularThresholds;
    type Scan = CellScan;
    type Observation = CellObservation;

    fn settings(all: &DetectionSettings) -> &DomainSettings<CellularThresholds> {
        &all.cellular
    }

    fn scan(reading: &Reading) -> Option<&CellScan> {
        match reading {
            Reading::Cellular(scan) => Some(scan),
            _ => None,
        }
    }

    fn observations(scan: &CellScan) -> &[CellObservation] {
        &scan.cells
    }

    fn sighting(obs: &CellObservation) -> Sighting {
        Sighting {
            emitter_id: obs.emitter_id(),
            domain: Domain::Cellular,
            timestamp: obs.timestamp,
            signal_strength: obs.signal_dbm,
            location: obs.location,
        }
    }

    fn observe(&mut self, _obs: &CellObservation, sighting: &Sighting, _t: &CellularThresholds) {
        let count = self.seen_counts.entry(sighting.emitter_id.clone()).or_insert(0);
        *count = count.saturating_add(1);
    }

    fn observe_scan(&mut self, scan: &CellScan, now: i64, t: &CellularThresholds) {
        if let Some(current) = scan.serving() {
            self.serving.push_back(ServingEntry {
                timestamp: now,
                emitter_id: current.emitter_id(),
                generation: current.technology.generation(),
            });
        }
        let cutoff = now - t.rapid_switch_window_ms;
        while self.serving.front().map_or(false, |e| e.timestamp < cutoff) {
            self.serving.pop_front();
        }
    }

    fn evaluate(
        &self,
        pattern: CellularPattern,
        obs: &CellObservation,
        sighting: &Sighting,
        history: &SightingHistory,
        t: &CellularThresholds,
    ) -> Option<Finding> {
        match pattern {
            CellularPattern::SignalSpike => self.spike(sighting, history, t),
            CellularPattern::SuspiciousCellParameters => self.suspicious_parameters(obs, t),
            _ => None,
        }
    }

    fn evaluate_scan(
        &self,
        pattern: CellularPattern,
        scan: &CellScan,
        _now: i64,
        _history: &SightingHistory,
        t: &CellularThresholds,
    ) -> Vec<Finding> {
        match pattern {
            CellularPattern::RapidCellSwitching => self.rapid_switching(scan, t),
            CellularPattern::EncryptionDowngrade => self.downgrade(scan),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::detection::{Classifier, CooldownGate};
    use crate::sensors::{RadioTechnology, ScanReport};

    fn cell(id: u64, tech: RadioTechnology, dbm: i32, ts: i64) -> CellObservation {
        CellObservation {
            cell_id: id,
            area_code: 1234,
            mcc: 310,
            mnc: 260,
            technology: tech,
            signal_dbm: dbm,
            registered: true,
            timestamp: ts,
            location: None,
        }
    }

    fn report(cells: Vec<CellObservation>, ts: i64) -> ScanReport {
        ScanReport {
            domain: Domain::Cellular,
            timestamp: ts,
            reading: Reading::Cellular(CellScan { cells, moving: false }),
        }
    }

    fn classifier() -> CellularClassifier {
        CellularClassifier::new(CellularRules::new(), 64, Arc::new(CooldownGate::new()))
    }

    fn types(anomalies: &[crate::detection::Anomaly]) -> Vec<PatternId> {
        anomalies.iter().map(|a| a.anomaly_type).collect()
    }

    #[test]
    fn test_signal_spike() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        assert!(c.classify(&report(vec![cell(100, RadioTechnology::Lte, -95, 0)], 0), &settings).is_empty());
        let out = c.classify(&report(vec![cell(100, RadioTechnology::Lte, -70, 5_000)], 5_000), &settings);
        assert_eq!(types(&out), vec![PatternId::Cellular(CellularPattern::SignalSpike)]);
        assert_eq!(out[0].emitter_id.as_deref(), Some("310-260-1234-100"));
        assert_eq!(out[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_extreme_signal_spike_does_not_overflow() {
        let mut settings = DetectionSettings::default();
        settings.cellular.thresholds.signal_spike_threshold = i32::MAX;
        assert!(settings.validate().is_ok());
        let mut c = classifier();

        c.classify(&report(vec![cell(100, RadioTechnology::Lte, i32::MIN, 0)], 0), &settings);
        let out = c.classify(&report(vec![cell(100, RadioTechnology::Lte, i32::MAX, 5_000)], 5_000), &settings);
        let spikes: Vec<_> = out
            .iter()
            .filter(|a| a.anomaly_type == PatternId::Cellular(CellularPattern::SignalSpike))
            .collect();
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].severity, ThreatLevel::High);
    }

    #[test]
    fn test_trusted_tower_is_exempt_from_spikes() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        for i in 0..5 {
            let ts = i * 1_000;
            c.classify(&report(vec![cell(100, RadioTechnology::Lte, -95, ts)], ts), &settings);
        }
        assert!(c.rules().is_trusted("310-260-1234-100", &settings.cellular.thresholds));

        let out = c.classify(&report(vec![cell(100, RadioTechnology::Lte, -60, 6_000)], 6_000), &settings);
        assert!(out.is_empty());
    }

    #[test]
    fn test_rapid_switching_stationary() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        let mut fired = Vec::new();
        for i in 0..4u64 {
            let ts = i as i64 * 10_000;
            let out = c.classify(&report(vec![cell(200 + i, RadioTechnology::Lte, -80, ts)], ts), &settings);
            fired.push(out.iter().any(|a| a.anomaly_type == PatternId::Cellular(CellularPattern::RapidCellSwitching)));
        }
        assert_eq!(fired, vec![false, false, false, true]);
    }

    #[test]
    fn test_rapid_switching_respects_moving_threshold() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        for i in 0..5u64 {
            let ts = i as i64 * 10_000;
            let scan = CellScan { cells: vec![cell(300 + i, RadioTechnology::Lte, -80, ts)], moving: true };
            let report = ScanReport { domain: Domain::Cellular, timestamp: ts, reading: Reading::Cellular(scan) };
            assert!(c.classify(&report, &settings).is_empty());
        }
    }

    #[test]
    fn test_downgrade_to_2g() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        c.classify(&report(vec![cell(100, RadioTechnology::Lte, -80, 0)], 0), &settings);
        let out = c.classify(&report(vec![cell(7, RadioTechnology::Gsm, -60, 5_000)], 5_000), &settings);
        let downgrade: Vec<_> = out
            .iter()
            .filter(|a| a.anomaly_type == PatternId::Cellular(CellularPattern::EncryptionDowngrade))
            .collect();
        assert_eq!(downgrade.len(), 1);
        assert_eq!(downgrade[0].severity, ThreatLevel::Critical);
        assert_eq!(downgrade[0].related_emitters, vec!["310-260-1234-100".to_string()]);
    }

    #[test]
    fn test_suspicious_parameters() {
        let mut settings = DetectionSettings::default();
        settings.cellular.thresholds.home_mcc = Some(310);
        let mut c = classifier();

        let mut bogus = cell(0, RadioTechnology::Lte, -70, 0);
        bogus.mcc = 1;
        let out = c.classify(&report(vec![bogus], 0), &settings);
        assert_eq!(types(&out), vec![PatternId::Cellular(CellularPattern::SuspiciousCellParameters)]);
        assert_eq!(out[0].severity, ThreatLevel::High);
        assert_eq!(out[0].contributing_factors.len(), 2);
    }

    #[test]
    fn test_validation() {
        let mut t = CellularThresholds::default();
        assert!(t.validate().is_ok());
        t.rapid_switch_count_moving = 1;
        assert!(matches!(t.validate(), Err(SettingsError::Inconsistent { .. })));
    }
}
