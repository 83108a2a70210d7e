// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Satellite classifier - GNSS spoofing signatures

use std::collections::{BTreeSet, VecDeque};
use serde::{Deserialize, Serialize};

use super::{
    Confidence, DomainClassifier, DomainRules, Finding, PatternId, PatternKind, PatternScope,
    Sighting, SightingHistory, ThreatLevel,
};
use crate::config::{ensure_count, ensure_positive_ms, DetectionSettings, DomainSettings, SettingsError, ThresholdSet};
use crate::sensors::{Constellation, Domain, Reading, SatelliteFix, SatelliteObservation};

pub type SatelliteClassifier = DomainClassifier<SatelliteRules>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SatellitePattern {
    UnexpectedSatellite,
    AbnormalSignalStrength,
    RapidHandoff,
    SignalUniformity,
}

impl PatternKind for SatellitePattern {
    const DOMAIN: Domain = Domain::Satellite;
    const ALL: &'static [Self] = &[
        SatellitePattern::UnexpectedSatellite,
        SatellitePattern::AbnormalSignalStrength,
        SatellitePattern::RapidHandoff,
        SatellitePattern::SignalUniformity,
    ];

    fn name(&self) -> &'static str {
        match self {
            SatellitePattern::UnexpectedSatellite => "UnexpectedSatellite",
            SatellitePattern::AbnormalSignalStrength => "AbnormalSignalStrength",
            SatellitePattern::RapidHandoff => "RapidHandoff",
            SatellitePattern::SignalUniformity => "SignalUniformity",
        }
    }

    fn scope(&self) -> PatternScope {
        match self {
            SatellitePattern::UnexpectedSatellite | SatellitePattern::AbnormalSignalStrength => {
                PatternScope::Observation
            }
            SatellitePattern::RapidHandoff | SatellitePattern::SignalUniformity => PatternScope::Scan,
        }
    }

    fn id(self) -> PatternId {
        PatternId::Satellite(self)
    }
}

impl From<SatellitePattern> for PatternId {
    fn from(p: SatellitePattern) -> Self {
        p.id()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteThresholds {
    pub expected_constellations: BTreeSet<Constellation>,
    pub rapid_handoff_threshold_ms: i64,
    /// C/N0 spread below this across many satellites looks synthetic
    pub uniform_cn0_stddev_db: f64,
    pub min_satellites_for_uniformity: usize,
    pub max_expected_cn0_dbhz: f64,
    pub min_anomaly_interval_ms: i64,
}

impl Default for SatelliteThresholds {
    fn default() -> Self {
        Self {
            expected_constellations: [
                Constellation::Gps,
                Constellation::Glonass,
                Constellation::Galileo,
                Constellation::Beidou,
                Constellation::Qzss,
                Constellation::Sbas,
                Constellation::Irnss,
            ]
            .into_iter()
            .collect(),
            rapid_handoff_threshold_ms: 5_000,
            uniform_cn0_stddev_db: 1.0,
            min_satellites_for_uniformity: 5,
            max_expected_cn0_dbhz: 55.0,
            min_anomaly_interval_ms: 60_000,
        }
    }
}

impl ThresholdSet for SatelliteThresholds {
    type Pattern = SatellitePattern;

    fn min_anomaly_interval_ms(&self) -> i64 {
        self.min_anomaly_interval_ms
    }

    fn window_ms(&self, pattern: SatellitePattern) -> i64 {
        match pattern {
            SatellitePattern::RapidHandoff => self.rapid_handoff_threshold_ms,
            _ => 0,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let d = Domain::Satellite;
        ensure_positive_ms(d, "rapid_handoff_threshold_ms", self.rapid_handoff_threshold_ms)?;
        ensure_count(d, "min_satellites_for_uniformity", self.min_satellites_for_uniformity)?;
        if !(self.uniform_cn0_stddev_db >= 0.0) {
            return Err(SettingsError::out_of_range(
                d,
                "uniform_cn0_stddev_db",
                self.uniform_cn0_stddev_db,
                "must be >= 0 dB",
            ));
        }
        if !(self.max_expected_cn0_dbhz > 0.0 && self.max_expected_cn0_dbhz <= 100.0) {
            return Err(SettingsError::out_of_range(
                d,
                "max_expected_cn0_dbhz",
                self.max_expected_cn0_dbhz,
                "must be within (0, 100] dB-Hz",
            ));
        }
        if self.expected_constellations.is_empty() {
            return Err(SettingsError::Inconsistent {
                domain: d,
                reason: "expected_constellations must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Population standard deviation
fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Rule state: the lead-satellite timeline
#[derive(Debug, Default)]
pub struct SatelliteRules {
    current_lead: Option<String>,
    lead_changes: VecDeque<(i64, String)>,
}

impl SatelliteRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn unexpected(&self, obs: &SatelliteObservation, t: &SatelliteThresholds) -> Option<Finding> {
        let foreign = !t.expected_constellations.contains(&obs.constellation);
        let invalid_svid = !obs.constellation.svid_range().contains(&obs.svid);
        if !foreign && !invalid_svid {
            return None;
        }

        let mut finding = Finding::new(
            SatellitePattern::UnexpectedSatellite,
            ThreatLevel::High,
            if obs.used_in_fix { Confidence::High } else { Confidence::Medium },
            format!("Unexpected satellite {}", obs.emitter_id()),
        )
        .details(format!(
            "C/N0 {:.1} dB-Hz, elevation {:.0}, azimuth {:.0}",
            obs.cn0_dbhz, obs.elevation, obs.azimuth
        ));
        if foreign {
            finding = finding.factor(format!("{} not in expected constellations", obs.constellation));
        }
        if invalid_svid {
            finding = finding.factor(format!("SVID {} outside valid range", obs.svid));
        }
        if obs.used_in_fix {
            finding = finding.factor("used in position fix");
        }
        Some(finding)
    }

    fn abnormal_strength(&self, obs: &SatelliteObservation, t: &SatelliteThresholds) -> Option<Finding> {
        if obs.cn0_dbhz <= t.max_expected_cn0_dbhz {
            return None;
        }
        let margin = obs.cn0_dbhz - t.max_expected_cn0_dbhz;
        Some(
            Finding::new(
                SatellitePattern::AbnormalSignalStrength,
                ThreatLevel::Medium,
                Confidence::from_margin(margin.round() as i64 * 2),
                format!("{} received at {:.1} dB-Hz", obs.emitter_id(), obs.cn0_dbhz),
            )
            .details("Signals from orbit rarely exceed the expected ceiling; a nearby transmitter would")
            .factor(format!("ceiling {:.1} dB-Hz", t.max_expected_cn0_dbhz)),
        )
    }

    fn rapid_handoff(&self, now: i64, t: &SatelliteThresholds) -> Vec<Finding> {
        let since = now - t.rapid_handoff_threshold_ms;
        let recent: Vec<&(i64, String)> = self.lead_changes.iter().filter(|(ts, _)| *ts >= since).collect();
        if recent.len() < 2 {
            return Vec::new();
        }

        let finding = Finding::new(
            SatellitePattern::RapidHandoff,
            ThreatLevel::High,
            if recent.len() >= 3 { Confidence::High } else { Confidence::Medium },
            format!(
                "Lead satellite changed {} times within {} ms",
                recent.len(),
                t.rapid_handoff_threshold_ms
            ),
        )
        .related(recent.iter().map(|(_, id)| id.clone()));
        vec![finding]
    }

    fn uniformity(&self, fix: &SatelliteFix, t: &SatelliteThresholds) -> Vec<Finding> {
        let cn0: Vec<f64> = fix
            .satellites
            .iter()
            .filter(|s| s.cn0_dbhz > 0.0)
            .map(|s| s.cn0_dbhz)
            .collect();
        if cn0.len() < t.min_satellites_for_uniformity {
            return Vec::new();
        }
        let spread = stddev(&cn0);
        if spread >= t.uniform_cn0_stddev_db {
            return Vec::new();
        }

        let finding = Finding::new(
            SatellitePattern::SignalUniformity,
            ThreatLevel::High,
            if cn0.len() >= 2 * t.min_satellites_for_uniformity {
                Confidence::High
            } else {
                Confidence::Medium
            },
            format!("{} satellites with near-identical signal strength", cn0.len()),
        )
        .details(format!("C/N0 standard deviation {:.2} dB", spread))
        .factor("single transmitter replaying a whole constellation")
        .related(fix.satellites.iter().map(SatelliteObservation::emitter_id));
        vec![finding]
    }
}

impl DomainRules for SatelliteRules {
    type Thresholds = SatelliteThresholds;
    type Scan = SatelliteFix;
    type Observation = SatelliteObservation;

    fn settings(all: &DetectionSettings) -> &DomainSettings<SatelliteThresholds> {
        &all.satellite
    }

    fn scan(reading: &Reading) -> Option<&SatelliteFix> {
        match reading {
            Reading::Satellite(fix) => Some(fix),
            _ => None,
        }
    }

    fn observations(fix: &SatelliteFix) -> &[SatelliteObservation] {
        &fix.satellites
    }

    fn sighting(obs: &SatelliteObservation) -> Sighting {
        Sighting {
            emitter_id: obs.emitter_id(),
            domain: Domain::Satellite,
            timestamp: obs.timestamp,
            signal_strength: obs.cn0_dbhz.round() as i32,
            location: obs.location,
        }
    }

    fn observe_scan(&mut self, fix: &SatelliteFix, now: i64, t: &SatelliteThresholds) {
        if let Some(lead) = fix.lead() {
            let id = lead.emitter_id();
            if self.current_lead.as_deref() != Some(id.as_str()) {
                if self.current_lead.is_some() {
                    self.lead_changes.push_back((now, id.clone()));
                }
                self.current_lead = Some(id);
            }
        }
        let cutoff = now - t.rapid_handoff_threshold_ms;
        while self.lead_changes.front().map_or(false, |(ts, _)| *ts < cutoff) {
            self.lead_changes.pop_front();
        }
    }

    fn evaluate(
        &self,
        pattern: SatellitePattern,
        obs: &SatelliteObservation,
        _sighting: &Sighting,
        _history: &SightingHistory,
        t: &SatelliteThresholds,
    ) -> Option<Finding> {
        match pattern {
            SatellitePattern::UnexpectedSatellite => self.unexpected(obs, t),
            SatellitePattern::AbnormalSignalStrength => self.abnormal_strength(obs, t),
            _ => None,
        }
    }

    fn evaluate_scan(
        &self,
        pattern: SatellitePattern,
        fix: &SatelliteFix,
        now: i64,
        _history: &SightingHistory,
        t: &SatelliteThresholds,
    ) -> Vec<Finding> {
        match pattern {
            SatellitePattern::RapidHandoff => self.rapid_handoff(now, t),
            SatellitePattern::SignalUniformity => self.uniformity(fix, t),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::detection::{Classifier, CooldownGate};
    use crate::sensors::ScanReport;

    fn sat(constellation: Constellation, svid: u16, cn0: f64, ts: i64) -> SatelliteObservation {
        SatelliteObservation {
            constellation,
            svid,
            cn0_dbhz: cn0,
            elevation: 30.0 + svid as f64,
            azimuth: 10.0 * svid as f64,
            used_in_fix: true,
            timestamp: ts,
            location: None,
        }
    }

    fn report(satellites: Vec<SatelliteObservation>, ts: i64) -> ScanReport {
        ScanReport {
            domain: Domain::Satellite,
            timestamp: ts,
            reading: Reading::Satellite(SatelliteFix { satellites }),
        }
    }

    fn classifier() -> SatelliteClassifier {
        SatelliteClassifier::new(SatelliteRules::new(), 64, Arc::new(CooldownGate::new()))
    }

    fn count(anomalies: &[crate::detection::Anomaly], pattern: SatellitePattern) -> usize {
        anomalies.iter().filter(|a| a.anomaly_type == pattern.id()).count()
    }

    #[test]
    fn test_unexpected_satellite() {
        let mut settings = DetectionSettings::default();
        settings.satellite.thresholds.expected_constellations = [Constellation::Gps].into_iter().collect();
        let mut c = classifier();

        let out = c.classify(
            &report(
                vec![
                    sat(Constellation::Gps, 5, 40.0, 0),
                    sat(Constellation::Gps, 77, 35.0, 0),
                    sat(Constellation::Glonass, 3, 38.0, 0),
                ],
                0,
            ),
            &settings,
        );
        assert_eq!(count(&out, SatellitePattern::UnexpectedSatellite), 2);
        let ids: Vec<_> = out.iter().filter_map(|a| a.emitter_id.clone()).collect();
        assert!(ids.contains(&"GPS-77".to_string()));
        assert!(ids.contains(&"GLONASS-3".to_string()));
    }

    #[test]
    fn test_rapid_handoff_needs_two_changes() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        // Lead flips G1 -> G2 -> G3 inside 5 s
        let leads = [(1u16, 0i64), (2, 1_000), (3, 2_000)];
        let mut fired = Vec::new();
        for (svid, ts) in leads {
            let sats = vec![
                sat(Constellation::Gps, svid, 48.0, ts),
                sat(Constellation::Gps, 20, 30.0, ts),
            ];
            let out = c.classify(&report(sats, ts), &settings);
            fired.push(count(&out, SatellitePattern::RapidHandoff));
        }
        assert_eq!(fired, vec![0, 0, 1]);
    }

    #[test]
    fn test_slow_handoff_is_normal() {
        let settings = DetectionSettings::default();
        let mut c = classifier();
        for (i, svid) in [1u16, 2, 3].into_iter().enumerate() {
            let ts = i as i64 * 10_000;
            let out = c.classify(&report(vec![sat(Constellation::Gps, svid, 45.0, ts)], ts), &settings);
            assert_eq!(count(&out, SatellitePattern::RapidHandoff), 0);
        }
    }

    #[test]
    fn test_signal_uniformity() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        let spoofed: Vec<_> = (1..=6).map(|svid| sat(Constellation::Gps, svid, 42.0 + 0.1 * svid as f64, 0)).collect();
        let out = c.classify(&report(spoofed, 0), &settings);
        assert_eq!(count(&out, SatellitePattern::SignalUniformity), 1);

        let mut c = classifier();
        let real: Vec<_> = (1..=6).map(|svid| sat(Constellation::Gps, svid, 25.0 + 4.0 * svid as f64, 0)).collect();
        let out = c.classify(&report(real, 0), &settings);
        assert_eq!(count(&out, SatellitePattern::SignalUniformity), 0);
    }

    #[test]
    fn test_abnormal_signal_strength() {
        let settings = DetectionSettings::default();
        let mut c = classifier();
        let out = c.classify(&report(vec![sat(Constellation::Galileo, 11, 62.0, 0)], 0), &settings);
        assert_eq!(count(&out, SatellitePattern::AbnormalSignalStrength), 1);
    }
}
