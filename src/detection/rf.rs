// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! RF classifier - jamming detection on raw spectrum sweeps

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

use super::{
    Confidence, DomainClassifier, DomainRules, Finding, PatternId, PatternKind, PatternScope,
    Sighting, SightingHistory, ThreatLevel,
};
use crate::config::{ensure_dbm, ensure_positive_ms, DetectionSettings, DomainSettings, SettingsError, ThresholdSet};
use crate::sensors::{Domain, Reading, RfSample, RfSweep};

pub type RfClassifier = DomainClassifier<RfRules>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RfPattern {
    Jamming,
}

impl PatternKind for RfPattern {
    const DOMAIN: Domain = Domain::Rf;
    const ALL: &'static [Self] = &[RfPattern::Jamming];

    fn name(&self) -> &'static str {
        match self {
            RfPattern::Jamming => "Jamming",
        }
    }

    fn scope(&self) -> PatternScope {
        PatternScope::Observation
    }

    fn id(self) -> PatternId {
        PatternId::Rf(self)
    }
}

impl From<RfPattern> for PatternId {
    fn from(p: RfPattern) -> Self {
        p.id()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfThresholds {
    pub jamming_rssi_threshold: i32,
    pub jamming_duration_ms: i64,
    pub min_anomaly_interval_ms: i64,
}

impl Default for RfThresholds {
    fn default() -> Self {
        Self {
            jamming_rssi_threshold: -50,
            jamming_duration_ms: 1_000,
            min_anomaly_interval_ms: 60_000,
        }
    }
}

impl ThresholdSet for RfThresholds {
    type Pattern = RfPattern;

    fn min_anomaly_interval_ms(&self) -> i64 {
        self.min_anomaly_interval_ms
    }

    fn window_ms(&self, pattern: RfPattern) -> i64 {
        match pattern {
            RfPattern::Jamming => self.jamming_duration_ms,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        ensure_dbm(Domain::Rf, "jamming_rssi_threshold", self.jamming_rssi_threshold)?;
        ensure_positive_ms(Domain::Rf, "jamming_duration_ms", self.jamming_duration_ms)
    }
}

#[derive(Debug, Clone, Copy)]
struct Carrier {
    onset: i64,
    last_hot: i64,
    peak: i32,
}

/// Rule state: frequencies currently carrying undecodable energy
#[derive(Debug, Default)]
pub struct RfRules {
    carriers: HashMap<u64, Carrier>,
}

impl RfRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_hot(sample: &RfSample, t: &RfThresholds) -> bool {
        sample.rssi > t.jamming_rssi_threshold && !sample.decoded
    }
}

impl DomainRules for RfRules {
    type Thresholds = RfThresholds;
    type Scan = RfSweep;
    type Observation = RfSample;

    fn settings(all: &DetectionSettings) -> &DomainSettings<RfThresholds> {
        &all.rf
    }

    fn scan(reading: &Reading) -> Option<&RfSweep> {
        match reading {
            Reading::Rf(sweep) => Some(sweep),
            _ => None,
        }
    }

    fn observations(sweep: &RfSweep) -> &[RfSample] {
        &sweep.samples
    }

    fn sighting(sample: &RfSample) -> Sighting {
        Sighting {
            emitter_id: sample.emitter_id(),
            domain: Domain::Rf,
            timestamp: sample.timestamp,
            signal_strength: sample.rssi,
            location: None,
        }
    }

    fn observe(&mut self, sample: &RfSample, _sighting: &Sighting, t: &RfThresholds) {
        if !Self::is_hot(sample, t) {
            self.carriers.remove(&sample.frequency_hz);
            return;
        }
        let carrier = self.carriers.entry(sample.frequency_hz).or_insert(Carrier {
            onset: sample.timestamp,
            last_hot: sample.timestamp,
            peak: sample.rssi,
        });
        // A gap longer than the duration breaks the run
        if sample.timestamp - carrier.last_hot > t.jamming_duration_ms {
            carrier.onset = sample.timestamp;
            carrier.peak = sample.rssi;
        }
        carrier.last_hot = sample.timestamp;
        carrier.peak = carrier.peak.max(sample.rssi);
    }

    fn evaluate(
        &self,
        _pattern: RfPattern,
        sample: &RfSample,
        _sighting: &Sighting,
        _history: &SightingHistory,
        t: &RfThresholds,
    ) -> Option<Finding> {
        if !Self::is_hot(sample, t) {
            return None;
        }
        let carrier = self.carriers.get(&sample.frequency_hz)?;
        let sustained = sample.timestamp - carrier.onset;
        if sustained < t.jamming_duration_ms {
            return None;
        }

        Some(
            Finding::new(
                RfPattern::Jamming,
                ThreatLevel::High,
                Confidence::from_margin(i64::from(carrier.peak) - i64::from(t.jamming_rssi_threshold)),
                format!(
                    "Possible jamming on {:.3} MHz for {} ms",
                    sample.frequency_hz as f64 / 1e6,
                    sustained
                ),
            )
            .details(format!("peak {} dBm, no valid decode", carrier.peak))
            .factor(format!("threshold {} dBm", t.jamming_rssi_threshold)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::detection::{Classifier, CooldownGate};
    use crate::sensors::ScanReport;

    const FREQ: u64 = 433_920_000;

    fn sweep(rssi: i32, decoded: bool, ts: i64) -> ScanReport {
        ScanReport {
            domain: Domain::Rf,
            timestamp: ts,
            reading: Reading::Rf(RfSweep {
                samples: vec![RfSample { frequency_hz: FREQ, rssi, decoded, timestamp: ts }],
            }),
        }
    }

    fn classifier() -> RfClassifier {
        RfClassifier::new(RfRules::new(), 64, Arc::new(CooldownGate::new()))
    }

    #[test]
    fn test_sustained_carrier_is_jamming() {
        let settings = DetectionSettings::default();
        let mut c = classifier();

        let fired: Vec<usize> = [0, 500, 1_000, 1_500]
            .into_iter()
            .map(|ts| c.classify(&sweep(-30, false, ts), &settings).len())
            .collect();
        assert_eq!(fired, vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_decoded_traffic_is_not_jamming() {
        let settings = DetectionSettings::default();
        let mut c = classifier();
        for ts in [0, 500, 1_000, 1_500] {
            assert!(c.classify(&sweep(-30, true, ts), &settings).is_empty());
        }
    }

    #[test]
    fn test_interruption_resets_onset() {
        let settings = DetectionSettings::default();
        let mut c = classifier();
        assert!(c.classify(&sweep(-30, false, 0), &settings).is_empty());
        assert!(c.classify(&sweep(-90, false, 600), &settings).is_empty());
        assert!(c.classify(&sweep(-30, false, 1_200), &settings).is_empty());
        assert_eq!(c.classify(&sweep(-30, false, 2_200), &settings).len(), 1);
    }
}
