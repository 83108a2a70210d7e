// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Detection module - per-domain classifiers, tracking correlation and cooldown

mod classifier;
mod history;
mod cooldown;
mod correlation;
mod cellular;
mod satellite;
mod ble;
mod wifi;
mod rf;

pub use classifier::{DomainClassifier, DomainRules, PatternKind, PatternScope};
pub use history::SightingHistory;
pub use cooldown::{CooldownGate, CooldownKey};
pub use correlation::{TrackingCorrelator, TrackingParams, TrackingVerdict};
pub use cellular::{CellularClassifier, CellularPattern, CellularRules, CellularThresholds};
pub use satellite::{SatelliteClassifier, SatellitePattern, SatelliteRules, SatelliteThresholds};
pub use ble::{identify_tracker, BleClassifier, BlePattern, BleRules, BleThresholds, TrackerKind};
pub use wifi::{WifiClassifier, WifiPattern, WifiRules, WifiThresholds};
pub use rf::{RfClassifier, RfPattern, RfRules, RfThresholds};

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DetectionSettings;
use crate::core::EventBus;
use crate::sensors::{Domain, GeoPoint, ScanReport};

/// Severity of an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreatLevel::Info => "INFO",
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// How sure a pattern is about its finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Confidence from how far a measurement cleared its threshold (dB or counts)
    pub fn from_margin(margin: i64) -> Self {
        match margin {
            m if m >= 20 => Confidence::High,
            m if m >= 10 => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// One step down, used when optional data is missing
    pub fn reduced(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Pattern identifier across all domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PatternId {
    Cellular(CellularPattern),
    Satellite(SatellitePattern),
    Ble(BlePattern),
    Wifi(WifiPattern),
    Rf(RfPattern),
}

impl PatternId {
    pub fn domain(&self) -> Domain {
        match self {
            PatternId::Cellular(_) => Domain::Cellular,
            PatternId::Satellite(_) => Domain::Satellite,
            PatternId::Ble(_) => Domain::Ble,
            PatternId::Wifi(_) => Domain::Wifi,
            PatternId::Rf(_) => Domain::Rf,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatternId::Cellular(p) => p.name(),
            PatternId::Satellite(p) => p.name(),
            PatternId::Ble(p) => p.name(),
            PatternId::Wifi(p) => p.name(),
            PatternId::Rf(p) => p.name(),
        }
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain(), self.name())
    }
}

/// One observation of one emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub emitter_id: String,
    pub domain: Domain,
    pub timestamp: i64,
    pub signal_strength: i32,
    pub location: Option<GeoPoint>,
}

/// Raw output of a pattern, before cooldown and identity are applied
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub pattern: PatternId,
    pub severity: ThreatLevel,
    pub confidence: Confidence,
    pub emitter_id: Option<String>,
    pub description: String,
    pub technical_details: String,
    pub contributing_factors: Vec<String>,
    pub related_emitters: Vec<String>,
}

impl Finding {
    pub fn new(
        pattern: impl Into<PatternId>,
        severity: ThreatLevel,
        confidence: Confidence,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            severity,
            confidence,
            emitter_id: None,
            description: description.into(),
            technical_details: String::new(),
            contributing_factors: Vec::new(),
            related_emitters: Vec::new(),
        }
    }

    pub fn emitter(mut self, id: impl Into<String>) -> Self {
        self.emitter_id = Some(id.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.technical_details = details.into();
        self
    }

    pub fn factor(mut self, factor: impl Into<String>) -> Self {
        self.contributing_factors.push(factor.into());
        self
    }

    pub fn related<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_emitters.extend(ids.into_iter().map(Into::into));
        self
    }
}

/// Emitted alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub domain: Domain,
    #[serde(rename = "type")]
    pub anomaly_type: PatternId,
    pub severity: ThreatLevel,
    pub confidence: Confidence,
    pub timestamp: i64,
    pub emitter_id: Option<String>,
    pub description: String,
    pub technical_details: String,
    pub contributing_factors: Vec<String>,
    pub related_emitters: Vec<String>,
}

impl Anomaly {
    pub fn from_finding(finding: Finding, timestamp: i64) -> Self {
        let domain = finding.pattern.domain();
        let name = format!(
            "flockwatch:{}:{}:{}:{}",
            domain,
            finding.pattern.name(),
            finding.emitter_id.as_deref().unwrap_or("-"),
            timestamp
        );

        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            domain,
            anomaly_type: finding.pattern,
            severity: finding.severity,
            confidence: finding.confidence,
            timestamp,
            emitter_id: finding.emitter_id,
            description: finding.description,
            technical_details: finding.technical_details,
            contributing_factors: finding.contributing_factors,
            related_emitters: finding.related_emitters,
        }
    }
}

/// A domain classifier as seen by the detection engine
pub trait Classifier: Send {
    fn domain(&self) -> Domain;

    fn classify(&mut self, report: &ScanReport, settings: &DetectionSettings) -> Vec<Anomaly>;
}

/// Runs one task per classifier and keeps the recent anomaly log
pub struct DetectionEngine {
    event_bus: Arc<EventBus>,
    recent_anomalies: Mutex<VecDeque<Anomaly>>,
    anomaly_count: AtomicU64,
    readings_dropped: AtomicU64,
}

impl DetectionEngine {
    const RECENT_CAPACITY: usize = 1000;

    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            recent_anomalies: Mutex::new(VecDeque::new()),
            anomaly_count: AtomicU64::new(0),
            readings_dropped: AtomicU64::new(0),
        }
    }

    /// Spawn the classifier task for one domain
    pub fn spawn(
        self: &Arc<Self>,
        mut classifier: Box<dyn Classifier>,
        settings: watch::Receiver<Arc<DetectionSettings>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut reading_rx = self.event_bus.subscribe_readings();

        tokio::spawn(async move {
            let domain = classifier.domain();
            info!("Starting {} classifier", domain);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    msg = reading_rx.recv() => match msg {
                        Ok(report) if report.domain == domain => {
                            let snapshot = settings.borrow().clone();
                            for anomaly in classifier.classify(&report, &snapshot) {
                                engine.record_anomaly(anomaly);
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            engine.readings_dropped.fetch_add(missed, Ordering::Relaxed);
                            warn!("{} classifier lagged, {} readings skipped", domain, missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }

            info!("{} classifier shutting down...", domain);
        })
    }

    fn record_anomaly(&self, anomaly: Anomaly) {
        self.anomaly_count.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Anomaly {} [{}] {}",
            anomaly.anomaly_type, anomaly.severity, anomaly.description
        );

        {
            let mut recent = self.recent_anomalies.lock();
            recent.push_back(anomaly.clone());
            while recent.len() > Self::RECENT_CAPACITY {
                recent.pop_front();
            }
        }

        self.event_bus.publish_anomaly(anomaly);
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomaly_count.load(Ordering::Relaxed)
    }

    /// Readings skipped by lagging classifier tasks, summed over all domains
    pub fn readings_dropped(&self) -> u64 {
        self.readings_dropped.load(Ordering::Relaxed)
    }

    /// Newest first
    pub fn recent_anomalies(&self, limit: usize) -> Vec<Anomaly> {
        let recent = self.recent_anomalies.lock();
        recent.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_from_margin() {
        assert_eq!(Confidence::from_margin(0), Confidence::Low);
        assert_eq!(Confidence::from_margin(10), Confidence::Medium);
        assert_eq!(Confidence::from_margin(25), Confidence::High);
        assert_eq!(Confidence::High.reduced(), Confidence::Medium);
    }

    struct CountingClassifier(Arc<AtomicU64>);

    impl Classifier for CountingClassifier {
        fn domain(&self) -> Domain {
            Domain::Wifi
        }

        fn classify(&mut self, _report: &ScanReport, _settings: &DetectionSettings) -> Vec<Anomaly> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_lagging_classifier_counts_dropped_readings() {
        let bus = Arc::new(EventBus::new(4));
        let engine = Arc::new(DetectionEngine::new(Arc::clone(&bus)));
        let seen = Arc::new(AtomicU64::new(0));
        let (_settings_tx, settings_rx) = watch::channel(Arc::new(DetectionSettings::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = engine.spawn(Box::new(CountingClassifier(Arc::clone(&seen))), settings_rx, shutdown_rx);
        for ts in 0..10 {
            bus.publish_reading(ScanReport {
                domain: Domain::Wifi,
                timestamp: ts,
                reading: crate::sensors::Reading::Wifi(Default::default()),
            });
        }

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.readings_dropped(), 6);
        assert_eq!(seen.load(Ordering::SeqCst), 4);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_anomaly_id_is_deterministic() {
        let finding = || {
            Finding::new(WifiPattern::ProximityAlert, ThreatLevel::Medium, Confidence::Medium, "close")
                .emitter("AA:BB")
        };
        let a = Anomaly::from_finding(finding(), 1_000);
        let b = Anomaly::from_finding(finding(), 1_000);
        let c = Anomaly::from_finding(finding(), 2_000);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.domain, Domain::Wifi);
        assert_eq!(a.anomaly_type.to_string(), "wifi/ProximityAlert");
    }
}
