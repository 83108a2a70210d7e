// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Shared classifier skeleton
//!
//! Every domain classifier runs the same pipeline per scan:
//!
//! 1. record a sighting per observation and update rule state
//! 2. prune history to the longest enabled window
//! 3. domain gate, then per-pattern gate
//! 4. observation-level patterns, then scan-level patterns
//! 5. cooldown gate, anomaly identity
//!
//! The domain specific parts live behind [`DomainRules`].

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Anomaly, Classifier, CooldownGate, Finding, PatternId, Sighting, SightingHistory};
use crate::config::{DetectionSettings, DomainSettings, ThresholdSet};
use crate::sensors::{Domain, Reading, ScanReport};

/// Whether a pattern looks at one observation or a whole scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    Observation,
    Scan,
}

/// A closed per-domain pattern catalog
pub trait PatternKind:
    Debug + Copy + Eq + Ord + Hash + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const DOMAIN: Domain;

    /// Every pattern, in evaluation order
    const ALL: &'static [Self];

    fn name(&self) -> &'static str;

    fn scope(&self) -> PatternScope;

    fn id(self) -> PatternId;
}

pub type PatternOf<R> = <<R as DomainRules>::Thresholds as ThresholdSet>::Pattern;

/// Domain specific half of a classifier
pub trait DomainRules: Send + 'static {
    type Thresholds: ThresholdSet;
    type Scan;
    type Observation;

    fn settings(all: &DetectionSettings) -> &DomainSettings<Self::Thresholds>;

    fn scan(reading: &Reading) -> Option<&Self::Scan>;

    fn observations(scan: &Self::Scan) -> &[Self::Observation];

    fn sighting(observation: &Self::Observation) -> Sighting;

    /// Sightings weaker than this are recorded but never alert
    fn alert_floor(_thresholds: &Self::Thresholds) -> Option<i32> {
        None
    }

    /// Update rule state with a freshly recorded observation
    fn observe(
        &mut self,
        _observation: &Self::Observation,
        _sighting: &Sighting,
        _thresholds: &Self::Thresholds,
    ) {
    }

    /// Update rule state once per scan, after every observation
    fn observe_scan(&mut self, _scan: &Self::Scan, _now: i64, _thresholds: &Self::Thresholds) {}

    fn evaluate(
        &self,
        _pattern: PatternOf<Self>,
        _observation: &Self::Observation,
        _sighting: &Sighting,
        _history: &SightingHistory,
        _thresholds: &Self::Thresholds,
    ) -> Option<Finding> {
        None
    }

    fn evaluate_scan(
        &self,
        _pattern: PatternOf<Self>,
        _scan: &Self::Scan,
        _now: i64,
        _history: &SightingHistory,
        _thresholds: &Self::Thresholds,
    ) -> Vec<Finding> {
        Vec::new()
    }
}

/// Classifier for one domain: rules + history + shared cooldown
pub struct DomainClassifier<R: DomainRules> {
    rules: R,
    history: SightingHistory,
    cooldown: Arc<CooldownGate>,
}

impl<R: DomainRules> DomainClassifier<R> {
    pub fn new(rules: R, history_capacity: usize, cooldown: Arc<CooldownGate>) -> Self {
        Self {
            rules,
            history: SightingHistory::new(history_capacity),
            cooldown,
        }
    }

    pub fn history(&self) -> &SightingHistory {
        &self.history
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Run the pipeline on one scan; deterministic for identical inputs
    pub fn process(&mut self, scan: &R::Scan, now: i64, settings: &DetectionSettings) -> Vec<Anomaly> {
        let domain_settings = R::settings(settings);
        let thresholds = &domain_settings.thresholds;
        let observations = R::observations(scan);

        let sightings: Vec<Sighting> = observations.iter().map(R::sighting).collect();
        for (observation, sighting) in observations.iter().zip(&sightings) {
            self.history.record(sighting.clone());
            self.rules.observe(observation, sighting, thresholds);
        }
        self.rules.observe_scan(scan, now, thresholds);
        self.history.prune(now - domain_settings.retention_ms());

        if !domain_settings.enabled {
            return Vec::new();
        }

        let enabled: Vec<PatternOf<R>> = <PatternOf<R> as PatternKind>::ALL
            .iter()
            .copied()
            .filter(|p| domain_settings.is_pattern_enabled(*p))
            .collect();

        let mut findings: Vec<(Finding, i64)> = Vec::new();
        let floor = R::alert_floor(thresholds);

        for (observation, sighting) in observations.iter().zip(&sightings) {
            if floor.map_or(false, |f| sighting.signal_strength < f) {
                continue;
            }
            for pattern in enabled.iter().filter(|p| p.scope() == PatternScope::Observation) {
                if let Some(mut finding) =
                    self.rules.evaluate(*pattern, observation, sighting, &self.history, thresholds)
                {
                    if finding.emitter_id.is_none() {
                        finding.emitter_id = Some(sighting.emitter_id.clone());
                    }
                    findings.push((finding, sighting.timestamp));
                }
            }
        }

        for pattern in enabled.iter().filter(|p| p.scope() == PatternScope::Scan) {
            for finding in self.rules.evaluate_scan(*pattern, scan, now, &self.history, thresholds) {
                findings.push((finding, now));
            }
        }

        let min_interval = thresholds.min_anomaly_interval_ms();
        findings
            .into_iter()
            .filter(|(finding, timestamp)| {
                self.cooldown.should_fire(
                    finding.pattern.domain(),
                    finding.pattern,
                    finding.emitter_id.as_deref(),
                    *timestamp,
                    min_interval,
                )
            })
            .map(|(finding, timestamp)| Anomaly::from_finding(finding, timestamp))
            .collect()
    }
}

impl<R: DomainRules> Classifier for DomainClassifier<R> {
    fn domain(&self) -> Domain {
        <PatternOf<R> as PatternKind>::DOMAIN
    }

    fn classify(&mut self, report: &ScanReport, settings: &DetectionSettings) -> Vec<Anomaly> {
        match R::scan(&report.reading) {
            Some(scan) => self.process(scan, report.timestamp, settings),
            None => Vec::new(),
        }
    }
}
