// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Tracking correlation - is this emitter following the user?

use serde::{Deserialize, Serialize};

use super::{Confidence, Sighting, SightingHistory, ThreatLevel};
use crate::sensors::GeoPoint;

/// Knobs shared by the BLE and Wi-Fi tracking patterns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingParams {
    pub tracking_duration_ms: i64,
    pub min_seen_count: usize,
    pub location_noise_radius_m: f64,
}

/// Why the correlator thinks an emitter is following
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingVerdict {
    pub sightings: usize,
    /// 0 when the sightings carry no usable location
    pub distinct_locations: usize,
    pub span_ms: i64,
    pub severity: ThreatLevel,
    pub confidence: Confidence,
}

impl TrackingVerdict {
    pub fn located(&self) -> bool {
        self.distinct_locations > 0
    }
}

/// Stateless; everything it needs lives in the sighting history
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingCorrelator;

impl TrackingCorrelator {
    pub fn evaluate(
        history: &SightingHistory,
        emitter_id: &str,
        now: i64,
        params: &TrackingParams,
    ) -> Option<TrackingVerdict> {
        let since = now - params.tracking_duration_ms;
        let recent: Vec<&Sighting> = history
            .within(emitter_id, since)
            .filter(|s| s.timestamp <= now)
            .collect();

        if recent.len() < params.min_seen_count {
            return None;
        }

        let span_ms = match (recent.first(), recent.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0,
        };

        let located: Vec<GeoPoint> = recent.iter().filter_map(|s| s.location).collect();

        if located.len() >= 2 {
            let distinct = Self::distinct_locations(&located, params.location_noise_radius_m);
            if distinct < 2 {
                // Seen a lot, but always in the same place: nearby, not following
                return None;
            }

            let confidence = if distinct >= 3 { Confidence::High } else { Confidence::Medium };
            return Some(TrackingVerdict {
                sightings: recent.len(),
                distinct_locations: distinct,
                span_ms,
                severity: ThreatLevel::High,
                confidence,
            });
        }

        Some(TrackingVerdict {
            sightings: recent.len(),
            distinct_locations: 0,
            span_ms,
            severity: ThreatLevel::Medium,
            confidence: Confidence::Low,
        })
    }

    /// Greedy clustering: a point starts a new cluster when it is farther than
    /// `radius_m` from every existing cluster seed.
    pub fn distinct_locations(points: &[GeoPoint], radius_m: f64) -> usize {
        let mut seeds: Vec<GeoPoint> = Vec::new();
        for point in points {
            if seeds.iter().all(|seed| seed.distance_m(point) > radius_m) {
                seeds.push(*point);
            }
        }
        seeds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Domain;

    const PARAMS: TrackingParams = TrackingParams {
        tracking_duration_ms: 600_000,
        min_seen_count: 3,
        location_noise_radius_m: 50.0,
    };

    fn sighting(ts: i64, location: Option<GeoPoint>) -> Sighting {
        Sighting {
            emitter_id: "tag".to_string(),
            domain: Domain::Ble,
            timestamp: ts,
            signal_strength: -70,
            location,
        }
    }

    // Roughly 1.1 km apart
    fn spot(i: usize) -> GeoPoint {
        GeoPoint::new(47.60 + 0.01 * i as f64, -122.33)
    }

    #[test]
    fn test_fires_on_third_sighting() {
        let mut history = SightingHistory::default();
        let times = [0, 60_000, 120_000, 180_000, 240_000];

        for (i, ts) in times.iter().enumerate() {
            history.record(sighting(*ts, Some(spot(i % 3))));
            let verdict = TrackingCorrelator::evaluate(&history, "tag", *ts, &PARAMS);
            if i < 2 {
                assert!(verdict.is_none(), "fired early at sighting {}", i + 1);
            } else {
                let verdict = verdict.unwrap();
                assert_eq!(verdict.distinct_locations, 3);
                assert_eq!(verdict.confidence, Confidence::High);
            }
        }
    }

    #[test]
    fn test_stationary_beacon_is_not_following() {
        let mut history = SightingHistory::default();
        for i in 0..6 {
            // Jitter well inside the noise radius
            let p = GeoPoint::new(47.6 + 0.00005 * i as f64, -122.33);
            history.record(sighting(i * 10_000, Some(p)));
        }
        assert!(TrackingCorrelator::evaluate(&history, "tag", 50_000, &PARAMS).is_none());
    }

    #[test]
    fn test_without_location_fires_with_low_confidence() {
        let mut history = SightingHistory::default();
        for i in 0..3 {
            history.record(sighting(i * 1_000, None));
        }
        let verdict = TrackingCorrelator::evaluate(&history, "tag", 2_000, &PARAMS).unwrap();
        assert!(!verdict.located());
        assert_eq!(verdict.confidence, Confidence::Low);
        assert_eq!(verdict.span_ms, 2_000);
    }

    #[test]
    fn test_old_sightings_fall_out_of_window() {
        let mut history = SightingHistory::default();
        history.record(sighting(0, None));
        history.record(sighting(10_000, None));
        history.record(sighting(700_000, None));
        assert!(TrackingCorrelator::evaluate(&history, "tag", 700_000, &PARAMS).is_none());
    }
}
