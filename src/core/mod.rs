// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Core engine module - orchestrates scanners and classifiers

mod clock;
mod engine;
mod event_bus;

pub use clock::Clock;
pub use engine::Engine;
pub use event_bus::{Event, EventBus, EventPayload, EventType};

use serde::{Deserialize, Serialize};

/// System-wide state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub running: bool,
    pub scanners_registered: usize,
    pub anomalies_detected: u64,
    /// Readings skipped because a classifier fell behind the bus
    pub readings_dropped: u64,
    /// Aggregate scanner health in [0, 100]
    pub health_score: f64,
    pub uptime_seconds: u64,
    /// Engine-clock timestamp of the newest anomaly
    pub last_anomaly: Option<i64>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            running: false,
            scanners_registered: 0,
            anomalies_detected: 0,
            readings_dropped: 0,
            health_score: 100.0,
            uptime_seconds: 0,
            last_anomaly: None,
        }
    }
}
