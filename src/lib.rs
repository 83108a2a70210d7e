// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Flockwatch - Surveillance-Emitter Detection Engine
//!
//! Watches the radio environment around a user for signs of surveillance:
//! - Supervised scan loops per radio domain with backoff, stall detection and a health score
//! - Cellular classifier (IMSI-catcher indicators, encryption downgrades)
//! - Satellite classifier (GNSS spoofing indicators)
//! - BLE classifier (known trackers, proximity, following)
//! - Wi-Fi classifier (evil twins, deauth floods, karma attacks, following)
//! - RF classifier (sustained jamming)
//! - Per-emitter cooldown so one source does not flood the anomaly stream
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Flockwatch Engine                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │ Sensor  │→ │ ScanLoop  │→ │ Classifier │→ │ Cooldown │  │
//! │  │ Source  │  │ (per dom.)│  │ (per dom.) │  │   Gate   │  │
//! │  └─────────┘  └───────────┘  └────────────┘  └──────────┘  │
//! │                     ↓              ↑               ↓       │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                    Event Bus                        │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │       ↓                                       ↓            │
//! │  ┌────────────┐                        ┌──────────────┐    │
//! │  │ Supervisor │ → health snapshots     │ Anomaly feed │    │
//! │  └────────────┘                        └──────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod core;
pub mod sensors;
pub mod detection;
pub mod config;

// Re-exports for convenience
pub use config::{Config, DetectionSettings};
pub use core::{Engine, EventBus};
pub use detection::{Anomaly, Confidence, PatternId, ThreatLevel};
pub use sensors::{Domain, Reading, ScannerSupervisor, SensorError, SensorSource};

/// Flockwatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Flockwatch name
pub const NAME: &str = "Flockwatch";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Enabled features
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "simulator")]
    features.push("simulator".to_string());

    features
}
