// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Sensor module - radio payloads, the sensor seam and scan loop supervision

mod traits;
mod cellular;
mod satellite;
mod ble;
mod wifi;
mod rf;
mod health;
mod scan_loop;
mod supervisor;
#[cfg(feature = "simulator")]
mod simulator;
#[cfg(test)]
pub(crate) mod testing;

pub use traits::{Domain, GeoPoint, Reading, ScanReport, SensorError, SensorSource};
pub use cellular::*;
pub use satellite::*;
pub use ble::*;
pub use wifi::*;
pub use rf::*;
pub use health::{backoff_delay, health_score, DetectorHealthStatus, HealthSnapshot, ScanLoopState};
pub use supervisor::{ScannerSupervisor, SupervisorConfig, SupervisorError};
#[cfg(feature = "simulator")]
pub use simulator::SimulatedSensor;
