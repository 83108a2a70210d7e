// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Sensor traits and common types

use std::fmt;
use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BleScan, CellScan, RfSweep, SatelliteFix, WifiScan};

/// Radio domains watched by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Cellular,   // Cell towers / base stations
    Satellite,  // GNSS space vehicles
    Ble,        // Bluetooth Low Energy advertisers
    Wifi,       // 802.11 access points
    Rf,         // Raw RF spectrum
}

impl Domain {
    /// Every domain, in registration order
    pub const ALL: [Domain; 5] = [
        Domain::Cellular,
        Domain::Satellite,
        Domain::Ble,
        Domain::Wifi,
        Domain::Rf,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Domain::Cellular => "cellular",
            Domain::Satellite => "satellite",
            Domain::Ble => "ble",
            Domain::Wifi => "wifi",
            Domain::Rf => "rf",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// WGS84 position attached to a sighting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lon - self.lon).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Payload returned by a single sensor poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Reading {
    Cellular(CellScan),
    Satellite(SatelliteFix),
    Ble(BleScan),
    Wifi(WifiScan),
    Rf(RfSweep),
    /// The sensor is alive but has nothing new to report
    Heartbeat,
}

impl Reading {
    /// Domain of the payload, `None` for heartbeats
    pub fn domain(&self) -> Option<Domain> {
        match self {
            Reading::Cellular(_) => Some(Domain::Cellular),
            Reading::Satellite(_) => Some(Domain::Satellite),
            Reading::Ble(_) => Some(Domain::Ble),
            Reading::Wifi(_) => Some(Domain::Wifi),
            Reading::Rf(_) => Some(Domain::Rf),
            Reading::Heartbeat => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Reading::Cellular(scan) => scan.cells.is_empty(),
            Reading::Satellite(fix) => fix.satellites.is_empty(),
            Reading::Ble(scan) => scan.advertisements.is_empty(),
            Reading::Wifi(scan) => {
                scan.beacons.is_empty()
                    && scan.deauth_frames.is_empty()
                    && scan.probe_responses.is_empty()
            }
            Reading::Rf(sweep) => sweep.samples.is_empty(),
            Reading::Heartbeat => true,
        }
    }

    /// Whether this reading proves the sensor is alive.
    ///
    /// An empty payload is indistinguishable from silence; sensors that have
    /// nothing to report must send [`Reading::Heartbeat`] instead.
    pub fn is_live(&self) -> bool {
        matches!(self, Reading::Heartbeat) || !self.is_empty()
    }
}

/// A live reading tagged with the scan loop that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub domain: Domain,
    /// Engine clock, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub reading: Reading,
}

/// Sensor failure taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("sensor call timed out after {0:?}")]
    Timeout(Duration),

    /// Transient failure (permission blip, radio busy); the loop backs off and retries
    #[error("recoverable sensor error: {0}")]
    Recoverable(String),

    /// Hardware absent or permission permanently denied; the loop is parked
    #[error("fatal sensor error: {0}")]
    Fatal(String),
}

impl SensorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SensorError::Fatal(_))
    }
}

/// Trait for every radio source polled by a scan loop
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Get sensor unique identifier
    fn id(&self) -> &str;

    /// Domain this sensor reports on
    fn domain(&self) -> Domain;

    /// Acquire the underlying radio handle
    async fn connect(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Release the underlying radio handle
    async fn disconnect(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Take one reading.
    ///
    /// Observation `timestamp` fields are epoch milliseconds on the engine clock
    /// (`Engine::now_ms`). Classifier history is pruned against the scan report
    /// time, so observations stamped in another time base are dropped.
    async fn poll(&mut self) -> Result<Reading, SensorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_between_points() {
        let a = GeoPoint::new(47.6062, -122.3321);
        let b = GeoPoint::new(47.6062, -122.3321);
        assert!(a.distance_m(&b) < 0.001);

        // ~111 km per degree of latitude
        let c = GeoPoint::new(48.6062, -122.3321);
        let d = a.distance_m(&c);
        assert!((d - 111_195.0).abs() < 500.0, "got {}", d);
    }

    #[test]
    fn test_empty_payload_is_not_live() {
        assert!(!Reading::Wifi(WifiScan::default()).is_live());
        assert!(Reading::Heartbeat.is_live());
        assert_eq!(Reading::Heartbeat.domain(), None);
        assert_eq!(Reading::Rf(RfSweep::default()).domain(), Some(Domain::Rf));
    }
}
