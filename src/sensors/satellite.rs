// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! GNSS receiver readings

use std::fmt;
use std::ops::RangeInclusive;
use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// GNSS constellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Constellation {
    Gps,
    Glonass,
    Galileo,
    Beidou,
    Qzss,
    Sbas,
    Irnss,
    Unknown,
}

impl Constellation {
    /// Valid space vehicle ids for the constellation
    pub fn svid_range(&self) -> RangeInclusive<u16> {
        match self {
            Constellation::Gps => 1..=32,
            Constellation::Glonass => 1..=24,
            Constellation::Galileo => 1..=36,
            Constellation::Beidou => 1..=63,
            Constellation::Qzss => 193..=200,
            Constellation::Sbas => 120..=158,
            Constellation::Irnss => 1..=14,
            // Nothing is valid for an unidentified constellation
            Constellation::Unknown => 1..=0,
        }
    }
}

impl fmt::Display for Constellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Constellation::Gps => "GPS",
            Constellation::Glonass => "GLONASS",
            Constellation::Galileo => "Galileo",
            Constellation::Beidou => "BeiDou",
            Constellation::Qzss => "QZSS",
            Constellation::Sbas => "SBAS",
            Constellation::Irnss => "IRNSS",
            Constellation::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One tracked satellite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteObservation {
    pub constellation: Constellation,
    pub svid: u16,
    /// Carrier-to-noise density, dB-Hz
    pub cn0_dbhz: f64,
    pub elevation: f64,
    pub azimuth: f64,
    pub used_in_fix: bool,
    /// Engine-clock epoch ms
    pub timestamp: i64,
    pub location: Option<GeoPoint>,
}

impl SatelliteObservation {
    pub fn emitter_id(&self) -> String {
        format!("{}-{}", self.constellation, self.svid)
    }
}

/// Result of one GNSS status poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatelliteFix {
    pub satellites: Vec<SatelliteObservation>,
}

impl SatelliteFix {
    /// Strongest satellite contributing to the fix
    pub fn lead(&self) -> Option<&SatelliteObservation> {
        self.satellites
            .iter()
            .filter(|s| s.used_in_fix)
            .max_by(|a, b| a.cn0_dbhz.total_cmp(&b.cn0_dbhz))
    }
}
