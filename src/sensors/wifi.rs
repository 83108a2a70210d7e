// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Wi-Fi scanner readings - beacons plus monitor-mode management frames

use serde::{Deserialize, Serialize};

use super::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WifiSecurity {
    Open,
    Wep,
    Wpa,
    Wpa2,
    Wpa3,
    Unknown,
}

/// Access point beacon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiBeacon {
    pub bssid: String,
    /// Empty for hidden networks
    pub ssid: String,
    pub rssi: i32,
    pub channel: u8,
    pub security: WifiSecurity,
    /// Engine-clock epoch ms
    pub timestamp: i64,
    pub location: Option<GeoPoint>,
}

impl WifiBeacon {
    pub fn is_hidden(&self) -> bool {
        self.ssid.is_empty()
    }
}

/// Deauthentication / disassociation frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeauthFrame {
    pub source: String,
    pub target: String,
    /// Engine-clock epoch ms
    pub timestamp: i64,
}

/// Probe response sent by an access point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub bssid: String,
    pub ssid: String,
    /// Engine-clock epoch ms
    pub timestamp: i64,
}

/// Result of one Wi-Fi scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WifiScan {
    pub beacons: Vec<WifiBeacon>,
    #[serde(default)]
    pub deauth_frames: Vec<DeauthFrame>,
    #[serde(default)]
    pub probe_responses: Vec<ProbeResponse>,
}
