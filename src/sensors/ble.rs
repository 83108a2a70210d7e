// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Bluetooth LE scanner readings

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// One received advertisement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BleAdvertisement {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i32,
    /// Bluetooth SIG company identifier
    pub manufacturer_id: Option<u16>,
    /// Manufacturer specific data, company id stripped
    #[serde(default)]
    pub manufacturer_data: Vec<u8>,
    /// 16-bit service UUIDs
    #[serde(default)]
    pub service_uuids: Vec<u16>,
    /// Engine-clock epoch ms
    pub timestamp: i64,
    pub location: Option<GeoPoint>,
}

/// Result of one BLE scan window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BleScan {
    pub advertisements: Vec<BleAdvertisement>,
}
