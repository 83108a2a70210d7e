// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! RF sensors - sub-GHz / SDR spectrum sweeps

use serde::{Deserialize, Serialize};

/// Power measured on one frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfSample {
    pub frequency_hz: u64,
    pub rssi: i32,
    /// A valid packet was decoded on this frequency
    pub decoded: bool,
    /// Engine-clock epoch ms
    pub timestamp: i64,
}

impl RfSample {
    pub fn emitter_id(&self) -> String {
        format!("{}Hz", self.frequency_hz)
    }
}

/// One sweep over the configured band
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RfSweep {
    pub samples: Vec<RfSample>,
}
