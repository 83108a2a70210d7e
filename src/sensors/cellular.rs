// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Cellular modem readings - serving and neighbour cells

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Radio access technology of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioTechnology {
    Gsm,
    Umts,
    Lte,
    Nr,
    Unknown,
}

impl RadioTechnology {
    /// Network generation (2, 3, 4, 5), 0 if unknown
    pub fn generation(&self) -> u8 {
        match self {
            RadioTechnology::Gsm => 2,
            RadioTechnology::Umts => 3,
            RadioTechnology::Lte => 4,
            RadioTechnology::Nr => 5,
            RadioTechnology::Unknown => 0,
        }
    }
}

/// One cell as reported by the modem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellObservation {
    pub cell_id: u64,
    /// LAC (2G/3G) or TAC (4G/5G)
    pub area_code: u32,
    pub mcc: u16,
    pub mnc: u16,
    pub technology: RadioTechnology,
    pub signal_dbm: i32,
    /// True for the serving cell, false for neighbours
    pub registered: bool,
    /// Engine-clock epoch ms
    pub timestamp: i64,
    pub location: Option<GeoPoint>,
}

impl CellObservation {
    /// Stable tower identity: `mcc-mnc-area-cell`
    pub fn emitter_id(&self) -> String {
        format!("{}-{}-{}-{}", self.mcc, self.mnc, self.area_code, self.cell_id)
    }
}

/// Result of one modem poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellScan {
    pub cells: Vec<CellObservation>,
    /// Device motion hint from the platform; selects the moving switch threshold
    pub moving: bool,
}

impl CellScan {
    pub fn serving(&self) -> Option<&CellObservation> {
        self.cells.iter().find(|c| c.registered)
    }
}
