//! State, snapshot, and persistence types for tracked devices.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// ON/OFF state of a tracked appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    #[default]
    Off,
    On,
}

impl DeviceState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("OFF"),
            Self::On => f.write_str("ON"),
        }
    }
}

/// Per-device state published once per processed sample.
///
/// Field names are the public output contract shared by the CSV export and
/// the REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Device name from the signature catalog.
    pub device_name: String,
    /// Whether the device is currently ON.
    pub is_on: bool,
    /// Smoothed power over the recent attribution window (W).
    pub current_power_watts: f64,
    /// Total time spent ON (s).
    pub cumulative_runtime_seconds: f64,
    /// Energy consumed since the last local midnight (kWh).
    pub daily_energy_kwh: f64,
    /// Confidence of the latest attribution, 0–100 with one decimal.
    pub confidence_percent: f64,
    /// Timestamp of the update that produced this snapshot.
    pub last_update: DateTime<FixedOffset>,
}

impl DeviceSnapshot {
    pub fn state(&self) -> DeviceState {
        if self.is_on {
            DeviceState::On
        } else {
            DeviceState::Off
        }
    }
}

/// Converts a `[0, 1]` confidence to a percentage rounded to one decimal.
pub fn confidence_percent(confidence: f64) -> f64 {
    (confidence.clamp(0.0, 1.0) * 1000.0).round() / 10.0
}

/// Minimal durable per-device record for warm restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    pub cumulative_runtime_seconds: f64,
    pub daily_energy_kwh: f64,
    /// Local date `daily_energy_kwh` belongs to.
    pub last_reset_date: Option<NaiveDate>,
}
