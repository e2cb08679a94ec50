//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::devices::DeviceSnapshot;

/// One historical snapshot with the index of the sample that produced it.
///
/// Snapshot fields are flattened so records share the CSV export's names.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    /// Zero-based index of the processed sample.
    pub sample: usize,
    #[serde(flatten)]
    pub snapshot: DeviceSnapshot,
}

/// Optional filters for the telemetry endpoint.
#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    /// Only this device.
    pub device: Option<String>,
    /// First sample index (inclusive).
    pub from: Option<usize>,
    /// Last sample index (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
