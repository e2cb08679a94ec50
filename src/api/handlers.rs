//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, TelemetryQuery, TelemetryRecord};
use crate::devices::DeviceSnapshot;
use crate::nilm::RunReport;

fn error(status: StatusCode, message: String) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message }))
}

/// `GET /devices` → 200 + latest snapshot per device
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceSnapshot>> {
    Json(state.latest.clone())
}

/// `GET /devices/{name}` → 200 + snapshot, or 404 for an unknown device
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    state
        .latest
        .iter()
        .find(|s| s.device_name == name)
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("unknown device \"{name}\"")))
}

/// Returns snapshot history, optionally filtered.
///
/// `GET /telemetry` → every record
/// `GET /telemetry?device=tv&from=N&to=M` → one device, samples N..=M
/// `GET /telemetry?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err(error(
            StatusCode::BAD_REQUEST,
            format!("`from` ({from}) must be <= `to` ({to})"),
        ));
    }
    if let Some(ref device) = query.device {
        if !state.latest.iter().any(|s| &s.device_name == device) {
            return Err(error(
                StatusCode::NOT_FOUND,
                format!("unknown device \"{device}\""),
            ));
        }
    }

    let records: Vec<TelemetryRecord> = state
        .history
        .iter()
        .filter(|r| r.sample >= from && r.sample <= to)
        .filter(|r| {
            query
                .device
                .as_ref()
                .is_none_or(|d| &r.snapshot.device_name == d)
        })
        .cloned()
        .collect();

    Ok(Json(records))
}

/// `GET /report` → 200 + `RunReport`
pub async fn get_report(State(state): State<Arc<AppState>>) -> Json<RunReport> {
    Json(state.report.clone())
}
