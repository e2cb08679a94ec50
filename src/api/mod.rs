//! REST API over the results of a finished run.
//!
//! Read-only endpoints:
//! - `/devices`: latest snapshot of every device
//! - `/devices/{name}`: latest snapshot of one device
//! - `/telemetry`: snapshot history, filterable by device and sample range
//! - `/report`: run report

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::devices::DeviceSnapshot;
use crate::nilm::RunReport;
use crate::runner::RunOutcome;

pub use types::{ErrorResponse, TelemetryQuery, TelemetryRecord};

/// Immutable application state shared across all request handlers.
///
/// Built once after the run completes and wrapped in `Arc`; no locks
/// needed since all data is read-only.
pub struct AppState {
    /// Final snapshot per device, in catalog order.
    pub latest: Vec<DeviceSnapshot>,
    /// Every snapshot, tagged with the index of the sample that produced it.
    pub history: Vec<TelemetryRecord>,
    /// Aggregate run report.
    pub report: RunReport,
}

impl From<RunOutcome> for AppState {
    fn from(outcome: RunOutcome) -> Self {
        // each processed sample publishes one snapshot per device
        let per_sample = outcome.latest.len().max(1);
        let history = outcome
            .history
            .into_iter()
            .enumerate()
            .map(|(i, snapshot)| TelemetryRecord {
                sample: i / per_sample,
                snapshot,
            })
            .collect();
        Self {
            latest: outcome.latest,
            history,
            report: outcome.report,
        }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/devices", get(handlers::list_devices))
        .route("/devices/{name}", get(handlers::get_device))
        .route("/telemetry", get(handlers::get_telemetry))
        .route("/report", get(handlers::get_report))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
