//! Provisioning batch endpoints

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use fleetman_api::requests::BatchRequest;
use fleetman_api::responses::{BatchAccepted, BatchStatus, ErrorBody};
use tracing::info;

use crate::api::error::AppError;
use crate::state::AppState;

/// Start a batch across the selected devices
///
/// Returns once the batch is accepted; progress is polled through
/// `GET /api/batch/status`.
///
/// # Errors
/// Returns 400 for an invalid selection and 409 while another batch runs
#[utoipa::path(
    post,
    path = "/api/batch",
    tag = "batch",
    request_body = BatchRequest,
    responses(
        (status = 202, body = BatchAccepted),
        (status = 400, body = ErrorBody),
        (status = 409, body = ErrorBody)
    )
)]
pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchAccepted>), AppError> {
    let handle = state.orchestrator.start(req)?;
    info!(total = handle.total(), "batch accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchAccepted {
            total: handle.total(),
        }),
    ))
}

/// Snapshot of the current or last batch
#[utoipa::path(
    get,
    path = "/api/batch/status",
    tag = "batch",
    responses((status = 200, body = BatchStatus))
)]
pub async fn batch_status(State(state): State<Arc<AppState>>) -> Json<BatchStatus> {
    Json(state.orchestrator.coordinator().status())
}
