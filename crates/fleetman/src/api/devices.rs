//! Device command and status endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use fleetman_api::requests::QueueCommandRequest;
use fleetman_api::responses::{CommandQueued, DeviceLiveness, DeviceStatus, ErrorBody};
use fleetman_core::{CommandQueue, CoreError};

use crate::api::error::AppError;
use crate::state::AppState;

/// Queue one command for a device
///
/// # Errors
/// Returns 404 for an unknown device, 400 for an empty type and 502 if the
/// broker refused the publish
#[utoipa::path(
    post,
    path = "/api/devices/{id}/commands",
    tag = "devices",
    params(("id" = String, Path, description = "Device id")),
    request_body = QueueCommandRequest,
    responses(
        (status = 202, body = CommandQueued),
        (status = 400, body = ErrorBody),
        (status = 404, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn queue_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<QueueCommandRequest>,
) -> Result<(StatusCode, Json<CommandQueued>), AppError> {
    let job_id = state
        .dispatcher
        .queue_command(&id, &req.kind, req.data)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(CommandQueued { job_id })))
}

/// Publish one command to every device
///
/// # Errors
/// Returns 400 for an empty type and 502 if the broker refused the publish
#[utoipa::path(
    post,
    path = "/api/commands/broadcast",
    tag = "devices",
    request_body = QueueCommandRequest,
    responses(
        (status = 202, body = CommandQueued),
        (status = 400, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn broadcast_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueueCommandRequest>,
) -> Result<(StatusCode, Json<CommandQueued>), AppError> {
    if req.kind.trim().is_empty() {
        return Err(CoreError::InvalidRequest("command type is empty".to_string()).into());
    }
    let job_id = state.dispatcher.broadcast(&req.kind, req.data).await?;
    Ok((StatusCode::ACCEPTED, Json(CommandQueued { job_id })))
}

/// Stored record and last heartbeat of one device
///
/// # Errors
/// Returns 404 for an unknown device
#[utoipa::path(
    get,
    path = "/api/devices/{id}/status",
    tag = "devices",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, body = DeviceStatus),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceStatus>, AppError> {
    let device = state
        .store
        .get_device(&id)
        .await?
        .ok_or(CoreError::DeviceNotFound(id))?;

    let heartbeat = state.liveness.get(&device.id);
    Ok(Json(DeviceStatus {
        device_id: device.id,
        name: device.name,
        device_type: device.device_type,
        last_ip: device.last_ip,
        last_seen: device.last_seen,
        heartbeat,
    }))
}

/// Last heartbeat of every device heard from
#[utoipa::path(
    get,
    path = "/api/devices/status",
    tag = "devices",
    responses((status = 200, body = [DeviceLiveness]))
)]
pub async fn fleet_status(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceLiveness>> {
    Json(state.liveness.snapshot())
}
