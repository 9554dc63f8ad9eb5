//! HTTP router configuration

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api::{batch, devices, scenarios, system};
use crate::state::AppState;

/// OpenAPI document for the coordinator API
#[derive(OpenApi)]
#[openapi(
    info(title = "fleetman", description = "Fleet provisioning and command coordinator"),
    paths(
        system::health,
        batch::start_batch,
        batch::batch_status,
        devices::queue_command,
        devices::broadcast_command,
        devices::device_status,
        devices::fleet_status,
        scenarios::get_scenario,
    ),
    components(schemas(
        fleetman_api::requests::BatchRequest,
        fleetman_api::requests::RepoConfig,
        fleetman_api::requests::QueueCommandRequest,
        fleetman_api::responses::BatchAccepted,
        fleetman_api::responses::BatchStatus,
        fleetman_api::responses::CommandQueued,
        fleetman_api::responses::DeviceLiveness,
        fleetman_api::responses::DeviceStatus,
        fleetman_api::responses::ErrorBody,
        fleetman_api::responses::HealthResponse,
        fleetman_api::BatchPhase,
        fleetman_api::JobStatus,
    )),
    tags(
        (name = "batch", description = "Provisioning batches"),
        (name = "devices", description = "Device commands and liveness"),
        (name = "scenarios", description = "Scenario documents for devices"),
        (name = "system", description = "Daemon health")
    )
)]
pub struct ApiDoc;

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        .route("/api/openapi.json", get(openapi))
        // Batch endpoints
        .route("/api/batch", post(batch::start_batch))
        .route("/api/batch/status", get(batch::batch_status))
        // Device endpoints
        .route("/api/devices/status", get(devices::fleet_status))
        .route("/api/devices/{id}/status", get(devices::device_status))
        .route("/api/devices/{id}/commands", post(devices::queue_command))
        .route("/api/commands/broadcast", post(devices::broadcast_command))
        // Scenario documents
        .route("/api/scenarios/{id}", get(scenarios::get_scenario))
        // State
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
}
