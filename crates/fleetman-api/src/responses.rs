//! Response types for the coordinator API

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::batch::BatchPhase;
use crate::status::JobStatus;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Snapshot of the current (or last) batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchStatus {
    pub active: bool,
    pub total: usize,
    pub completed: usize,
    pub robots: HashMap<String, BatchPhase>,
    pub errors: HashMap<String, String>,
}

/// Returned when a batch was accepted (HTTP 202)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchAccepted {
    pub total: usize,
}

/// Returned when a single command was queued
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommandQueued {
    pub job_id: String,
}

/// Last heartbeat seen from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceLiveness {
    pub device_id: String,
    pub status: String,
    pub ip: String,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_error: Option<String>,
}

/// Storage view of a device plus its last heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceStatus {
    pub device_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ip: Option<String>,
    /// When the coordinator last heard a live heartbeat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<DeviceLiveness>,
}

/// Error body returned by the coordinator API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
