//! Status envelope published by devices (retained)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of a device-side job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl JobStatus {
    /// Whether the job has reached a final state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Heartbeat published to `fleet/status/<device-id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatusMessage {
    /// Device state; `ok` while the agent runs, `offline` in the last will
    pub status: String,
    pub ts: DateTime<Utc>,
    pub ip: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_error: Option<String>,
}

impl StatusMessage {
    pub const OK: &'static str = "ok";
    pub const OFFLINE: &'static str = "offline";
}
