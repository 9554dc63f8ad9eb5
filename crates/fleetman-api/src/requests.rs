//! Request types for the coordinator API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Repository settings forwarded to `update_repo` commands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RepoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Start a provisioning batch across devices
///
/// Each flag gates one phase; phases run in a fixed order per device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub robot_ids: Vec<String>,
    #[serde(default)]
    pub reinstall: bool,
    #[serde(default)]
    pub reset_logs: bool,
    #[serde(default)]
    pub update_repo: bool,
    #[serde(default)]
    pub run_self_test: bool,
    #[serde(default)]
    pub apply_scenarios: bool,
    #[serde(default)]
    pub scenario_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_config: Option<RepoConfig>,
}

/// Queue a single command for one device
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueCommandRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}
