//! Command envelope sent from the coordinator to devices

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors decoding a wire message
#[derive(Error, Debug)]
pub enum WireError {
    /// Payload is not valid JSON for the expected shape
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Command carries no type
    #[error("command has an empty type")]
    MissingType,

    /// Command carries no id
    #[error("command has an empty id")]
    MissingId,
}

/// Command envelope: `{ "id", "type", "data" }`
///
/// `data` is opaque here; its shape depends on `type` and is decoded by the
/// device-side handler registered for that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Command {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

impl Command {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data,
        }
    }

    /// Decode and validate a command from raw broker bytes
    ///
    /// # Errors
    /// Returns `WireError` if the bytes are not a command or id/type are empty
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let cmd: Command = serde_json::from_slice(bytes)?;
        if cmd.kind.trim().is_empty() {
            return Err(WireError::MissingType);
        }
        if cmd.id.trim().is_empty() {
            return Err(WireError::MissingId);
        }
        Ok(cmd)
    }

    /// Encode to JSON bytes for publishing
    ///
    /// # Errors
    /// Returns `WireError::Malformed` if serialization fails
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Command types understood by the stock agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ResetLogs,
    UpdateRepo,
    ApplyScenario,
    SelfTest,
    Identify,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::ResetLogs,
        CommandKind::UpdateRepo,
        CommandKind::ApplyScenario,
        CommandKind::SelfTest,
        CommandKind::Identify,
    ];

    /// Wire name used in the `type` field
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::ResetLogs => "reset_logs",
            CommandKind::UpdateRepo => "update_repo",
            CommandKind::ApplyScenario => "apply_scenario",
            CommandKind::SelfTest => "self_test",
            CommandKind::Identify => "identify",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload for commands that carry no data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmptyPayload {}

/// Payload for `update_repo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UpdateRepoPayload {
    /// Remote to fetch from (defaults to the working copy's `origin`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// Branch to check out and fast-forward
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Working copy path on the device (defaults to the agent's `repo_dir`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Payload for `apply_scenario`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApplyScenarioPayload {
    pub scenario_id: String,
    /// Absolute URL to download the scenario from; built from the agent's
    /// `coordinator_url` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Payload for `identify`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IdentifyPayload {
    #[serde(default = "default_identify_secs")]
    pub duration_secs: u64,
}

fn default_identify_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_wire_shape() {
        let raw = br#"{"id":"42","type":"update_repo","data":{"branch":"main"}}"#;
        let cmd = Command::decode(raw).unwrap();

        assert_eq!(cmd.id, "42");
        assert_eq!(cmd.kind, "update_repo");
        assert_eq!(cmd.data, json!({"branch": "main"}));
    }

    #[test]
    fn test_decode_missing_data_defaults_to_null() {
        let cmd = Command::decode(br#"{"id":"1","type":"self_test"}"#).unwrap();
        assert!(cmd.data.is_null());
    }

    #[test]
    fn test_decode_rejects_empty_type() {
        let err = Command::decode(br#"{"id":"1","type":" ","data":{}}"#).unwrap_err();
        assert!(matches!(err, WireError::MissingType));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Command::decode(b"not json").unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }

    #[test]
    fn test_encode_uses_type_field() {
        let cmd = Command::new("7", CommandKind::SelfTest.as_str(), json!({}));
        let value: serde_json::Value = serde_json::from_slice(&cmd.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "self_test");
        assert!(value.get("kind").is_none());
    }
}
