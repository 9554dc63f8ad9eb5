//! Core error types for fleetman-core

use fleetman_exec::ExecError;
use thiserror::Error;

/// Errors raised by coordinator operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Device not found in storage
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Another batch is still running
    #[error("a batch is already active")]
    BatchActive,

    /// Request failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No usable install credentials for the device
    #[error("no install credentials (need address, user and key or password) for {0}")]
    MissingCredentials(String),

    /// No agent executable for the detected architecture
    #[error("no agent executable for architecture {arch} at {path}")]
    MissingArtifact {
        /// Detected architecture
        arch: String,
        /// Where it was looked up
        path: String,
    },

    /// Remote provisioning failed
    #[error("install failed: {0}")]
    Provision(#[from] ExecError),

    /// Device did not report back after install
    #[error("reconnect timeout")]
    ReconnectTimeout,

    /// Queuing a command failed
    #[error("failed to queue {kind}: {message}")]
    QueueFailed {
        /// Command type
        kind: String,
        /// Failure detail
        message: String,
    },

    /// Storage collaborator failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CoreError {
    /// Message recorded in the batch error map
    ///
    /// Network faults carry a hint so operators can tell them apart from
    /// software faults.
    #[must_use]
    pub fn operator_message(&self) -> String {
        match self {
            CoreError::Provision(e) => match e.hint() {
                Some(hint) => format!("{self} ({hint})"),
                None => self.to_string(),
            },
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_timeout_message() {
        assert_eq!(CoreError::ReconnectTimeout.operator_message(), "reconnect timeout");
    }

    #[test]
    fn test_network_install_failure_carries_hint() {
        let err = CoreError::Provision(
            ExecError::ConnectionFailed("refused".to_string()).in_step("connect"),
        );
        let msg = err.operator_message();
        assert!(msg.starts_with("install failed: connect: connection failed: refused"));
        assert!(msg.contains("restart the device"));
    }

    #[test]
    fn test_software_install_failure_has_no_hint() {
        let err = CoreError::Provision(ExecError::CommandFailed {
            status: 1,
            stderr: "unit not found".to_string(),
        });
        assert!(!err.operator_message().contains("restart the device"));
    }
}
