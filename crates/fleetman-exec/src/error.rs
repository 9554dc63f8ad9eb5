//! Error types for fleetman-exec

use std::time::Duration;

use thiserror::Error;

/// Hint shown to operators for transient network failures
pub const NETWORK_HINT: &str = "check the device's network connection or restart the device";

/// Errors that can occur during local or remote execution
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command execution failed
    #[error("command execution failed: {status} - {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// SSH key error
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),

    /// Connection not established
    #[error("not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// A requirement on the target was not met
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A provisioning step failed
    #[error("{step}: {source}")]
    Step {
        /// Step name
        step: &'static str,
        /// Underlying failure
        #[source]
        source: Box<ExecError>,
    },
}

impl ExecError {
    /// Wrap an error with the provisioning step it happened in
    #[must_use]
    pub fn in_step(self, step: &'static str) -> Self {
        ExecError::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_network()
    }

    /// Whether the failure is a network fault (dial, refused, timeout)
    #[must_use]
    pub fn is_network(&self) -> bool {
        match self {
            ExecError::ConnectionFailed(_) | ExecError::Timeout { .. } => true,
            ExecError::Step { source, .. } => source.is_network(),
            _ => false,
        }
    }

    /// User-facing hint for the failure, if there is one
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        self.is_network().then_some(NETWORK_HINT)
    }
}
