//! Error types for fleetman-agent

use fleetman_exec::ExecError;
use thiserror::Error;

/// Errors raised by device-side jobs and setup
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// Command type was empty at registration
    #[error("command type is empty")]
    EmptyKind,

    /// A handler is already registered for the type
    #[error("handler already registered for {0}")]
    DuplicateHandler(String),

    /// Payload passed decoding but is unusable
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Local command failed
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Scenario download failed
    #[error("download failed: {0}")]
    Download(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Job future panicked
    #[error("job panicked")]
    Panicked,
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Io(e.to_string())
    }
}
