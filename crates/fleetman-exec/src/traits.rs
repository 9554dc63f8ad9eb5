//! Execution and provisioning traits

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::host::HostSpec;
use crate::result::CommandResult;

/// Runs shell commands on some machine (local or over SSH)
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command and collect its output
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command, failing with `ExecError::Timeout` after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Run a command with `stdin` written to its input stream, then EOF
    async fn run_with_stdin(&self, cmd: &str, stdin: &[u8]) -> Result<CommandResult, ExecError>;

    /// Release the underlying connection, if any
    async fn close(&self) -> Result<(), ExecError> {
        Ok(())
    }

    fn executor_type(&self) -> &'static str;
}

/// Opens executor sessions to provisioning targets
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Dial and authenticate against `spec`
    async fn connect(&self, spec: &HostSpec) -> Result<Box<dyn RemoteExecutor>, ExecError>;
}

/// Installs the device agent on a target
#[async_trait]
pub trait Provision: Send + Sync {
    /// Detect the target's CPU architecture (`amd64`, `arm64`, ...)
    async fn detect_architecture(&self, spec: &HostSpec) -> Result<String, ExecError>;

    /// Upload the executable, its configuration and service unit, then
    /// (re)start the service
    async fn install(
        &self,
        spec: &HostSpec,
        device_config: &str,
        executable: &[u8],
    ) -> Result<(), ExecError>;
}
