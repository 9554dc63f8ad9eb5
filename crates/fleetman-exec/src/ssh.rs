//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExecError;
use crate::host::HostSpec;
use crate::keys::KeySource;
use crate::result::CommandResult;
use crate::traits::{RemoteExecutor, SessionConnector};

/// Dial timeout for new SSH sessions
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Freshly imaged devices have unknown host keys; accept them
        // (equivalent to StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// SSH command executor
///
/// Holds one authenticated session to a provisioning target. Each command
/// opens its own channel on that session.
pub struct SshExecutor {
    spec: HostSpec,
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Dial and authenticate against `spec`
    ///
    /// Tries public key authentication first when a key is present, then
    /// falls back to the password.
    ///
    /// # Errors
    /// Returns `ExecError::ConnectionFailed` or `ExecError::Timeout` if the
    /// host cannot be reached and `ExecError::AuthenticationFailed` if no
    /// credential is accepted
    #[instrument(skip(spec), fields(host = %spec.address, user = %spec.user))]
    pub async fn connect(spec: HostSpec) -> Result<Self, ExecError> {
        spec.validate()?;

        info!(
            host = %spec.address,
            port = spec.port,
            user = %spec.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let dial = client::connect(config, (&spec.address[..], spec.port), SshClientHandler);
        let mut session = match timeout(CONNECT_TIMEOUT, dial).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(ExecError::ConnectionFailed(e.to_string())),
            Err(_) => {
                return Err(ExecError::Timeout {
                    timeout: CONNECT_TIMEOUT,
                });
            }
        };

        let mut authenticated = false;

        if let Some(material) = spec.private_key.as_deref().filter(|k| !k.is_empty()) {
            match KeySource::from_material(material).resolve() {
                Ok(key_pair) => {
                    let hash_alg = session
                        .best_supported_rsa_hash()
                        .await
                        .ok()
                        .flatten()
                        .flatten();
                    let auth_res = session
                        .authenticate_publickey(
                            &spec.user,
                            PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                        )
                        .await
                        .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;
                    authenticated = auth_res.success();
                    if !authenticated {
                        debug!(host = %spec.address, "public key rejected");
                    }
                }
                Err(e) => warn!(host = %spec.address, error = %e, "unusable private key"),
            }
        }

        if !authenticated && let Some(password) = spec.password.as_deref() {
            let auth_res = session
                .authenticate_password(&spec.user, password)
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;
            authenticated = auth_res.success();
        }

        if !authenticated {
            return Err(ExecError::AuthenticationFailed(format!(
                "no credential accepted for {}@{}",
                spec.user, spec.address
            )));
        }

        info!(host = %spec.address, "SSH connected and authenticated");

        Ok(Self {
            spec,
            session: Mutex::new(Some(session)),
        })
    }

    /// Target this executor is connected to
    #[must_use]
    pub fn host_spec(&self) -> &HostSpec {
        &self.spec
    }

    #[instrument(skip(self, cmd, stdin), fields(host = %self.spec.address))]
    async fn execute_remote(
        &self,
        cmd: &str,
        stdin: Option<&[u8]>,
    ) -> Result<CommandResult, ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
        }
        channel
            .eof()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // exit-status may arrive after EOF, so read until the channel closes
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = exit_status.cast_signed();
                }
                Some(ChannelMsg::Close) | None => break,
                _ => {}
            }
        }

        let duration = start.elapsed();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            duration,
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute_remote(cmd, None).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        match timeout(timeout_duration, self.execute_remote(cmd, None)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    async fn run_with_stdin(&self, cmd: &str, stdin: &[u8]) -> Result<CommandResult, ExecError> {
        self.execute_remote(cmd, Some(stdin)).await
    }

    async fn close(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.spec.address, "SSH disconnected");
        }
        Ok(())
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

/// Connector producing authenticated `SshExecutor` sessions
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self, spec: &HostSpec) -> Result<Box<dyn RemoteExecutor>, ExecError> {
        let executor = SshExecutor::connect(spec.clone()).await?;
        Ok(Box::new(executor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_spec_without_credentials() {
        let err = SshExecutor::connect(HostSpec::new("127.0.0.1", "robot"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::ConfigError(_)));
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_roundtrip() {
        let spec = HostSpec::new("127.0.0.1", "robot").with_password("robot");
        let executor = SshExecutor::connect(spec).await.unwrap();
        let result = executor.run_with_stdin("cat", b"hi").await.unwrap();
        assert_eq!(result.stdout, "hi");
        executor.close().await.unwrap();
    }
}
