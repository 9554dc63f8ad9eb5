//! Local command execution using `tokio::process`
//!
//! Device command handlers run their scripts through this executor. A timed
//! out command is killed: the child is spawned with `kill_on_drop` and the
//! timeout drops the pending wait.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::CommandResult;
use crate::traits::RemoteExecutor;

/// Runs `sh -c <cmd>` on this machine
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    workdir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl LocalExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every command from `dir`
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Add an environment variable to every command
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, cmd: &str, piped_stdin: bool) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if piped_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
    }

    #[instrument(skip(self, stdin), level = "debug")]
    async fn execute(&self, cmd: &str, stdin: Option<&[u8]>) -> Result<CommandResult, ExecError> {
        let started = Instant::now();
        let mut child = self
            .command(cmd, stdin.is_some())
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let result = CommandResult {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        };

        if result.success() {
            debug!(status = result.status, duration = ?result.duration, "command finished");
        } else {
            warn!(status = result.status, stderr = %result.stderr.trim(), "command exited non-zero");
        }
        Ok(result)
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute(cmd, None).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        tokio::time::timeout(timeout, self.execute(cmd, None))
            .await
            .unwrap_or_else(|_| {
                warn!(command = %cmd, ?timeout, "command timed out, killed");
                Err(ExecError::Timeout { timeout })
            })
    }

    async fn run_with_stdin(&self, cmd: &str, stdin: &[u8]) -> Result<CommandResult, ExecError> {
        self.execute(cmd, Some(stdin)).await
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_status_and_output() {
        let executor = LocalExecutor::new();

        let ok = executor.run("echo hello").await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = executor.run("echo oops >&2; exit 42").await.unwrap();
        assert_eq!(failed.status, 42);
        assert_eq!(failed.stderr.trim(), "oops");
        assert!(failed.into_checked().is_err());
    }

    #[tokio::test]
    async fn test_timeout() {
        let result = LocalExecutor::new()
            .run_with_timeout("sleep 5", Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(ExecError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_stdin_is_piped() {
        let result = LocalExecutor::new()
            .run_with_stdin("cat", b"piped")
            .await
            .unwrap();
        assert_eq!(result.stdout, "piped");
    }

    #[tokio::test]
    async fn test_workdir_and_env() {
        let dir = std::env::temp_dir();
        let executor = LocalExecutor::new()
            .in_dir(&dir)
            .with_env("FLEETMAN_DEVICE_ID", "r1");

        let result = executor.run("pwd; echo $FLEETMAN_DEVICE_ID").await.unwrap();
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(
            std::fs::canonicalize(lines[0]).unwrap(),
            std::fs::canonicalize(&dir).unwrap()
        );
        assert_eq!(lines[1], "r1");
    }
}
