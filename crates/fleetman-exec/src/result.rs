//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Turn a non-zero exit status into `ExecError::CommandFailed`
    ///
    /// # Errors
    /// Returns `ExecError::CommandFailed` when the status is non-zero
    pub fn into_checked(self) -> Result<Self, ExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::CommandFailed {
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: i32, stderr: &str) -> CommandResult {
        CommandResult {
            status,
            stdout: "out".to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_into_checked() {
        assert!(result(0, "").into_checked().is_ok());

        let err = result(3, "nope\n").into_checked().unwrap_err();
        assert!(matches!(err, ExecError::CommandFailed { status: 3, ref stderr } if stderr == "nope"));
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(result(0, "").combined_output(), "out");
        assert_eq!(result(0, "warn").combined_output(), "out\nwarn");
    }
}
