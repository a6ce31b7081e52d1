use std::fmt;
use std::time::Duration;

use crate::runner::RunError;

/// Structured error type for container runtime operations.
///
/// Machine-actionable variants instead of stringly-typed failures, so callers
/// can distinguish "the daemon is gone" from "this one command failed".
#[derive(Debug)]
pub enum DockerError {
    /// Command timed out.
    Timeout { command: String, timeout: Duration },

    /// Command ran but returned non-zero exit.
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// Binary couldn't be executed (not in PATH, permission denied).
    ExecFailed {
        command: String,
        source: std::io::Error,
    },

    /// Container doesn't exist (parsed from "No such container" stderr).
    ContainerNotFound { container: String },

    /// Daemon not responding.
    DaemonUnavailable,
}

impl DockerError {
    /// Create a command-failed error from a finished run.
    pub fn failed(cmd: impl Into<String>, output: &crate::runner::RunOutput) -> Self {
        DockerError::CommandFailed {
            command: cmd.into(),
            stderr: output.stderr.trim().to_string(),
            exit_code: output.exit_code,
        }
    }
}

impl From<RunError> for DockerError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Timeout { command, timeout } => DockerError::Timeout { command, timeout },
            RunError::Spawn { command, source } => DockerError::ExecFailed {
                command,
                source,
            },
        }
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::Timeout { command, timeout } => {
                write!(
                    f,
                    "Timed out running '{}' (exceeded {} seconds)",
                    command,
                    timeout.as_secs()
                )
            }
            DockerError::CommandFailed {
                command,
                stderr,
                exit_code,
            } => {
                if let Some(code) = exit_code {
                    write!(f, "'{}' failed (exit code {}): {}", command, code, stderr)
                } else {
                    write!(f, "'{}' failed: {}", command, stderr)
                }
            }
            DockerError::ExecFailed { command, source } => {
                write!(f, "Failed to execute '{}': {}", command, source)
            }
            DockerError::ContainerNotFound { container } => {
                write!(f, "No such container: {}", container)
            }
            DockerError::DaemonUnavailable => {
                write!(f, "Docker daemon is not responding")
            }
        }
    }
}

impl std::error::Error for DockerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DockerError::ExecFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
