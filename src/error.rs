use miette::Diagnostic;
use std::io;
use thiserror::Error;

use crate::docker::DockerError;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("No free host port left in {start}-{end} while provisioning '{project}'")]
    #[diagnostic(
        code(berth::ports::exhausted),
        help("Free ports by tearing down projects you no longer use:\n\n    berth down <project>")
    )]
    AllocationExhausted {
        project: String,
        start: u16,
        end: u16,
    },

    #[error("{tool} is not available: {detail}")]
    #[diagnostic(code(berth::tool::unavailable), help("{hint}"))]
    ToolUnavailable {
        tool: String,
        detail: String,
        hint: String,
    },

    #[error("Permission denied writing {path}")]
    #[diagnostic(
        code(berth::resolver::permission),
        help("Run the privileged step manually, then re-run berth:\n\n    {remediation}")
    )]
    PermissionDenied { path: String, remediation: String },

    #[error("Timed out waiting for {what} ({attempts} attempts)")]
    #[diagnostic(
        code(berth::reconcile::timeout),
        help("Configuration already written stays in place; re-running `berth up` retries from there")
    )]
    ReconciliationTimeout { what: String, attempts: u32 },

    /// Graceful reload failed and the backend was (or must be) restarted.
    /// Non-fatal: callers log this as a warning and continue.
    #[error("{backend} reload failed: {detail}")]
    #[diagnostic(code(berth::backend::degraded))]
    BackendDegraded { backend: String, detail: String },

    #[error("Docker error: {0}")]
    #[diagnostic(
        code(berth::docker::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Docker(#[from] DockerError),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(berth::config::error),
        help("Validate your berth.yaml and re-run")
    )]
    Config(String),

    #[error("Project not found: {0}")]
    #[diagnostic(
        code(berth::project::not_found),
        help("Run `berth up` from a directory containing a berth.yaml, or pass `-c <path>`")
    )]
    ProjectNotFound(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::AllocationExhausted { start, end, .. } => Some(format!(
                "All host ports in {}-{} are assigned. Tear down unused projects with `berth down <project>` to release their ports.",
                start, end
            )),
            Error::ToolUnavailable { hint, .. } => Some(hint.clone()),
            Error::PermissionDenied { remediation, .. } => Some(format!(
                "This step needs elevated privileges. Run it manually:\n\n    {}",
                remediation
            )),
            Error::ReconciliationTimeout { what, .. } => Some(format!(
                "{} did not come up in time. Check `docker ps` and container logs, then re-run `berth up`.",
                what
            )),
            Error::Docker(_) => Some("Check that Docker is running: docker ps".to_string()),
            Error::Config(_) => Some("Check your berth.yaml for typos or missing fields".to_string()),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }

    /// Whether this error aborts the current operation or is only worth a warning.
    ///
    /// `BackendDegraded` is the one warning-level member of the taxonomy: the
    /// desired state is already on disk and the next successful reload picks
    /// it up.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::BackendDegraded { .. })
    }
}
