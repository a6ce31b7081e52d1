//! Centralized Docker CLI client.
//!
//! All container runtime interactions go through `DockerClient`, which routes
//! every invocation through the injected [`ProcessRunner`], applies consistent
//! timeouts, and maps failures to [`DockerError`]. Reconcilers never spawn
//! `docker` themselves.

use super::DockerError;
use crate::runner::{ProcessRunner, RunOutput};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for quick queries (inspect, ps).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for lifecycle operations (run, stop, rm).
pub const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Where a named container currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    /// Created or exited, but present.
    Stopped,
    Absent,
}

/// Client for Docker CLI operations, generic over the process runner.
#[derive(Clone)]
pub struct DockerClient {
    runner: Arc<dyn ProcessRunner>,
}

impl DockerClient {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Run a docker command, returning raw output.
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<RunOutput, DockerError> {
        Ok(self.runner.run("docker", args, timeout).await?)
    }

    /// Run a docker command, returning output only if it exited zero.
    async fn run_success(&self, args: &[&str], timeout: Duration) -> Result<RunOutput, DockerError> {
        let output = self.run(args, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            let cmd_str = format!("docker {}", args.join(" "));
            Err(DockerError::failed(cmd_str, &output))
        }
    }

    // ========================================================================
    // Daemon health
    // ========================================================================

    /// Check if the Docker daemon is healthy and responsive.
    pub async fn daemon_healthy(&self, timeout: Duration) -> bool {
        match self
            .run(&["info", "--format", "{{.ServerVersion}}"], timeout)
            .await
        {
            Ok(o) => o.success(),
            Err(_) => false,
        }
    }

    /// Get the Docker version string, or an error if the binary is missing.
    pub async fn version(&self) -> Result<String, DockerError> {
        let output = self.run_success(&["--version"], QUERY_TIMEOUT).await?;
        Ok(output.stdout.trim().to_string())
    }

    // ========================================================================
    // Networks
    // ========================================================================

    pub async fn network_exists(&self, name: &str) -> Result<bool, DockerError> {
        let output = self
            .run(&["network", "inspect", name], QUERY_TIMEOUT)
            .await?;
        Ok(output.success())
    }

    /// Create a bridge network if it does not already exist. Idempotent.
    pub async fn ensure_network(&self, name: &str, subnet: Option<&str>) -> Result<(), DockerError> {
        if self.network_exists(name).await? {
            return Ok(());
        }
        let mut args = vec!["network", "create"];
        if let Some(subnet) = subnet {
            args.push("--subnet");
            args.push(subnet);
        }
        args.push(name);

        let output = self.run(&args, LIFECYCLE_TIMEOUT).await?;
        if output.success() || output.stderr.contains("already exists") {
            Ok(())
        } else {
            Err(DockerError::failed(
                format!("docker {}", args.join(" ")),
                &output,
            ))
        }
    }

    // ========================================================================
    // Container lifecycle
    // ========================================================================

    pub async fn container_state(&self, name: &str) -> Result<ContainerState, DockerError> {
        let output = self
            .run(&["inspect", "-f", "{{.State.Running}}", name], QUERY_TIMEOUT)
            .await?;
        if !output.success() {
            return Ok(ContainerState::Absent);
        }
        if output.stdout.trim() == "true" {
            Ok(ContainerState::Running)
        } else {
            Ok(ContainerState::Stopped)
        }
    }

    pub async fn is_running(&self, name: &str) -> bool {
        matches!(
            self.container_state(name).await,
            Ok(ContainerState::Running)
        )
    }

    /// `docker run -d` with fully caller-assembled arguments after `run`.
    pub async fn run_detached(&self, args: &[String]) -> Result<(), DockerError> {
        let mut full: Vec<&str> = vec!["run", "-d"];
        full.extend(args.iter().map(String::as_str));
        self.run_success(&full, LIFECYCLE_TIMEOUT).await?;
        Ok(())
    }

    pub async fn start(&self, container: &str) -> Result<(), DockerError> {
        self.run_success(&["start", container], LIFECYCLE_TIMEOUT)
            .await?;
        Ok(())
    }

    pub async fn stop(&self, container: &str) -> Result<(), DockerError> {
        let output = self.run(&["stop", container], LIFECYCLE_TIMEOUT).await?;
        if output.success() || output.stderr.contains("No such container") {
            Ok(())
        } else {
            Err(DockerError::failed("docker stop", &output))
        }
    }

    /// Force-remove a container. `Ok(())` if it doesn't exist.
    pub async fn rm_force(&self, container: &str) -> Result<(), DockerError> {
        let output = self.run(&["rm", "-f", container], LIFECYCLE_TIMEOUT).await?;
        if output.success() || output.stderr.contains("No such container") {
            Ok(())
        } else {
            Err(DockerError::failed("docker rm -f", &output))
        }
    }

    // ========================================================================
    // Exec / inspection
    // ========================================================================

    /// Run a command inside a running container.
    pub async fn exec(&self, container: &str, cmd: &[&str]) -> Result<RunOutput, DockerError> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(cmd);
        self.run(&args, LIFECYCLE_TIMEOUT).await
    }

    // ========================================================================
    // Compose
    // ========================================================================

    /// Structured per-service compose state as raw JSON text.
    ///
    /// Compose v2 emits one JSON object per line; older v2 builds emit a
    /// single array. The caller parses either shape. Falls back to the v1
    /// `docker-compose` binary when the `compose` subcommand is missing.
    pub async fn compose_ps_json(&self, project: &str) -> Result<String, DockerError> {
        let v2 = self
            .run(
                &["compose", "-p", project, "ps", "-a", "--format", "json"],
                QUERY_TIMEOUT,
            )
            .await?;
        if v2.success() {
            return Ok(v2.stdout);
        }
        // "docker: 'compose' is not a docker command" means v1-only hosts.
        if !v2.stderr.contains("is not a docker command") {
            return Err(DockerError::failed(
                format!("docker compose -p {} ps", project),
                &v2,
            ));
        }

        let v1 = self
            .runner
            .run(
                "docker-compose",
                &["-p", project, "ps", "-a", "--format", "json"],
                QUERY_TIMEOUT,
            )
            .await
            .map_err(DockerError::from)?;
        if v1.success() {
            Ok(v1.stdout)
        } else {
            Err(DockerError::failed(
                format!("docker-compose -p {} ps", project),
                &v1,
            ))
        }
    }
}
