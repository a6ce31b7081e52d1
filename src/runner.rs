//! Subprocess execution behind a narrow capability trait.
//!
//! Every external tool this crate touches (docker, dnsmasq service managers,
//! sudo, resolver cache flushes) is invoked through [`ProcessRunner`], which
//! keeps the reconcilers testable: unit tests swap in a [`ScriptedRunner`]
//! that records invocations and returns canned output instead of requiring a
//! live container runtime.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convenience constructor for a zero-exit result.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Convenience constructor for a failed result.
    pub fn err(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
        }
    }
}

/// The process could not be run at all (as opposed to running and failing).
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Timed out running '{command}' (exceeded {} seconds)", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Narrow capability interface for shelling out.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to share
/// across tasks.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<RunOutput, RunError>;
}

/// Production runner: spawns real subprocesses with a hard timeout.
#[derive(Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<RunOutput, RunError> {
        let command_line = render_command(program, args);

        let result = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(program).args(args).output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(RunOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code(),
            }),
            Ok(Err(e)) => Err(RunError::Spawn {
                command: command_line,
                source: e,
            }),
            Err(_) => Err(RunError::Timeout {
                command: command_line,
                timeout,
            }),
        }
    }
}

fn render_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Test fake: replies from a script of `(pattern, output)` rules and records
/// every invocation.
///
/// The first rule whose pattern is a substring of the full command line wins;
/// unmatched commands succeed with empty output, so tests only script the
/// calls they care about. One-shot rules let a fake "change state" between
/// calls (stopped once, then running).
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<ScriptRule>>,
    invocations: Mutex<Vec<String>>,
}

struct ScriptRule {
    pattern: String,
    output: RunOutput,
    once: bool,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule: commands containing `pattern` reply with `output`.
    pub fn on(&self, pattern: &str, output: RunOutput) {
        self.rules.lock().push(ScriptRule {
            pattern: pattern.to_string(),
            output,
            once: false,
        });
    }

    /// Like [`on`](Self::on), but the rule is consumed by its first match.
    pub fn on_once(&self, pattern: &str, output: RunOutput) {
        self.rules.lock().push(ScriptRule {
            pattern: pattern.to_string(),
            output,
            once: true,
        });
    }

    /// Shorthand: commands containing `pattern` fail with exit code 1.
    pub fn fail(&self, pattern: &str, stderr: &str) {
        self.on(pattern, RunOutput::err(1, stderr));
    }

    /// Every command line run so far, in order.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    /// Whether any recorded command line contains `pattern`.
    pub fn saw(&self, pattern: &str) -> bool {
        self.invocations.lock().iter().any(|c| c.contains(pattern))
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<RunOutput, RunError> {
        let command_line = render_command(program, args);
        self.invocations.lock().push(command_line.clone());

        let mut rules = self.rules.lock();
        if let Some(index) = rules
            .iter()
            .position(|r| command_line.contains(r.pattern.as_str()))
        {
            let output = rules[index].output.clone();
            if rules[index].once {
                rules.remove(index);
            }
            return Ok(output);
        }
        Ok(RunOutput::ok(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_runner_matches_first_rule() {
        let runner = ScriptedRunner::new();
        runner.on("inspect", RunOutput::ok("true"));
        runner.fail("rm -f", "No such container");

        let out = runner
            .run("docker", &["inspect", "web"], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out.stdout, "true");

        let out = runner
            .run("docker", &["rm", "-f", "web"], Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!out.success());

        assert!(runner.saw("inspect web"));
        assert_eq!(runner.invocations().len(), 2);
    }

    #[tokio::test]
    async fn scripted_runner_defaults_to_success() {
        let runner = ScriptedRunner::new();
        let out = runner
            .run("docker", &["ps"], Duration::from_secs(1))
            .await
            .unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn system_runner_reports_spawn_failure() {
        let runner = SystemRunner;
        let result = runner
            .run("berth-no-such-binary-xyz", &[], Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(RunError::Spawn { .. })));
    }

    #[tokio::test]
    async fn system_runner_captures_output() {
        let runner = SystemRunner;
        let out = runner
            .run("echo", &["hello"], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }
}
