//! External command execution.
//!
//! Every provisioning step is an invocation of some CLI (`lxc`, `sunbeam`,
//! `ip`). `CommandRunner` is the seam the pipeline talks to; `ProcessRunner`
//! is the real implementation backed by `tokio::process`.

use async_trait::async_trait;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A program and its arguments. No shell is involved unless the program is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Per-invocation execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report a non-zero exit in the result instead of raising `CommandFailure`.
    ///
    /// Used by probes where a negative answer is an expected outcome.
    pub ignore_failure: bool,
    /// Kill the process and raise `CommandTimeout` once this elapses.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn probe() -> Self {
        Self {
            ignore_failure: true,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured outcome of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepResult {
    /// Process exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl StepResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
impl StepResult {
    pub fn stdout(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion and capture its output.
    ///
    /// Errors only when the process could not be run at all (or timed out);
    /// a non-zero exit is reported through `StepResult::exit_code`.
    async fn run(&self, command: &CommandLine, options: RunOptions) -> ProvisionResult<StepResult>;

    /// Like `run`, but raises `CommandFailure` on non-zero exit unless
    /// `options.ignore_failure` is set.
    async fn run_or_fail(
        &self,
        command: &CommandLine,
        options: RunOptions,
    ) -> ProvisionResult<StepResult> {
        let result = self.run(command, options).await?;
        if !result.success() && !options.ignore_failure {
            tracing::warn!(
                command = %command,
                exit_code = result.exit_code,
                "Command failed"
            );
            return Err(ProvisionError::CommandFailure {
                command: command.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}

/// `CommandRunner` that spawns real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandLine, options: RunOptions) -> ProvisionResult<StepResult> {
        tracing::debug!(command = %command, timeout = ?options.timeout, "Running command");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        // Nothing here is interactive; a prompt would hang the pipeline.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            tracing::error!(command = %command, "Failed to spawn command: {}", e);
            ProvisionError::Io(e)
        })?;

        let output = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    // Dropping the future drops the child, and kill_on_drop reaps it.
                    tracing::warn!(command = %command, timeout_ms = limit.as_millis(), "Command timed out");
                    return Err(ProvisionError::CommandTimeout {
                        command: command.to_string(),
                        timeout_ms: limit.as_millis(),
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let result = StepResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(command = %command, exit_code = result.exit_code, "Command finished");
        Ok(result)
    }
}
