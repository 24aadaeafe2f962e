//! # Subprocess Runner
//!
//! [`CommandRunner`] is the seam between the gatekeeper and the external
//! tools it drives (`salt-key`, `salt`). Production code uses
//! [`TokioCommandRunner`]; tests substitute scripted fakes.
//!
//! Every invocation carries a hard timeout. On expiry the child is killed
//! and the output is reported with `timed_out = true` rather than as an
//! error, so callers decide how a timeout maps onto their own semantics.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

// ════════════════════════════════════════════════════════════════════════════════
// TYPES
// ════════════════════════════════════════════════════════════════════════════════

/// Captured result of a finished (or timed-out) command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when terminated by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exit code 0 and no timeout.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Successful output with the given stdout. Handy for fakes.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect output of '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

// ════════════════════════════════════════════════════════════════════════════════
// TRAIT
// ════════════════════════════════════════════════════════════════════════════════

/// Runs an external program to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// TOKIO IMPLEMENTATION
// ════════════════════════════════════════════════════════════════════════════════

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> Result<CommandOutput, CommandError> {
        if program.is_empty() {
            return Err(CommandError::Empty);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout kills the child.
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(out)) => {
                debug!(program, code = ?out.status.code(), "command finished");
                Ok(CommandOutput {
                    stdout: out.stdout,
                    stderr: out.stderr,
                    exit_code: out.status.code(),
                    timed_out: false,
                })
            }
            Ok(Err(source)) => Err(CommandError::Wait {
                program: program.to_string(),
                source,
            }),
            Err(_) => {
                debug!(program, limit_ms = limit.as_millis() as u64, "command timed out");
                Ok(CommandOutput {
                    timed_out: true,
                    ..CommandOutput::default()
                })
            }
        }
    }
}
