//! Command execution seam.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// `None` when the process was killed, timed out, or never spawned.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Exit 0 with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
            duration_ms: 0,
        }
    }

    /// Non-zero exit with the given stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
            duration_ms: 0,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("timed out after {}ms", after.as_millis()),
            timed_out: true,
            duration_ms: after.as_millis() as u64,
        }
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Runs opaque shell command strings.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Never fails: spawn errors and timeouts are reported in the output.
    async fn run(&self, command: &str, timeout: Duration) -> CommandOutput;
}

/// `sh -c <command>` via `tokio::process`.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellCommandRunner {
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, timeout: Duration) -> CommandOutput {
        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can reach the shell's children.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "failed to spawn command");
                return CommandOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn `{}`: {e}", self.shell),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        };

        let pgid = child.id();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return CommandOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to wait for command: {e}"),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Err(_) => {
                warn!(command, timeout_ms = timeout.as_millis() as u64, "command timed out");
                kill_process_group(pgid);
                return CommandOutput::timeout(timeout);
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            command,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            "command finished"
        );
        result
    }
}

/// SIGKILL every process left in the group led by `pgid`.
#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(errno) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!(pgid, error = %errno, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

/// Quote `value` for safe interpolation into a POSIX shell command.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
