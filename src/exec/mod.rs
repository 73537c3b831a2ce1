//! Command execution.
//!
//! Every subprocess this tool starts goes through a [`CommandRunner`]. The
//! production runner shells out with `sh -c`; tests substitute a scripted
//! runner so no Docker daemon is needed.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// A shell command line plus the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    line: String,
    cwd: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            cwd: None,
        }
    }

    /// Run the command from `dir` instead of the current directory.
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cwd {
            Some(dir) => write!(f, "(cd {} && {})", dir.display(), self.line),
            None => f.write_str(&self.line),
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Synchronous command execution capability.
///
/// `run` only returns `Err` when the command could not be started at all;
/// a non-zero exit is reported through [`CommandOutput::exit_code`].
pub trait CommandRunner {
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput>;

    /// Run and report whether the command exited 0.
    fn exec(&self, command: &ShellCommand) -> Result<bool> {
        let output = self.run(command)?;
        if !output.success() {
            debug!(
                "`{}` exited with {:?}: {}",
                command,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output.success())
    }

    /// Run and turn a non-zero exit into [`Error::Command`].
    fn require(&self, command: &ShellCommand, what: &str) -> Result<CommandOutput> {
        let output = self.run(command)?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::Command(format!(
                "{}: `{}` exited with {:?}: {}",
                what,
                command,
                output.exit_code,
                output.stderr.trim()
            )))
        }
    }

    /// Pause between polling attempts.
    fn pause(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        ShellRunner
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        debug!("Executing: {}", command);

        let mut process = std::process::Command::new("sh");
        process.arg("-c").arg(command.line());
        if let Some(dir) = command.cwd() {
            process.current_dir(dir);
        }

        let output = process
            .output()
            .map_err(|e| Error::Command(format!("Failed to execute `{}`: {}", command, e)))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Re-run `command` until it succeeds or `max_attempts` runs have failed.
///
/// Returns whether it eventually succeeded. Callers proceed either way.
pub fn poll_until_success(
    runner: &dyn CommandRunner,
    command: &ShellCommand,
    max_attempts: u32,
    interval: Duration,
) -> Result<bool> {
    for attempt in 1..=max_attempts {
        if runner.exec(command)? {
            if attempt > 1 {
                debug!("`{}` succeeded after {} attempts", command, attempt);
            }
            return Ok(true);
        }
        if attempt < max_attempts {
            runner.pause(interval);
        }
    }
    tracing::warn!(
        "`{}` still failing after {} attempts, continuing",
        command,
        max_attempts
    );
    Ok(false)
}

/// Quote a value for safe interpolation into an `sh -c` line.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
