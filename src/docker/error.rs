use std::fmt;

/// Structured error type for Docker CLI operations.
#[derive(Debug)]
pub enum DockerError {
    /// Docker command ran but returned non-zero exit.
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// Neither compose flavour is installed.
    ComposeUnavailable,

    /// Output of a docker command could not be interpreted.
    UnexpectedOutput { command: String, detail: String },
}

impl DockerError {
    /// Create a command-failed error from a stderr string and optional exit code.
    pub fn cmd_failed(
        cmd: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        DockerError::CommandFailed {
            command: cmd.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
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
            DockerError::ComposeUnavailable => write!(
                f,
                "Neither 'docker compose' (v2) nor 'docker-compose' (v1) found. Please install Docker Compose."
            ),
            DockerError::UnexpectedOutput { command, detail } => {
                write!(f, "Unexpected output from '{}': {}", command, detail)
            }
        }
    }
}

impl std::error::Error for DockerError {}
