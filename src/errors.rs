//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Caller supplied unusable input (e.g. empty source text); nothing was spawned.
    InvalidInput(String),
    /// The agent binary could not be located on `PATH`.
    ExecutableNotFound {
        /// Program name that failed to launch.
        program: String,
    },
    /// The agent did not finish within its time budget and was killed.
    Timeout {
        /// Agent name (`claude`, `codex`, ...).
        agent: String,
        /// Configured bound.
        limit: Duration,
    },
    /// The agent exited unsuccessfully.
    NonZeroExit {
        /// Agent name.
        agent: String,
        /// Exit code, absent when the process was terminated by a signal.
        code: Option<i32>,
        /// Trimmed standard error captured from the process.
        stderr: String,
    },
    /// The agent exited successfully but produced no output.
    EmptyOutput {
        /// Agent name.
        agent: String,
    },
    /// OS-level failure while spawning or talking to a child process.
    Spawn(String),
    /// File system path failed validation against the vault root.
    PathViolation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::ExecutableNotFound { program } => write!(
                f,
                "executable not found: `{program}` (check that it is installed and on PATH)"
            ),
            Self::Timeout { agent, limit } => {
                write!(f, "timeout: {agent} exceeded {limit:?}")
            }
            Self::NonZeroExit {
                agent,
                code,
                stderr,
            } => {
                let code = code.map_or_else(|| "signal".to_owned(), |c| c.to_string());
                write!(f, "{agent} failed (returncode={code}): {stderr}")
            }
            Self::EmptyOutput { agent } => write!(f, "empty output: {agent} returned nothing"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
