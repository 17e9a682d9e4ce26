//! Agent subprocess execution.
//!
//! An [`Invocation`] describes one call: argv, the stdin payload, a timeout
//! and an optional working directory. Two runners execute it:
//! - `runner`: buffers stdout/stderr and returns the final text.
//! - `streaming`: yields [`StreamEvent`]s as the agent produces output.
//!
//! Both drain stdout and stderr concurrently so the child can never block on
//! a full pipe while the parent waits on the other one.

pub mod codec;
pub mod reader;
pub mod runner;
pub mod streaming;

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{error, info};

use crate::agent::command::render_command;
use crate::agent::session::SessionTicket;
use crate::agent::AgentKind;
use crate::{AppError, Result};

pub use runner::run_buffered;
pub use streaming::{spawn_streaming, EventStream};

/// Header that separates the instruction (and context) from the source text.
pub const SOURCE_HEADER: &str = "[Source Text]";

/// Maximum number of characters shown in log previews.
pub const LOG_PREVIEW_LIMIT: usize = 240;

/// Output channel of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Event produced by a streaming invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A piece of output, newline-terminated unless it is the final piece.
    Chunk {
        /// Channel the text came from.
        channel: Channel,
        /// Lossily decoded text.
        text: String,
    },
    /// The channel was closed by the child.
    Eof {
        /// Channel that closed.
        channel: Channel,
    },
    /// Terminal success event carrying the full, trimmed stdout.
    Done {
        /// Final agent output.
        result: String,
    },
}

/// One agent call, ready to be spawned.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Agent being driven; names errors and log lines.
    pub agent: AgentKind,
    /// Resolved argv, binary first.
    pub command: Vec<String>,
    /// Complete stdin payload.
    pub input: String,
    /// Budget covering spawn through exit.
    pub timeout: Duration,
    /// Directory the child starts in.
    pub working_dir: Option<PathBuf>,
    /// Environment variables removed from the child.
    pub strip_env: Vec<String>,
    source_chars: usize,
    instruction_chars: usize,
}

impl Invocation {
    /// Build an invocation from source text, an instruction and optional context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if `source` is blank or `command` is empty.
    pub fn new(
        agent: AgentKind,
        command: Vec<String>,
        source: &str,
        instruction: &str,
        context: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(AppError::InvalidInput("source text is empty".into()));
        }
        if command.is_empty() {
            return Err(AppError::InvalidInput("agent command is empty".into()));
        }
        let instruction = instruction.trim();

        Ok(Self {
            agent,
            command,
            input: build_input(source, instruction, context),
            timeout,
            working_dir: None,
            strip_env: Vec::new(),
            source_chars: source.chars().count(),
            instruction_chars: instruction.chars().count(),
        })
    }

    /// Start the child in `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Remove `vars` from the child's environment.
    #[must_use]
    pub fn with_stripped_env(mut self, vars: Vec<String>) -> Self {
        self.strip_env = vars;
        self
    }

    /// Argv rendered for logs.
    #[must_use]
    pub fn command_text(&self) -> String {
        render_command(&self.command)
    }

    fn log_start(&self, mode: &str, ticket: Option<&SessionTicket>) {
        info!(
            agent = %self.agent,
            mode,
            command = %self.command_text(),
            timeout = ?self.timeout,
            source_chars = self.source_chars,
            instruction_chars = self.instruction_chars,
            session = ticket.map_or("-", SessionTicket::label),
            "agent start"
        );
    }
}

/// Assemble the stdin payload: instruction, optional context, then the source.
#[must_use]
pub fn build_input(source: &str, instruction: &str, context: Option<&str>) -> String {
    let mut parts = vec![instruction.trim().to_owned()];
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        parts.push(context.to_owned());
    }
    parts.push(format!("{SOURCE_HEADER}\n{}", source.trim()));
    let mut input = parts.join("\n\n");
    input.push('\n');
    input
}

/// Trim, escape newlines, and cap `text` for a single-line log field.
#[must_use]
pub fn preview(text: &str) -> String {
    let value = text.trim().replace('\n', "\\n");
    if value.chars().count() <= LOG_PREVIEW_LIMIT {
        return value;
    }
    let head: String = value.chars().take(LOG_PREVIEW_LIMIT).collect();
    format!("{head}...(truncated)")
}

/// Spawn the child with piped stdio and `kill_on_drop(true)`.
fn spawn_child(invocation: &Invocation) -> Result<Child> {
    let (program, args) = invocation
        .command
        .split_first()
        .ok_or_else(|| AppError::InvalidInput("agent command is empty".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    for key in &invocation.strip_env {
        cmd.env_remove(key);
    }
    if let Some(dir) = &invocation.working_dir {
        if !dir.is_dir() {
            return Err(AppError::NotFound(format!(
                "working directory {} does not exist",
                dir.display()
            )));
        }
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            error!(agent = %invocation.agent, command = %invocation.command_text(), "agent executable not found");
            AppError::ExecutableNotFound {
                program: program.clone(),
            }
        } else {
            AppError::Spawn(format!("failed to spawn {program}: {err}"))
        }
    })
}

/// Turn a finished process into the call's result and settle the session.
///
/// Success requires a zero exit and non-blank stdout.
fn settle_outcome(
    agent: AgentKind,
    ticket: Option<&SessionTicket>,
    status: ExitStatus,
    stdout: &str,
    stderr: &str,
    started: Instant,
) -> Result<String> {
    let elapsed = started.elapsed();

    if !status.success() {
        let stderr = stderr.trim().to_owned();
        if let Some(ticket) = ticket {
            ticket.fail_with_stderr(&stderr);
        }
        error!(
            agent = %agent,
            returncode = ?status.code(),
            ?elapsed,
            stderr_preview = %preview(&stderr),
            "agent failed"
        );
        return Err(AppError::NonZeroExit {
            agent: agent.name().to_owned(),
            code: status.code(),
            stderr,
        });
    }

    let output = stdout.trim();
    if output.is_empty() {
        if let Some(ticket) = ticket {
            ticket.fail();
        }
        error!(agent = %agent, ?elapsed, "agent returned empty output");
        return Err(AppError::EmptyOutput {
            agent: agent.name().to_owned(),
        });
    }

    if let Some(ticket) = ticket {
        ticket.succeed();
    }
    info!(
        agent = %agent,
        ?elapsed,
        output_preview = %preview(output),
        "agent done"
    );
    Ok(output.to_owned())
}

/// Settle a timed-out call: log and build the error.
fn timeout_error(agent: AgentKind, ticket: Option<&SessionTicket>, limit: Duration, started: Instant) -> AppError {
    if let Some(ticket) = ticket {
        ticket.fail();
    }
    error!(agent = %agent, elapsed = ?started.elapsed(), timeout = ?limit, "agent timeout");
    AppError::Timeout {
        agent: agent.name().to_owned(),
        limit,
    }
}
