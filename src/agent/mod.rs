//! Agent CLI descriptors, command resolution, and session reuse.
//!
//! Both supported agents are driven by the same runner; what differs between
//! them is captured by a static [`AgentProfile`]:
//! - `command`: argv resolution with default subcommand/flag injection.
//! - `session`: conversation-id leasing for the session-capable agent.

pub mod command;
pub mod session;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, GlobalConfig};
use crate::AppError;

/// Capability descriptor for one agent CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    /// Canonical binary name, compared against the configured binary's base name.
    pub binary: &'static str,
    /// Flag or subcommand inserted right after the binary for batch use.
    pub default_arg: &'static str,
    /// Flags which already select batch/print mode.
    pub batch_flags: &'static [&'static str],
    /// Subcommands which must not receive the default argument.
    pub subcommands: &'static [&'static str],
    /// Whether the CLI accepts a persistent conversation id.
    pub supports_session: bool,
    /// Flags by which the user already controls sessions.
    pub session_flags: &'static [&'static str],
    /// `--flag=value` prefixes by which the user already controls sessions.
    pub session_flag_prefixes: &'static [&'static str],
}

/// Session-capable agent.
pub const CLAUDE: AgentProfile = AgentProfile {
    binary: "claude",
    default_arg: "-p",
    batch_flags: &["-p", "--print"],
    subcommands: &[
        "agents",
        "auth",
        "doctor",
        "install",
        "mcp",
        "plugin",
        "setup-token",
        "update",
        "upgrade",
    ],
    supports_session: true,
    session_flags: &[
        "--session-id",
        "-r",
        "--resume",
        "-c",
        "--continue",
        "--no-session-persistence",
    ],
    session_flag_prefixes: &["--session-id=", "--resume="],
};

/// Batch agent.
pub const CODEX: AgentProfile = AgentProfile {
    binary: "codex",
    default_arg: "exec",
    batch_flags: &[],
    subcommands: &[
        "exec",
        "review",
        "login",
        "logout",
        "mcp",
        "mcp-server",
        "app-server",
        "app",
        "completion",
        "sandbox",
        "debug",
        "apply",
        "a",
        "resume",
        "fork",
        "cloud",
        "features",
        "help",
    ],
    supports_session: false,
    session_flags: &[],
    session_flag_prefixes: &[],
};

/// The agents this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// `claude` CLI, invoked with a reusable session id.
    Claude,
    /// `codex` CLI, invoked statelessly.
    Codex,
}

impl AgentKind {
    /// Static capability descriptor for this agent.
    #[must_use]
    pub fn profile(self) -> &'static AgentProfile {
        match self {
            Self::Claude => &CLAUDE,
            Self::Codex => &CODEX,
        }
    }

    /// Canonical name, used in logs and error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.profile().binary
    }

    /// The configuration table that belongs to this agent.
    #[must_use]
    pub fn config(self, config: &GlobalConfig) -> &AgentConfig {
        match self {
            Self::Claude => &config.claude,
            Self::Codex => &config.codex,
        }
    }
}

impl Display for AgentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentKind {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            other => Err(AppError::InvalidInput(format!("unknown agent `{other}`"))),
        }
    }
}
