//! Agent orchestration.
//!
//! [`Orchestrator`] is the one entry point for running either agent. It
//! resolves argv from configuration, attaches a reusable session id when the
//! agent supports it, and serializes every call to the session-capable
//! agent behind a single async lock so turns reach it strictly in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::agent::command::{binary_name, has_session_flags, resolve_command};
use crate::agent::session::{SessionManager, SessionPolicy, SessionTicket};
use crate::agent::AgentKind;
use crate::config::GlobalConfig;
use crate::process::{self, EventStream, Invocation};
use crate::Result;

/// Flag used to pin a conversation id on the session-capable agent.
pub const SESSION_ID_FLAG: &str = "--session-id";

/// Shortest timeout an agent call is given.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// One summarization request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Agent to run.
    pub agent: AgentKind,
    /// Text to summarize; must not be blank.
    pub source: String,
    /// Instruction placed before the source.
    pub instruction: String,
    /// Optional block placed between instruction and source.
    pub context: Option<String>,
    /// Overrides the agent's configured timeout.
    pub timeout: Option<Duration>,
    /// Directory the agent starts in.
    pub working_dir: Option<PathBuf>,
}

impl GenerateRequest {
    /// Request with no context, default timeout and inherited working directory.
    #[must_use]
    pub fn new(agent: AgentKind, source: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            agent,
            source: source.into(),
            instruction: instruction.into(),
            context: None,
            timeout: None,
            working_dir: None,
        }
    }

    /// Attach a context block.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Override the timeout, raised to at least [`MIN_TIMEOUT`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(MIN_TIMEOUT));
        self
    }

    /// Start the agent in `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Runs agents according to configuration; cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Orchestrator {
    config: Arc<GlobalConfig>,
    sessions: Arc<SessionManager>,
    exec_lock: Arc<Mutex<()>>,
}

impl Orchestrator {
    /// Build an orchestrator with a fresh session slot.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let sessions = Arc::new(SessionManager::new(SessionPolicy::from_config(
            &config.claude,
        )));
        Self {
            config,
            sessions,
            exec_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Session slot of the session-capable agent.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Resolved argv for `agent`, before any session flag is attached.
    #[must_use]
    pub fn resolve_command(&self, agent: AgentKind) -> Vec<String> {
        resolve_command(agent.profile(), &agent.config(&self.config).command)
    }

    /// Run `request` and return the agent's trimmed output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for blank source text (nothing is
    /// spawned), otherwise any error of [`process::run_buffered`].
    pub async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let invocation = self.invocation(&request)?;
        let _guard = self.acquire(request.agent).await;
        let (invocation, ticket) = self.attach_session(invocation);
        process::run_buffered(&invocation, ticket.as_ref()).await
    }

    /// Run `request` and return its live event stream.
    ///
    /// For the session-capable agent the execution lock stays held until the
    /// stream settles or is dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for blank source text (nothing is
    /// spawned), otherwise any error of [`process::spawn_streaming`].
    pub async fn stream(&self, request: GenerateRequest) -> Result<EventStream> {
        let invocation = self.invocation(&request)?;
        let guard = self.acquire(request.agent).await;
        let (invocation, ticket) = self.attach_session(invocation);
        process::spawn_streaming(invocation, ticket, guard).await
    }

    fn invocation(&self, request: &GenerateRequest) -> Result<Invocation> {
        let agent_config = request.agent.config(&self.config);
        let invocation = Invocation::new(
            request.agent,
            self.resolve_command(request.agent),
            &request.source,
            &request.instruction,
            request.context.as_deref(),
            request.timeout.unwrap_or_else(|| agent_config.timeout()),
        )?
        .with_stripped_env(self.config.strip_env.clone());

        Ok(match &request.working_dir {
            Some(dir) => invocation.with_working_dir(dir.clone()),
            None => invocation,
        })
    }

    async fn acquire(&self, agent: AgentKind) -> Option<OwnedMutexGuard<()>> {
        if agent.profile().supports_session {
            Some(Arc::clone(&self.exec_lock).lock_owned().await)
        } else {
            None
        }
    }

    /// Append `--session-id` when reuse applies; returns the ticket to settle.
    fn attach_session(&self, mut invocation: Invocation) -> (Invocation, Option<SessionTicket>) {
        let agent = invocation.agent;
        let profile = agent.profile();
        let agent_config = agent.config(&self.config);

        let eligible = profile.supports_session
            && agent_config.reuse_session
            && invocation
                .command
                .first()
                .is_some_and(|program| binary_name(program) == profile.binary)
            && !has_session_flags(profile, &invocation.command);
        if !eligible {
            return (invocation, None);
        }

        let ticket = SessionTicket::lease(&self.sessions);
        invocation.command.push(SESSION_ID_FLAG.to_owned());
        invocation.command.push(ticket.id().to_owned());

        let policy = self.sessions.policy();
        info!(
            agent = %agent,
            session = ticket.label(),
            max_turns = policy.max_turns,
            idle_limit = ?policy.idle_limit,
            "session {}",
            if ticket.created() { "created" } else { "reused" }
        );
        (invocation, Some(ticket))
    }
}
