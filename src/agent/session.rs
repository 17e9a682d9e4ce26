//! Conversation-id leasing for the session-capable agent.
//!
//! One slot holds the current session id, its successful turn count, and
//! when it was last used. [`SessionManager::lease`] hands out the current id
//! or mints a new one once the idle or turn limit is reached. Runners settle
//! every invocation through a [`SessionTicket`].
//!
//! The slot is guarded by a `std::sync::Mutex`: every critical section is
//! short and never awaits, and it is independent of the orchestrator's
//! execution lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::AgentConfig;

/// Expiry policy for a leased session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Idle time after which the session is replaced; zero disables.
    pub idle_limit: Duration,
    /// Successful turns after which the session is replaced; zero disables.
    pub max_turns: u32,
}

impl SessionPolicy {
    /// Build the policy from an agent configuration table.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            idle_limit: Duration::from_secs(config.session_idle_seconds),
            max_turns: config.session_max_turns,
        }
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    id: String,
    turns: u32,
    last_used: Option<Instant>,
}

/// Read-only view of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current session id.
    pub id: String,
    /// Successful turns recorded against it.
    pub turns: u32,
}

/// Owner of the single global session slot.
#[derive(Debug)]
pub struct SessionManager {
    policy: SessionPolicy,
    slot: Mutex<SessionSlot>,
}

impl SessionManager {
    /// Create a manager with an empty slot.
    #[must_use]
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            slot: Mutex::new(SessionSlot::default()),
        }
    }

    /// Expiry policy in effect.
    #[must_use]
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Return the session id to use for the next call and whether it is new.
    pub fn lease(&self) -> (String, bool) {
        let now = Instant::now();
        let mut slot = self.lock();

        let idle_expired = !slot.id.is_empty()
            && !self.policy.idle_limit.is_zero()
            && slot
                .last_used
                .is_some_and(|last| now.duration_since(last) >= self.policy.idle_limit);
        let turn_expired =
            !slot.id.is_empty() && self.policy.max_turns > 0 && slot.turns >= self.policy.max_turns;

        if slot.id.is_empty() || idle_expired || turn_expired {
            slot.id = uuid::Uuid::new_v4().to_string();
            slot.turns = 0;
            slot.last_used = Some(now);
            debug!(idle_expired, turn_expired, "minted new session id");
            return (slot.id.clone(), true);
        }
        (slot.id.clone(), false)
    }

    /// Record the outcome of a call made with `id`.
    ///
    /// Refreshes the idle clock in both cases; only a success counts as a
    /// turn. A stale or empty id is ignored.
    pub fn touch(&self, id: &str, success: bool) {
        if id.is_empty() {
            return;
        }
        let mut slot = self.lock();
        if slot.id != id {
            return;
        }
        slot.last_used = Some(Instant::now());
        if success {
            slot.turns += 1;
        }
    }

    /// Clear the slot if it still holds `id`.
    pub fn reset(&self, id: &str) {
        if id.is_empty() {
            return;
        }
        let mut slot = self.lock();
        if slot.id != id {
            return;
        }
        *slot = SessionSlot::default();
    }

    /// Reset the session when `stderr` says the upstream no longer knows it.
    ///
    /// Returns `true` when a reset was triggered.
    pub fn reset_on_session_error(&self, id: &str, stderr: &str) -> bool {
        if !is_session_error(stderr) {
            return false;
        }
        warn!(session = session_label(id), "session reset due to session-related error");
        self.reset(id);
        true
    }

    /// Current session, if any.
    #[must_use]
    pub fn current(&self) -> Option<SessionSnapshot> {
        let slot = self.lock();
        if slot.id.is_empty() {
            None
        } else {
            Some(SessionSnapshot {
                id: slot.id.clone(),
                turns: slot.turns,
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether agent stderr reports an unknown or invalid session.
#[must_use]
pub fn is_session_error(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("session") && (lowered.contains("not found") || lowered.contains("invalid"))
}

/// Short label for logs: the first segment of a uuid, or `-` when absent.
#[must_use]
pub fn session_label(id: &str) -> &str {
    if id.is_empty() {
        return "-";
    }
    id.split('-').next().unwrap_or(id)
}

/// A leased session id bound to the manager that issued it.
///
/// Runners settle exactly one outcome per ticket.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    manager: Arc<SessionManager>,
    id: String,
    created: bool,
}

impl SessionTicket {
    /// Lease from `manager` and wrap the result.
    #[must_use]
    pub fn lease(manager: &Arc<SessionManager>) -> Self {
        let (id, created) = manager.lease();
        Self {
            manager: Arc::clone(manager),
            id,
            created,
        }
    }

    /// Session id passed to the agent.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the id was minted by this lease.
    #[must_use]
    pub fn created(&self) -> bool {
        self.created
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &str {
        session_label(&self.id)
    }

    /// Record a successful turn.
    pub fn succeed(&self) {
        self.manager.touch(&self.id, true);
    }

    /// Record a failed call.
    pub fn fail(&self) {
        self.manager.touch(&self.id, false);
    }

    /// Record a non-zero exit and drop the session if stderr invalidates it.
    pub fn fail_with_stderr(&self, stderr: &str) {
        self.manager.touch(&self.id, false);
        self.manager.reset_on_session_error(&self.id, stderr);
    }
}
