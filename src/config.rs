//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Per-agent CLI settings (`[claude]` / `[codex]` tables).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Command line used to launch the agent; empty means the canonical binary.
    #[serde(default)]
    pub command: String,
    /// Upper bound for one invocation.
    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,
    /// Whether a conversation id is reused across calls (session-capable agents only).
    #[serde(default = "default_true")]
    pub reuse_session: bool,
    /// Idle time after which the session is replaced; 0 disables the check.
    #[serde(default = "default_session_idle")]
    pub session_idle_seconds: u64,
    /// Successful turns after which the session is replaced; 0 disables the check.
    #[serde(default = "default_session_max_turns")]
    pub session_max_turns: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout_seconds: default_agent_timeout(),
            reuse_session: true,
            session_idle_seconds: default_session_idle(),
            session_max_turns: default_session_max_turns(),
        }
    }
}

impl AgentConfig {
    /// Invocation timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Auto-watch polling settings (`[watch]` table).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchConfig {
    /// Whether the watch loop starts enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Delay between two scans of the vault.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay between two size samples while waiting for a file to settle.
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,
    /// Consecutive identical size samples required to call a file stable.
    #[serde(default = "default_settle_samples")]
    pub settle_samples: u32,
    /// Maximum number of size samples before giving up on stability.
    #[serde(default = "default_settle_max_attempts")]
    pub settle_max_attempts: u32,
    /// File extensions eligible for summarization (without the dot).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory names never descended into (case-insensitive).
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
    /// Upper bound for one summarization run triggered by the watcher.
    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: default_poll_interval_ms(),
            settle_interval_ms: default_settle_interval_ms(),
            settle_samples: default_settle_samples(),
            settle_max_attempts: default_settle_max_attempts(),
            extensions: default_extensions(),
            excluded_dirs: default_excluded_dirs(),
            timeout_seconds: default_agent_timeout(),
        }
    }
}

impl WatchConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Settle sampling interval as a [`Duration`].
    #[must_use]
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_agent_timeout() -> u64 {
    600
}

fn default_session_idle() -> u64 {
    1800
}

fn default_session_max_turns() -> u32 {
    20
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_settle_interval_ms() -> u64 {
    500
}

fn default_settle_samples() -> u32 {
    3
}

fn default_settle_max_attempts() -> u32 {
    9
}

fn default_extensions() -> Vec<String> {
    vec!["md".into(), "txt".into()]
}

fn default_excluded_dirs() -> Vec<String> {
    vec![".git".into(), "__pycache__".into(), "issues".into()]
}

fn default_vault_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_issue_folder() -> String {
    "issue".into()
}

fn default_owner_issue_subdir() -> String {
    "Issues".into()
}

fn default_strip_env() -> Vec<String> {
    vec!["CLAUDECODE".into()]
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root of the document tree that is summarized and watched.
    #[serde(default = "default_vault_root")]
    pub vault_root: PathBuf,
    /// Flat folder (relative to the vault) for issues of top-level files.
    #[serde(default = "default_issue_folder")]
    pub issue_folder: String,
    /// Sub-folder inside an owner folder that receives its issues.
    #[serde(default = "default_owner_issue_subdir")]
    pub owner_issue_subdir: String,
    /// Environment variables removed from every spawned agent.
    #[serde(default = "default_strip_env")]
    pub strip_env: Vec<String>,
    /// Session-capable agent settings.
    #[serde(default)]
    pub claude: AgentConfig,
    /// Batch agent settings.
    #[serde(default)]
    pub codex: AgentConfig,
    /// Auto-watch settings.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            vault_root: default_vault_root(),
            issue_folder: default_issue_folder(),
            owner_issue_subdir: default_owner_issue_subdir(),
            strip_env: default_strip_env(),
            claude: AgentConfig::default(),
            codex: AgentConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VAULT_PATH`, `ISSUE_FOLDER` and `AUTO_WATCH_ENABLED` overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the overridden values fail validation.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(vault) = env::var("VAULT_PATH") {
            if !vault.trim().is_empty() {
                self.vault_root = PathBuf::from(vault.trim());
            }
        }
        if let Ok(folder) = env::var("ISSUE_FOLDER") {
            if !folder.trim().is_empty() {
                folder.trim().clone_into(&mut self.issue_folder);
            }
        }
        if let Ok(flag) = env::var("AUTO_WATCH_ENABLED") {
            self.watch.enabled = is_truthy(&flag);
        }
        self.validate()
    }

    /// Snapshot of the settings the watch loop re-reads every tick.
    #[must_use]
    pub fn vault_settings(&self) -> VaultSettings {
        VaultSettings {
            vault_root: self.vault_root.clone(),
            issue_folder: self.issue_folder.clone(),
            owner_issue_subdir: self.owner_issue_subdir.clone(),
        }
    }

    fn validate(&mut self) -> Result<()> {
        for (name, agent) in [("claude", &self.claude), ("codex", &self.codex)] {
            if agent.timeout_seconds == 0 {
                return Err(AppError::Config(format!(
                    "{name}.timeout_seconds must be greater than zero"
                )));
            }
        }

        if self.watch.timeout_seconds == 0 {
            return Err(AppError::Config(
                "watch.timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "watch.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.watch.settle_samples == 0 {
            return Err(AppError::Config(
                "watch.settle_samples must be greater than zero".into(),
            ));
        }
        if self.watch.settle_max_attempts < self.watch.settle_samples {
            return Err(AppError::Config(
                "watch.settle_max_attempts must be at least watch.settle_samples".into(),
            ));
        }

        self.watch.extensions = self
            .watch
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if self.watch.extensions.is_empty() {
            return Err(AppError::Config(
                "watch.extensions must not be empty".into(),
            ));
        }
        self.watch.excluded_dirs = self
            .watch
            .excluded_dirs
            .iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        if self.issue_folder.trim().is_empty() {
            return Err(AppError::Config("issue_folder must not be empty".into()));
        }

        // A missing vault is tolerated here; the watcher reports it per tick.
        match self.vault_root.canonicalize() {
            Ok(canonical) => self.vault_root = canonical,
            Err(err) => warn!(
                vault = %self.vault_root.display(),
                %err,
                "vault root cannot be resolved yet"
            ),
        }

        Ok(())
    }
}

/// Settings that may change while the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    /// Root of the document tree.
    pub vault_root: PathBuf,
    /// Flat issue folder for top-level files.
    pub issue_folder: String,
    /// Issue sub-folder inside owner folders.
    pub owner_issue_subdir: String,
}

/// Live settings shared between the watcher and whoever reconfigures it.
///
/// A `std::sync::RwLock` is used so readers never need an async context.
pub type SharedVaultSettings = Arc<RwLock<VaultSettings>>;

/// Read a consistent copy of the shared settings, tolerating lock poisoning.
#[must_use]
pub fn read_settings(settings: &SharedVaultSettings) -> VaultSettings {
    match settings.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Interpret `1/true/yes/on` (any case) as true.
#[must_use]
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
