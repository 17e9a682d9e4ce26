//! Auto-watch bookkeeping and its serializable status snapshot.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a tick should do with a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickPlan {
    /// The watched root changed; the snapshot became the new baseline.
    Rebaseline,
    /// Paths new since the previous tick, ascending.
    Process(Vec<String>),
}

/// Mutable watch state; callers guard it with one async mutex.
#[derive(Debug, Clone, Default)]
pub struct WatchState {
    /// Whether ticks do any work.
    pub enabled: bool,
    /// Snapshot from the previous tick.
    pub known_files: BTreeSet<String>,
    /// Root the snapshot belongs to.
    pub watched_root: Option<PathBuf>,
    /// Files summarized since start.
    pub processed_count: u64,
    /// Last file summarized.
    pub last_processed_file: Option<String>,
    /// Vault-relative path of the last saved issue.
    pub last_saved_path: Option<String>,
    /// When the last file was summarized.
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Most recent failure.
    pub last_error: Option<String>,
    /// When the most recent failure happened.
    pub last_error_at: Option<DateTime<Utc>>,
}

impl WatchState {
    /// Empty state.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Diff `current` against the known files under `root`.
    ///
    /// A root different from the tracked one only rebaselines, so switching
    /// vaults never floods the pipeline with pre-existing files.
    pub fn advance(&mut self, root: &Path, current: BTreeSet<String>) -> TickPlan {
        if self.watched_root.as_deref() != Some(root) {
            self.rebaseline(root, current);
            return TickPlan::Rebaseline;
        }
        let new_files = current.difference(&self.known_files).cloned().collect();
        self.known_files = current;
        TickPlan::Process(new_files)
    }

    /// Track `root` with `snapshot` as the known files.
    pub fn rebaseline(&mut self, root: &Path, snapshot: BTreeSet<String>) {
        self.watched_root = Some(root.to_path_buf());
        self.known_files = snapshot;
    }

    /// Forget the root and its known files.
    pub fn forget(&mut self) {
        self.watched_root = None;
        self.known_files.clear();
    }

    /// Record a summarized file and clear the last error.
    pub fn record_success(&mut self, file: &str, saved_path: &str) {
        self.processed_count += 1;
        self.last_processed_file = Some(file.to_owned());
        self.last_saved_path = Some(saved_path.to_owned());
        self.last_processed_at = Some(Utc::now());
        self.clear_error();
    }

    /// Record a failure.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.last_error_at = Some(Utc::now());
    }

    /// Clear the last failure.
    pub fn clear_error(&mut self) {
        self.last_error = None;
        self.last_error_at = None;
    }

    /// Snapshot for callers.
    #[must_use]
    pub fn status(&self, running: bool, poll_interval: Duration) -> WatchStatus {
        WatchStatus {
            enabled: self.enabled,
            running,
            poll_interval_sec: poll_interval.as_secs_f64(),
            processed_count: self.processed_count,
            last_processed_file: self.last_processed_file.clone(),
            last_saved_path: self.last_saved_path.clone(),
            last_processed_at: self.last_processed_at,
            last_error: self.last_error.clone(),
            last_error_at: self.last_error_at,
        }
    }
}

/// Point-in-time view of the watcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchStatus {
    /// Whether ticks do any work.
    pub enabled: bool,
    /// Whether the polling task is alive.
    pub running: bool,
    /// Delay between scans.
    pub poll_interval_sec: f64,
    /// Files summarized since start.
    pub processed_count: u64,
    /// Last file summarized.
    pub last_processed_file: Option<String>,
    /// Vault-relative path of the last saved issue.
    pub last_saved_path: Option<String>,
    /// When the last file was summarized.
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Most recent failure.
    pub last_error: Option<String>,
    /// When the most recent failure happened.
    pub last_error_at: Option<DateTime<Utc>>,
}
