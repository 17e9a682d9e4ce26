//! Polling auto-watch loop.
//!
//! A background task wakes every poll interval, diffs a fresh vault snapshot
//! against the previous one and summarizes each new file into an issue, one
//! file at a time in ascending path order. Failures are recorded in the
//! status and never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scanner::{scan_candidates, ScanRules};
use super::settle::{wait_for_stable_file, SettlePolicy};
use super::state::{TickPlan, WatchState, WatchStatus};
use crate::agent::AgentKind;
use crate::config::{read_settings, SharedVaultSettings, VaultSettings, WatchConfig};
use crate::issue::SavedIssue;
use crate::orchestrator::Orchestrator;
use crate::summarize::{resolve_in_vault, summarize_file_to_issue, SummarizeOptions};
use crate::{AppError, Result};

/// Agent used for unattended summaries.
pub const WATCH_AGENT: AgentKind = AgentKind::Codex;

/// Pause after a tick fails before polling again.
pub const TICK_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct WatchTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Guarded {
    state: WatchState,
    task: Option<WatchTask>,
}

#[derive(Debug)]
struct Inner {
    orchestrator: Arc<Orchestrator>,
    settings: SharedVaultSettings,
    watch: WatchConfig,
    settle: SettlePolicy,
    guarded: Mutex<Guarded>,
}

/// Cloneable handle to the auto-watch loop.
///
/// The polling task keeps a handle of its own, so call [`stop`](Self::stop)
/// to end it.
#[derive(Debug, Clone)]
pub struct AutoWatcher {
    inner: Arc<Inner>,
}

impl AutoWatcher {
    /// Watcher that starts enabled when `watch.enabled` is set.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, settings: SharedVaultSettings, watch: WatchConfig) -> Self {
        let settle = SettlePolicy::from_config(&watch);
        let state = WatchState::new(watch.enabled);
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                settings,
                watch,
                settle,
                guarded: Mutex::new(Guarded { state, task: None }),
            }),
        }
    }

    /// Ensure the polling task runs; when enabled, baseline the current vault.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the baseline scan task fails.
    pub async fn start(&self) -> Result<()> {
        let enabled = {
            let mut guarded = self.inner.guarded.lock().await;
            self.ensure_task(&mut guarded);
            guarded.state.enabled
        };
        if enabled {
            let settings = read_settings(&self.inner.settings);
            let snapshot = self.scan(&settings).await?;
            let mut guarded = self.inner.guarded.lock().await;
            guarded.state.rebaseline(&settings.vault_root, snapshot);
        }
        info!(enabled, "auto-watch started");
        Ok(())
    }

    /// Cancel the polling task and wait for it to finish.
    pub async fn stop(&self) {
        let task = self.inner.guarded.lock().await.task.take();
        let Some(task) = task else {
            return;
        };
        task.cancel.cancel();
        if let Err(err) = task.handle.await {
            if !err.is_cancelled() {
                warn!(%err, "auto-watch task ended abnormally");
            }
        }
        info!("auto-watch stopped");
    }

    /// Turn processing on or off.
    ///
    /// Enabling baselines the current vault, so files that already exist are
    /// never summarized, and clears the last error. Disabling forgets the
    /// known files.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the baseline scan task fails.
    pub async fn set_enabled(&self, enabled: bool) -> Result<WatchStatus> {
        let baseline = if enabled {
            let settings = read_settings(&self.inner.settings);
            let snapshot = self.scan(&settings).await?;
            Some((settings.vault_root, snapshot))
        } else {
            None
        };

        let mut guarded = self.inner.guarded.lock().await;
        guarded.state.enabled = enabled;
        match baseline {
            Some((root, snapshot)) => {
                guarded.state.rebaseline(&root, snapshot);
                guarded.state.clear_error();
            }
            None => guarded.state.forget(),
        }
        self.ensure_task(&mut guarded);
        info!(enabled, "auto-watch toggled");
        Ok(self.snapshot(&guarded))
    }

    /// Current status.
    pub async fn status(&self) -> WatchStatus {
        let guarded = self.inner.guarded.lock().await;
        self.snapshot(&guarded)
    }

    /// Run one poll cycle and return how many issues were saved.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the vault scan task fails. Per-file failures
    /// are recorded in the status instead.
    pub async fn tick(&self) -> Result<usize> {
        if !self.inner.guarded.lock().await.state.enabled {
            return Ok(0);
        }

        let settings = read_settings(&self.inner.settings);
        let root = settings.vault_root.clone();
        if !root.is_dir() {
            let message = format!("vault not found: {}", root.display());
            warn!(%message, "auto-watch tick skipped");
            self.inner.guarded.lock().await.state.record_error(message);
            return Ok(0);
        }

        let current = self.scan(&settings).await?;
        let plan = self.inner.guarded.lock().await.state.advance(&root, current);
        let TickPlan::Process(new_files) = plan else {
            info!(root = %root.display(), "watch root changed, rebaselined");
            return Ok(0);
        };

        let mut saved_count = 0;
        for path in new_files {
            if !self.inner.guarded.lock().await.state.enabled {
                debug!("auto-watch disabled mid-batch");
                break;
            }
            match self.handle_file(&settings, &path).await {
                Ok(Some(saved)) => {
                    saved_count += 1;
                    self.inner
                        .guarded
                        .lock()
                        .await
                        .state
                        .record_success(&path, &saved.saved_path);
                }
                Ok(None) => debug!(path = %path, "skipped vanished file"),
                Err(err) => {
                    warn!(path = %path, %err, "auto-watch file failed");
                    self.inner
                        .guarded
                        .lock()
                        .await
                        .state
                        .record_error(format!("{path}: {err}"));
                }
            }
        }
        Ok(saved_count)
    }

    async fn handle_file(&self, settings: &VaultSettings, path: &str) -> Result<Option<SavedIssue>> {
        let absolute = resolve_in_vault(&settings.vault_root, path)?;
        if !absolute.is_file() {
            return Ok(None);
        }
        if !wait_for_stable_file(&absolute, &self.inner.settle).await {
            return Ok(None);
        }

        info!(path, agent = %WATCH_AGENT, "auto-watch summarizing new file");
        let options = SummarizeOptions::new(
            WATCH_AGENT,
            Duration::from_secs(self.inner.watch.timeout_seconds),
        );
        summarize_file_to_issue(&self.inner.orchestrator, settings, path, &options)
            .await
            .map(Some)
    }

    async fn scan(&self, settings: &VaultSettings) -> Result<std::collections::BTreeSet<String>> {
        let root = settings.vault_root.clone();
        let rules = ScanRules::from_config(&self.inner.watch, &settings.issue_folder);
        tokio::task::spawn_blocking(move || scan_candidates(&root, &rules))
            .await
            .map_err(|err| AppError::Io(format!("vault scan task failed: {err}")))
    }

    fn snapshot(&self, guarded: &Guarded) -> WatchStatus {
        let running = guarded
            .task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished());
        guarded.state.status(running, self.inner.watch.poll_interval())
    }

    fn ensure_task(&self, guarded: &mut Guarded) {
        if guarded
            .task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
        {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.clone(), cancel.clone()));
        guarded.task = Some(WatchTask { handle, cancel });
    }
}

async fn run_loop(watcher: AutoWatcher, cancel: CancellationToken) {
    let poll_interval = watcher.inner.watch.poll_interval();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(poll_interval) => {}
        }

        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = watcher.tick() => outcome,
        };

        if let Err(err) = outcome {
            warn!(%err, "auto-watch tick failed");
            watcher
                .inner
                .guarded
                .lock()
                .await
                .state
                .record_error(err.to_string());
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(TICK_ERROR_BACKOFF) => {}
            }
        }
    }
    debug!("auto-watch loop exited");
}
