//! Integration tests for the auto-watch pipeline with a fake batch agent.

#![cfg(unix)]

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use agent_scribe::config::{GlobalConfig, SharedVaultSettings};
use agent_scribe::watch::AutoWatcher;

use super::test_helpers::{fake_agent, orchestrator, test_config};

const SUMMARY_AGENT: &str =
    "cat >/dev/null; printf '%s\\n' '---' 'title: Auto Summary' '---' 'body'";

struct Harness {
    watcher: AutoWatcher,
    settings: SharedVaultSettings,
}

/// Watcher over `vault` whose background loop effectively never fires, so
/// tests drive ticks by hand.
fn harness(vault: &Path, agent_dir: &Path, agent_body: &str) -> Harness {
    let mut config = test_config(vault, "", "");
    config.watch.poll_interval_ms = 60_000;
    build(config, agent_dir, agent_body)
}

fn build(mut config: GlobalConfig, agent_dir: &Path, agent_body: &str) -> Harness {
    let codex = fake_agent(agent_dir, "codex", agent_body);
    config.codex.command = codex.display().to_string();
    let settings = Arc::new(RwLock::new(config.vault_settings()));
    let watch = config.watch.clone();
    let watcher = AutoWatcher::new(orchestrator(config), Arc::clone(&settings), watch);
    Harness { watcher, settings }
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, body).expect("write");
}

#[tokio::test]
async fn new_nested_file_becomes_owner_issue() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    write(vault.path(), "team/old.md", "already here");
    let h = harness(vault.path(), bin.path(), SUMMARY_AGENT);

    let status = h.watcher.set_enabled(true).await.expect("enable");
    assert!(status.enabled);
    assert_eq!(h.watcher.tick().await.expect("tick"), 0, "baseline files are skipped");

    write(vault.path(), "team/notes/new.md", "fresh notes");
    assert_eq!(h.watcher.tick().await.expect("tick"), 1);

    let status = h.watcher.status().await;
    assert_eq!(status.processed_count, 1);
    assert_eq!(status.last_processed_file.as_deref(), Some("team/notes/new.md"));
    assert_eq!(
        status.last_saved_path.as_deref(),
        Some("team/Issues/team_001_Auto_Summary.md")
    );
    assert!(status.last_processed_at.is_some());
    assert!(status.last_error.is_none());

    let saved = std::fs::read_to_string(vault.path().join("team/Issues/team_001_Auto_Summary.md"))
        .expect("issue written");
    assert_eq!(saved, "---\ntitle: Auto Summary\n---\nbody");

    // The issue folder is never fed back into the pipeline.
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);
    h.watcher.stop().await;
}

#[tokio::test]
async fn top_level_file_goes_to_flat_issue_folder() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let h = harness(vault.path(), bin.path(), SUMMARY_AGENT);

    h.watcher.set_enabled(true).await.expect("enable");
    write(vault.path(), "inbox.md", "top level");
    assert_eq!(h.watcher.tick().await.expect("tick"), 1);
    assert_eq!(
        h.watcher.status().await.last_saved_path.as_deref(),
        Some("issue/issue_001_Auto_Summary.md")
    );
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);
    h.watcher.stop().await;
}

#[tokio::test]
async fn ineligible_files_are_ignored() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let h = harness(vault.path(), bin.path(), SUMMARY_AGENT);

    h.watcher.set_enabled(true).await.expect("enable");
    write(vault.path(), "image.png", "binary");
    write(vault.path(), ".hidden.md", "secret");
    write(vault.path(), ".git/HEAD.md", "git");
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);
    assert_eq!(h.watcher.status().await.processed_count, 0);
    h.watcher.stop().await;
}

#[tokio::test]
async fn disabled_watcher_does_nothing() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let h = harness(vault.path(), bin.path(), SUMMARY_AGENT);

    write(vault.path(), "a.md", "x");
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);

    h.watcher.set_enabled(true).await.expect("enable");
    let status = h.watcher.set_enabled(false).await.expect("disable");
    assert!(!status.enabled);
    write(vault.path(), "b.md", "y");
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);
    assert_eq!(h.watcher.status().await.processed_count, 0);
    h.watcher.stop().await;
}

#[tokio::test]
async fn agent_failure_is_recorded_with_path() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let h = harness(
        vault.path(),
        bin.path(),
        "cat >/dev/null; echo boom >&2; exit 1",
    );

    h.watcher.set_enabled(true).await.expect("enable");
    write(vault.path(), "new.md", "content");
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);

    let status = h.watcher.status().await;
    let error = status.last_error.expect("error recorded");
    assert!(error.starts_with("new.md: "), "got {error}");
    assert!(error.contains("boom"), "got {error}");
    assert!(status.last_error_at.is_some());
    assert_eq!(status.processed_count, 0);

    // A failed file is not retried.
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);

    // Re-enabling clears the error.
    let status = h.watcher.set_enabled(true).await.expect("enable");
    assert!(status.last_error.is_none());
    h.watcher.stop().await;
}

#[tokio::test]
async fn failing_file_does_not_stop_the_batch() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let h = harness(
        vault.path(),
        bin.path(),
        "input=$(cat); case \"$input\" in *POISON*) echo rejected >&2; exit 1;; esac; \
         printf '%s\\n' '# Good Note' 'body'",
    );

    h.watcher.set_enabled(true).await.expect("enable");
    write(vault.path(), "a.md", "POISON");
    write(vault.path(), "b.md", "fine");
    assert_eq!(h.watcher.tick().await.expect("tick"), 1);

    let status = h.watcher.status().await;
    assert_eq!(status.processed_count, 1);
    assert_eq!(status.last_processed_file.as_deref(), Some("b.md"));
    assert_eq!(
        status.last_saved_path.as_deref(),
        Some("issue/issue_001_Good_Note.md")
    );
    // The later success clears the earlier failure.
    assert!(status.last_error.is_none());
    h.watcher.stop().await;
}

#[tokio::test]
async fn disabling_mid_batch_leaves_later_files() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let started = bin.path().join("started");
    let h = harness(
        vault.path(),
        bin.path(),
        &format!(
            "cat >/dev/null; touch '{}'; sleep 0.5; printf '%s\\n' '# Batch' 'body'",
            started.display()
        ),
    );

    h.watcher.set_enabled(true).await.expect("enable");
    for name in ["a.md", "b.md", "c.md"] {
        write(vault.path(), name, "queued");
    }

    let ticking = {
        let watcher = h.watcher.clone();
        tokio::spawn(async move { watcher.tick().await })
    };
    let first_running = tokio::time::timeout(Duration::from_secs(10), async {
        while !started.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(first_running.is_ok(), "first file never reached the agent");
    h.watcher.set_enabled(false).await.expect("disable");

    let saved = ticking.await.expect("join").expect("tick");
    assert_eq!(saved, 1, "only the in-flight file completes");
    let status = h.watcher.status().await;
    assert_eq!(status.processed_count, 1);
    assert_eq!(status.last_processed_file.as_deref(), Some("a.md"));
    assert!(!vault.path().join("issue/issue_002_Batch.md").exists());
    h.watcher.stop().await;
}

#[tokio::test]
async fn missing_vault_is_reported() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let h = harness(vault.path(), bin.path(), SUMMARY_AGENT);
    h.watcher.set_enabled(true).await.expect("enable");

    h.settings.write().expect("settings").vault_root = vault.path().join("gone");
    assert_eq!(h.watcher.tick().await.expect("tick"), 0);

    let error = h.watcher.status().await.last_error.expect("error recorded");
    assert!(error.starts_with("vault not found"), "got {error}");
    h.watcher.stop().await;
}

#[tokio::test]
async fn root_change_rebaselines() {
    let vault = tempfile::tempdir().expect("vault");
    let other = tempfile::tempdir().expect("other vault");
    let bin = tempfile::tempdir().expect("bin");
    write(other.path(), "existing.md", "old content");
    let h = harness(vault.path(), bin.path(), SUMMARY_AGENT);
    h.watcher.set_enabled(true).await.expect("enable");

    let other_root = other.path().canonicalize().expect("canonical");
    h.settings.write().expect("settings").vault_root = other_root.clone();
    assert_eq!(h.watcher.tick().await.expect("tick"), 0, "switch only rebaselines");

    write(&other_root, "fresh.md", "new content");
    assert_eq!(h.watcher.tick().await.expect("tick"), 1);
    assert!(other_root.join("issue/issue_001_Auto_Summary.md").is_file());
    h.watcher.stop().await;
}

#[tokio::test]
async fn background_loop_processes_and_stops() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let h = build(test_config(vault.path(), "", ""), bin.path(), SUMMARY_AGENT);

    h.watcher.start().await.expect("start");
    let status = h.watcher.set_enabled(true).await.expect("enable");
    assert!(status.running);
    assert!((status.poll_interval_sec - 0.05).abs() < f64::EPSILON);

    write(vault.path(), "team/loop.md", "picked up by the loop");
    let processed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if h.watcher.status().await.processed_count == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(processed.is_ok(), "loop never processed the file");
    assert!(vault.path().join("team/Issues/team_001_Auto_Summary.md").is_file());

    h.watcher.stop().await;
    assert!(!h.watcher.status().await.running);
}
