//! Integration tests for document summarization into issue files.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use agent_scribe::agent::AgentKind;
use agent_scribe::config::VaultSettings;
use agent_scribe::orchestrator::Orchestrator;
use agent_scribe::summarize::{summarize_file_to_issue, SummarizeOptions};
use agent_scribe::AppError;

use super::test_helpers::{fake_agent, orchestrator, test_config};

fn setup(vault: &Path, bin: &Path, body: &str) -> (std::sync::Arc<Orchestrator>, VaultSettings) {
    let codex = fake_agent(bin, "codex", body);
    let config = test_config(vault, "", &codex.display().to_string());
    let settings = config.vault_settings();
    (orchestrator(config), settings)
}

fn options() -> SummarizeOptions {
    SummarizeOptions::new(AgentKind::Codex, Duration::from_secs(10))
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, body).expect("write");
}

#[tokio::test]
async fn agent_sees_context_and_source() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    write(vault.path(), "acme/meetings/m.md", "# Meeting Notes\nship it");
    write(vault.path(), "_Templates/Template_Issue.md", "TEMPLATE BODY");
    let (orch, settings) = setup(vault.path(), bin.path(), "cat");

    let saved = summarize_file_to_issue(&orch, &settings, "acme/meetings/m.md", &options())
        .await
        .expect("summarize");
    assert_eq!(saved.saved_path, "acme/Issues/acme_001_Meeting_Notes.md");
    assert_eq!(saved.name, "acme_001_Meeting_Notes.md");

    let content = std::fs::read_to_string(vault.path().join(&saved.saved_path)).expect("issue");
    assert!(content.contains("[File]\n- Path: acme/meetings/m.md\n- Owner folder: acme"));
    assert!(content.contains("[Issue template, follow this format]\nTEMPLATE BODY"));
    assert!(content.contains("[Source Text]\n# Meeting Notes\nship it"));
}

#[tokio::test]
async fn second_issue_sees_existing_names_and_increments() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    write(vault.path(), "acme/a.md", "# First\none");
    write(vault.path(), "acme/b.md", "# Second\ntwo");
    let (orch, settings) = setup(vault.path(), bin.path(), "cat");

    let first = summarize_file_to_issue(&orch, &settings, "acme/a.md", &options())
        .await
        .expect("first");
    assert_eq!(first.name, "acme_001_First.md");

    let second = summarize_file_to_issue(&orch, &settings, "acme/b.md", &options())
        .await
        .expect("second");
    assert_eq!(second.name, "acme_002_Second.md");

    let content = std::fs::read_to_string(vault.path().join(&second.saved_path)).expect("issue");
    assert!(content.contains("[Existing files in acme/Issues/, follow their naming]\n- acme_001_First.md"));
}

#[tokio::test]
async fn agent_runs_inside_vault() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    write(vault.path(), "note.md", "text");
    let (orch, settings) = setup(vault.path(), bin.path(), "cat >/dev/null; echo '# Where'; pwd");

    let saved = summarize_file_to_issue(&orch, &settings, "note.md", &options())
        .await
        .expect("summarize");
    assert_eq!(saved.saved_path, "issue/issue_001_Where.md");

    let content = std::fs::read_to_string(vault.path().join(&saved.saved_path)).expect("issue");
    let cwd = content.lines().last().expect("pwd line");
    assert_eq!(
        Path::new(cwd).canonicalize().expect("canonical"),
        vault.path().canonicalize().expect("canonical")
    );
}

#[tokio::test]
async fn escaping_path_is_rejected() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let (orch, settings) = setup(vault.path(), bin.path(), "cat");

    let err = summarize_file_to_issue(&orch, &settings, "../outside.md", &options())
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::PathViolation(_)));
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    let (orch, settings) = setup(vault.path(), bin.path(), "cat");

    let err = summarize_file_to_issue(&orch, &settings, "nope.md", &options())
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::NotFound(ref msg) if msg.contains("nope.md")));
}

#[tokio::test]
async fn agent_failure_writes_nothing() {
    let vault = tempfile::tempdir().expect("vault");
    let bin = tempfile::tempdir().expect("bin");
    write(vault.path(), "note.md", "text");
    let (orch, settings) = setup(vault.path(), bin.path(), "cat >/dev/null; exit 4");

    let err = summarize_file_to_issue(&orch, &settings, "note.md", &options())
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::NonZeroExit { code: Some(4), .. }));
    assert!(!vault.path().join("issue").exists());
}
