//! Unit tests for configuration parsing, validation and env overrides.

use std::time::Duration;

use agent_scribe::config::{is_truthy, read_settings, GlobalConfig};
use agent_scribe::AppError;

fn sample_toml(vault: &str) -> String {
    format!(
        r#"
vault_root = '{vault}'
issue_folder = "inbox"
strip_env = ["CLAUDECODE", "OTHER"]

[claude]
command = "claude --model sonnet"
timeout_seconds = 120
session_idle_seconds = 900
session_max_turns = 8

[codex]
command = "codex --full-auto"
reuse_session = false

[watch]
enabled = true
poll_interval_ms = 1500
settle_samples = 2
settle_max_attempts = 6
extensions = [".MD", "txt", "  "]
excluded_dirs = ["Archive"]
"#
    )
}

#[test]
fn parses_full_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&sample_toml(&temp.path().to_string_lossy())).expect("valid");

    assert_eq!(
        config.vault_root,
        temp.path().canonicalize().expect("canonical")
    );
    assert_eq!(config.issue_folder, "inbox");
    assert_eq!(config.owner_issue_subdir, "Issues");
    assert_eq!(config.strip_env, vec!["CLAUDECODE", "OTHER"]);
    assert_eq!(config.claude.timeout(), Duration::from_secs(120));
    assert_eq!(config.claude.session_max_turns, 8);
    assert!(config.claude.reuse_session);
    assert!(!config.codex.reuse_session);
    assert_eq!(config.codex.timeout_seconds, 600);
    assert!(config.watch.enabled);
    assert_eq!(config.watch.poll_interval(), Duration::from_millis(1500));
    assert_eq!(config.watch.settle_interval(), Duration::from_millis(500));
}

#[test]
fn extensions_and_excluded_dirs_are_normalized() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&sample_toml(&temp.path().to_string_lossy())).expect("valid");

    assert_eq!(config.watch.extensions, vec!["md", "txt"]);
    assert_eq!(config.watch.excluded_dirs, vec!["archive"]);
}

#[test]
fn empty_document_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults are valid");
    assert_eq!(config.issue_folder, "issue");
    assert_eq!(config.strip_env, vec!["CLAUDECODE"]);
    assert_eq!(config.claude.session_idle_seconds, 1800);
    assert_eq!(config.claude.session_max_turns, 20);
    assert!(!config.watch.enabled);
    assert_eq!(config.watch.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.watch.settle_samples, 3);
    assert_eq!(config.watch.settle_max_attempts, 9);
    assert_eq!(config.watch.extensions, vec!["md", "txt"]);
    assert_eq!(
        config.watch.excluded_dirs,
        vec![".git", "__pycache__", "issues"]
    );
}

#[test]
fn zero_timeout_is_rejected() {
    let err = GlobalConfig::from_toml_str("[codex]\ntimeout_seconds = 0\n").expect_err("invalid");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("codex.timeout_seconds")));
}

#[test]
fn settle_attempts_must_cover_samples() {
    let raw = "[watch]\nsettle_samples = 5\nsettle_max_attempts = 4\n";
    let err = GlobalConfig::from_toml_str(raw).expect_err("invalid");
    assert!(err.to_string().contains("settle_max_attempts"));
}

#[test]
fn empty_extension_list_is_rejected() {
    let err = GlobalConfig::from_toml_str("[watch]\nextensions = [\".\"]\n").expect_err("invalid");
    assert!(err.to_string().contains("extensions"));
}

#[test]
fn malformed_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("vault_root = [").expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_missing_path_fails() {
    let err = GlobalConfig::load_from_path("/definitely/not/here.toml").expect_err("missing");
    assert!(err.to_string().starts_with("config:"));
}

#[test]
#[serial_test::serial]
fn env_overrides_apply() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::env::set_var("VAULT_PATH", temp.path());
    std::env::set_var("ISSUE_FOLDER", " reports ");
    std::env::set_var("AUTO_WATCH_ENABLED", "Yes");

    let mut config = GlobalConfig::default();
    let result = config.apply_env_overrides();

    std::env::remove_var("VAULT_PATH");
    std::env::remove_var("ISSUE_FOLDER");
    std::env::remove_var("AUTO_WATCH_ENABLED");

    result.expect("overrides valid");
    assert_eq!(
        config.vault_root,
        temp.path().canonicalize().expect("canonical")
    );
    assert_eq!(config.issue_folder, "reports");
    assert!(config.watch.enabled);
}

#[test]
#[serial_test::serial]
fn falsy_watch_override_disables() {
    std::env::set_var("AUTO_WATCH_ENABLED", "off");
    let mut config = GlobalConfig::default();
    config.watch.enabled = true;
    let result = config.apply_env_overrides();
    std::env::remove_var("AUTO_WATCH_ENABLED");

    result.expect("overrides valid");
    assert!(!config.watch.enabled);
}

#[test]
fn truthy_values() {
    for raw in ["1", "true", "YES", " on "] {
        assert!(is_truthy(raw), "{raw} should be truthy");
    }
    for raw in ["0", "false", "no", "", "enabled"] {
        assert!(!is_truthy(raw), "{raw} should be falsy");
    }
}

#[test]
fn vault_settings_snapshot_is_shareable() {
    let config = GlobalConfig::default();
    let shared = std::sync::Arc::new(std::sync::RwLock::new(config.vault_settings()));
    let copy = read_settings(&shared);
    assert_eq!(copy.issue_folder, "issue");
    assert_eq!(copy.owner_issue_subdir, "Issues");
}
