//! Summarize a vault document into a sequenced issue file.
//!
//! The pipeline resolves the document inside the vault, builds a context
//! block, runs the chosen agent from the vault directory and saves the
//! output with [`save_issue`].

pub mod context;
pub mod path_safety;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, info_span, Instrument};

use crate::agent::AgentKind;
use crate::config::VaultSettings;
use crate::issue::{save_issue, IssueLayout, SavedIssue};
use crate::orchestrator::{GenerateRequest, Orchestrator};
use crate::{AppError, Result};

pub use context::build_context;
pub use path_safety::resolve_in_vault;

/// Instruction used when the caller supplies none.
pub const DEFAULT_INSTRUCTION: &str = "\
Summarize the following Markdown document, focusing on what matters most.
Add a header at the top of the document with these fields:
 - account: the name of the top-level folder that contains the file.
 - Date: the date found in the document, formatted as year-month-day (for example 2026-02-02).
 - tags: [type value, account value].
Organize the summary into topic, key points and action items.
Write it in Markdown following the Template_Issue.md format provided below.
The system saves the file for you, so do not write any files; output the content only.";

/// Options for one summarization.
#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    /// Agent that writes the summary.
    pub agent: AgentKind,
    /// Instruction placed before the context and source.
    pub instruction: String,
    /// Budget for the agent call.
    pub timeout: Duration,
}

impl SummarizeOptions {
    /// Default instruction with the given agent and timeout.
    #[must_use]
    pub fn new(agent: AgentKind, timeout: Duration) -> Self {
        Self {
            agent,
            instruction: DEFAULT_INSTRUCTION.to_owned(),
            timeout,
        }
    }
}

/// Resolve `file_path` inside the vault and read it lossily.
///
/// # Errors
///
/// Returns `AppError::PathViolation` for paths leaving the vault,
/// `AppError::NotFound` if no regular file exists there, and `AppError::Io`
/// if it cannot be read.
pub async fn read_vault_file(vault: &std::path::Path, file_path: &str) -> Result<(PathBuf, String)> {
    let absolute = resolve_in_vault(vault, file_path)?;
    if !absolute.is_file() {
        return Err(AppError::NotFound(format!("file not found: {file_path}")));
    }
    let bytes = tokio::fs::read(&absolute).await?;
    Ok((absolute, String::from_utf8_lossy(&bytes).into_owned()))
}

/// Summarize `file_path` (vault-relative) and save the result as an issue.
///
/// # Errors
///
/// Returns the errors of [`read_vault_file`], any agent failure from
/// [`Orchestrator::generate`], and `AppError::Io` if the issue cannot be
/// saved.
pub async fn summarize_file_to_issue(
    orchestrator: &Orchestrator,
    settings: &VaultSettings,
    file_path: &str,
    options: &SummarizeOptions,
) -> Result<SavedIssue> {
    let span = info_span!("summarize", file = file_path, agent = %options.agent);
    async move {
        let vault = &settings.vault_root;
        let layout = IssueLayout::from(settings);
        let (_, content) = read_vault_file(vault, file_path).await?;

        let request = GenerateRequest::new(options.agent, content, options.instruction.clone())
            .with_context(build_context(vault, file_path, &layout))
            .with_timeout(options.timeout)
            .with_working_dir(vault.clone());
        let output = orchestrator.generate(request).await?;

        let saved = save_issue(vault, file_path, &output, &layout)?;
        info!(saved_path = %saved.saved_path, "summary saved");
        Ok(saved)
    }
    .instrument(span)
    .await
}
