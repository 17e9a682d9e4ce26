//! Sequenced issue file writer.
//!
//! Picks the target folder for a source document, numbers the new issue one
//! past the highest sequence already present there, and moves the content
//! into place without ever replacing an existing file.

use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::naming::{extract_issue_index, extract_title, sanitize_token};
use crate::config::VaultSettings;
use crate::{AppError, Result};

/// Upper bound on sequence bumps when a name is taken concurrently.
pub const MAX_NAME_ATTEMPTS: u32 = 64;

/// Where issues land inside the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueLayout {
    /// Flat folder for top-level sources.
    pub issue_folder: String,
    /// Sub-folder of an owner folder for nested sources.
    pub owner_issue_subdir: String,
}

impl From<&VaultSettings> for IssueLayout {
    fn from(settings: &VaultSettings) -> Self {
        Self {
            issue_folder: settings.issue_folder.clone(),
            owner_issue_subdir: settings.owner_issue_subdir.clone(),
        }
    }
}

impl Default for IssueLayout {
    fn default() -> Self {
        Self {
            issue_folder: "issue".into(),
            owner_issue_subdir: "Issues".into(),
        }
    }
}

/// A written issue file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedIssue {
    /// Vault-relative path, `/`-separated.
    pub saved_path: String,
    /// File name.
    pub name: String,
}

/// Top-level folder of a nested vault-relative path, if any.
#[must_use]
pub fn owner_of(source_rel: &str) -> Option<String> {
    let parts: Vec<_> = Path::new(source_rel)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.len() > 1 {
        parts.into_iter().next()
    } else {
        None
    }
}

/// Folder that receives issues generated from `source_rel`.
#[must_use]
pub fn issue_dir_for(vault: &Path, source_rel: &str, layout: &IssueLayout) -> PathBuf {
    match owner_of(source_rel) {
        Some(owner) => vault.join(owner).join(&layout.owner_issue_subdir),
        None => vault.join(&layout.issue_folder),
    }
}

/// One past the highest sequence among `*.md` files in `dir`; 1 when none.
///
/// # Errors
///
/// Returns `AppError::Io` if the folder cannot be listed.
pub fn next_sequence(dir: &Path) -> Result<u32> {
    let pattern = format!(
        "{}/*.md",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let entries =
        glob::glob(&pattern).map_err(|err| AppError::Io(format!("bad issue pattern: {err}")))?;

    let highest = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|path| {
            path.file_stem()
                .and_then(|stem| extract_issue_index(&stem.to_string_lossy()))
        })
        .max();
    Ok(highest.map_or(1, |max| max.saturating_add(1)))
}

/// Save `text` as the next issue for `source_rel`.
///
/// # Errors
///
/// Returns `AppError::Io` if the folder cannot be created or listed, the
/// content cannot be written, or no free name is found within
/// [`MAX_NAME_ATTEMPTS`].
pub fn save_issue(
    vault: &Path,
    source_rel: &str,
    text: &str,
    layout: &IssueLayout,
) -> Result<SavedIssue> {
    let dir = issue_dir_for(vault, source_rel, layout);
    std::fs::create_dir_all(&dir).map_err(|err| {
        AppError::Io(format!(
            "failed to create issue folder {}: {err}",
            dir.display()
        ))
    })?;

    let folder_source = owner_of(source_rel)
        .or_else(|| dir.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "issue".into());
    let folder_token = sanitize_token(&folder_source, "issue");

    let stem = Path::new(source_rel)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title = extract_title(text, &stem);
    let title_token = sanitize_token(&title, if stem.is_empty() { "untitled" } else { stem.as_str() });

    let mut tmp = NamedTempFile::new_in(&dir)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(text.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;

    let mut sequence = next_sequence(&dir)?;
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = format!("{folder_token}_{sequence:03}_{title_token}.md");
        let target = dir.join(&name);
        match tmp.persist_noclobber(&target) {
            Ok(_) => {
                let saved_path = relative_slash_path(vault, &target);
                info!(saved_path = %saved_path, "issue saved");
                return Ok(SavedIssue { saved_path, name });
            }
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                debug!(name = %name, "issue name taken, bumping sequence");
                tmp = err.file;
                sequence = sequence.saturating_add(1);
            }
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to persist issue to {}: {}",
                    target.display(),
                    err.error
                )));
            }
        }
    }

    Err(AppError::Io(format!(
        "no free issue name in {} after {MAX_NAME_ATTEMPTS} attempts",
        dir.display()
    )))
}

fn relative_slash_path(vault: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(vault).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
