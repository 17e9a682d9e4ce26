//! Context block handed to the agent alongside a vault document.

use std::path::Path;

use tracing::warn;

use crate::issue::writer::{owner_of, IssueLayout};

/// Vault-relative location of the issue template.
pub const TEMPLATE_PATH: &str = "_Templates/Template_Issue.md";

/// Describe `file_path` for the agent.
///
/// The block lists the file and its owner folder, inlines the issue
/// template when the vault has one, and lists the owner's existing issues
/// so the agent can follow their naming.
#[must_use]
pub fn build_context(vault: &Path, file_path: &str, layout: &IssueLayout) -> String {
    let owner = owner_of(file_path);
    let mut parts = vec![format!(
        "[File]\n- Path: {file_path}\n- Owner folder: {}",
        owner.as_deref().unwrap_or("(vault root)")
    )];

    let template = vault.join(TEMPLATE_PATH);
    if template.is_file() {
        match std::fs::read(&template) {
            Ok(bytes) => parts.push(format!(
                "[Issue template, follow this format]\n{}",
                String::from_utf8_lossy(&bytes)
            )),
            Err(err) => warn!(path = %template.display(), %err, "issue template unreadable"),
        }
    }

    if let Some(owner) = owner {
        let subdir = &layout.owner_issue_subdir;
        let issues_dir = vault.join(&owner).join(subdir);
        if issues_dir.is_dir() {
            let names = list_markdown(&issues_dir);
            if names.is_empty() {
                parts.push(format!(
                    "[{owner}/{subdir}/]: empty (this is the first issue, use 001)"
                ));
            } else {
                let listing = names
                    .iter()
                    .map(|name| format!("- {name}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                parts.push(format!(
                    "[Existing files in {owner}/{subdir}/, follow their naming]\n{listing}"
                ));
            }
        }
    }

    parts.join("\n\n")
}

fn list_markdown(dir: &Path) -> Vec<String> {
    let pattern = format!("{}/*.md", glob::Pattern::escape(&dir.to_string_lossy()));
    let Ok(entries) = glob::glob(&pattern) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}
