//! Vault snapshot for the auto-watch loop.

use std::collections::BTreeSet;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::config::WatchConfig;

/// Which files a scan reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRules {
    excluded_dirs: BTreeSet<String>,
    extensions: BTreeSet<String>,
}

impl ScanRules {
    /// Rules from explicit lists; names and extensions match case-insensitively.
    #[must_use]
    pub fn new<D, E>(excluded_dirs: D, extensions: E) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            excluded_dirs: excluded_dirs
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Configured rules plus the flat issue folder, so generated issues are
    /// never picked up as new sources.
    #[must_use]
    pub fn from_config(watch: &WatchConfig, issue_folder: &str) -> Self {
        Self::new(
            watch
                .excluded_dirs
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(issue_folder)),
            &watch.extensions,
        )
    }

    fn is_excluded_dir(&self, name: &str) -> bool {
        name.starts_with('.') || self.excluded_dirs.contains(&name.to_lowercase())
    }

    fn accepts_file(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
    }
}

/// Eligible files under `root`, as `/`-joined root-relative paths.
///
/// Hidden and excluded directories are pruned before descending; hidden
/// files are skipped. A missing or non-directory root yields an empty set.
#[must_use]
pub fn scan_candidates(root: &Path, rules: &ScanRules) -> BTreeSet<String> {
    if !root.is_dir() {
        return BTreeSet::new();
    }

    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_pruned_dir(entry, rules))
        .filter_map(std::result::Result::ok)
        .filter(|entry| !entry.file_type().is_dir() && entry.path().is_file())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .filter(|entry| rules.accepts_file(entry.path()))
        .filter_map(|entry| relative_key(root, entry.path(), rules))
        .collect()
}

fn is_pruned_dir(entry: &DirEntry, rules: &ScanRules) -> bool {
    entry.file_type().is_dir() && rules.is_excluded_dir(&entry.file_name().to_string_lossy())
}

fn relative_key(root: &Path, path: &Path, rules: &ScanRules) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    let (_, ancestors) = parts.split_last()?;
    if ancestors.iter().any(|dir| rules.is_excluded_dir(dir)) {
        return None;
    }
    Some(parts.join("/"))
}
