//! Vault path validation and symlink-escape detection.
//!
//! Every user-supplied path is resolved against the vault root before it is
//! read. `..` traversal above the root, absolute paths, and symlinks whose
//! target leaves the vault are rejected.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Resolve vault-relative `candidate` to an absolute path inside `vault`.
///
/// Returns the canonical path when the target exists, otherwise the
/// normalized join.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - The vault root cannot be canonicalized.
/// - The candidate is absolute or climbs above the vault with `..`.
/// - The existing target resolves (through symlinks) outside the vault.
pub fn resolve_in_vault(vault: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = vault
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("vault root invalid: {err}")))?;

    let mut normalized = PathBuf::new();
    for component in candidate.as_ref().components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(
                        "path attempts to escape the vault".into(),
                    ));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::PathViolation(
                    "absolute paths are not accepted".into(),
                ));
            }
        }
    }

    let joined = root.join(normalized);
    if !joined.exists() {
        return Ok(joined);
    }

    let canonical = joined
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
    if !canonical.starts_with(&root) {
        return Err(AppError::PathViolation(
            "symlink target escapes the vault".into(),
        ));
    }
    Ok(canonical)
}
