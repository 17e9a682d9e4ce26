//! Issue file naming: sequence extraction, title detection and sanitizing.

use std::sync::OnceLock;

use regex::Regex;

/// Longest filename token produced by [`sanitize_token`], in characters.
pub const MAX_TOKEN_CHARS: usize = 80;

/// Lines searched for a `title:` key inside leading frontmatter.
const FRONTMATTER_SCAN_LINES: usize = 120;

/// Sequence patterns tried in order: `folder_001_title`, then legacy `CODE-001_title`.
const INDEX_PATTERNS: [&str; 2] = [r"^[^_]+_(\d+)_", r"^[^-]+-(\d+)_"];

fn index_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        INDEX_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn title_key() -> Option<&'static Regex> {
    static TITLE: OnceLock<Option<Regex>> = OnceLock::new();
    TITLE
        .get_or_init(|| Regex::new(r"(?i)^\s*title\s*:\s*(.+?)\s*$").ok())
        .as_ref()
}

fn forbidden_chars() -> Option<&'static Regex> {
    static FORBIDDEN: OnceLock<Option<Regex>> = OnceLock::new();
    FORBIDDEN
        .get_or_init(|| Regex::new(r#"[\\/:*?"<>|]+"#).ok())
        .as_ref()
}

/// Sequence number embedded in an issue file stem.
///
/// The first pattern that matches decides; a match whose digits overflow
/// yields `None` rather than falling through to the next pattern.
#[must_use]
pub fn extract_issue_index(stem: &str) -> Option<u32> {
    index_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(stem))
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Title of a generated document.
///
/// Looks for `title:` in a leading `---` frontmatter block, then for the
/// first Markdown heading, and falls back to `fallback`.
#[must_use]
pub fn extract_title(text: &str, fallback: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return fallback.to_owned();
    }
    let lines: Vec<&str> = text.lines().collect();

    if lines.first().is_some_and(|line| line.trim() == "---") {
        let end = lines.len().min(FRONTMATTER_SCAN_LINES);
        for line in lines.get(1..end).unwrap_or_default() {
            if line.trim() == "---" {
                break;
            }
            let Some(caps) = title_key().and_then(|re| re.captures(line)) else {
                continue;
            };
            let value = caps
                .get(1)
                .map_or("", |m| m.as_str())
                .trim()
                .trim_matches(|c| c == '"' || c == '\'');
            if !value.is_empty() {
                return value.to_owned();
            }
        }
    }

    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim())
        .find(|value| !value.is_empty())
        .map_or_else(|| fallback.to_owned(), str::to_owned)
}

/// Turn `value` into a filesystem-safe filename token.
///
/// Removes `\ / : * ? " < > |`, joins whitespace runs with a single `_`,
/// collapses repeated `_`, trims `.` and `_` from both ends and caps the
/// result at [`MAX_TOKEN_CHARS`]. Empty input or output yields `fallback`.
#[must_use]
pub fn sanitize_token(value: &str, fallback: &str) -> String {
    let raw = match value.trim() {
        "" => fallback,
        trimmed => trimmed,
    };

    let stripped = match forbidden_chars() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_owned(),
    };
    let joined = stripped.split_whitespace().collect::<Vec<_>>().join("_");
    let collapsed = joined
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let cleaned = collapsed.trim_matches(|c| c == '.' || c == '_');

    let token = if cleaned.is_empty() { fallback } else { cleaned };
    token.chars().take(MAX_TOKEN_CHARS).collect()
}
