//! Argv resolution for agent CLIs.

use std::path::Path;

use super::AgentProfile;

/// Build the argv for `profile` from a configured command string.
///
/// The string is split with POSIX shell quoting. When the binary is the
/// profile's canonical CLI and neither a batch flag nor a known subcommand
/// is present, the profile's default argument is inserted right after the
/// binary. Blank or unparsable input falls back to the bare binary.
#[must_use]
pub fn resolve_command(profile: &AgentProfile, configured: &str) -> Vec<String> {
    let text = configured.trim();
    let mut argv = if text.is_empty() {
        Vec::new()
    } else {
        shlex::split(text).unwrap_or_default()
    };
    if argv.is_empty() {
        argv.push(profile.binary.to_owned());
    }

    let has_batch_flag = argv[1..]
        .iter()
        .any(|token| profile.batch_flags.contains(&token.as_str()));
    let has_subcommand = argv
        .get(1)
        .is_some_and(|token| profile.subcommands.contains(&token.as_str()));

    if binary_name(&argv[0]) == profile.binary && !has_batch_flag && !has_subcommand {
        argv.insert(1, profile.default_arg.to_owned());
    }
    argv
}

/// Whether the user already controls sessions through `argv`.
#[must_use]
pub fn has_session_flags(profile: &AgentProfile, argv: &[String]) -> bool {
    argv.iter().skip(1).any(|token| {
        profile.session_flags.contains(&token.as_str())
            || profile
                .session_flag_prefixes
                .iter()
                .any(|prefix| token.starts_with(prefix))
    })
}

/// Lower-cased file name of the binary, e.g. `/usr/local/bin/Claude` → `claude`.
#[must_use]
pub fn binary_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map_or_else(|| program.to_owned(), |name| name.to_string_lossy().into_owned())
        .to_lowercase()
}

/// Render argv for logs, quoting tokens that need it.
#[must_use]
pub fn render_command(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}
