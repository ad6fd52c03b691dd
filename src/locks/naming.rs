//! Mapping of caller-supplied lock names to lock file names.

use regex::Regex;
use std::sync::LazyLock;

/// Longest sanitized name kept in a lock file name.
pub const MAX_NAME_LEN: usize = 128;

/// Extension of lock files inside the lock directory.
pub const LOCK_EXTENSION: &str = "lock";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("Invalid lock name regex"));

/// Reduce `name` to a token that is safe as a file name.
///
/// Runs of characters other than ASCII letters, digits, `.`, `_` and `-` become a
/// single `_`, leading dots are dropped, and the result is capped at
/// [`MAX_NAME_LEN`] characters. Path separators can therefore never survive.
pub fn sanitize_name(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let safe: String = replaced
        .trim_start_matches('.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();

    if safe.is_empty() {
        "_".to_string()
    } else {
        safe
    }
}

/// File name of the lock for `name`, e.g. `db_migrate.lock`.
pub fn lock_file_name(name: &str) -> String {
    format!("{}.{}", sanitize_name(name), LOCK_EXTENSION)
}
