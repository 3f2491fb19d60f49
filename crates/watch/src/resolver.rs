//! Rule-file resolution
//!
//! Turns the patterns listed in the configuration into concrete paths.
//! Relative patterns are anchored at the configuration file's directory.

use crate::error::{Result, WatchError};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand rule-file patterns into an ordered list of files.
///
/// Pattern order is preserved. A pattern that matches nothing contributes
/// nothing; matches of a single pattern come back sorted by path.
pub fn resolve_rule_files(patterns: &[String], config_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let full = absolute_pattern(&collapse_recursive_wildcards(pattern), config_dir)?;

        let paths = glob::glob(&full).map_err(|e| WatchError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        let before = files.len();
        for entry in paths {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => {
                    debug!(pattern = %pattern, error = %e, "Skipping unreadable path");
                }
            }
        }

        debug!(pattern = %pattern, matches = files.len() - before, "Expanded rule file pattern");
    }

    Ok(files)
}

/// Prometheus matches rule files one path component at a time, where `**`
/// is just two `*`s. Collapse runs so the glob crate never recurses.
fn collapse_recursive_wildcards(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}

fn absolute_pattern(pattern: &str, config_dir: &Path) -> Result<String> {
    if Path::new(pattern).is_absolute() {
        return Ok(pattern.to_string());
    }

    // Only the user's pattern may contain wildcards.
    let dir = config_dir.to_str().ok_or_else(|| WatchError::Pattern {
        pattern: pattern.to_string(),
        reason: format!("config directory {:?} is not valid UTF-8", config_dir),
    })?;

    let joined = PathBuf::from(Pattern::escape(dir)).join(pattern);
    joined
        .into_os_string()
        .into_string()
        .map_err(|_| WatchError::Pattern {
            pattern: pattern.to_string(),
            reason: "resolved path is not valid UTF-8".to_string(),
        })
}
