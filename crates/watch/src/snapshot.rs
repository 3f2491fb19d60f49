//! One consistent read of the watched files

use crate::error::{Result, WatchError};
use crate::fingerprint::{Fingerprint, FingerprintPair, Fingerprinter};
use crate::resolver::resolve_rule_files;
use config::{config_dir, RuleSource};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of reading the configuration file and every rule file it references
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Rule files in the order they were hashed
    pub rule_files: Vec<PathBuf>,
    pub fingerprints: FingerprintPair,
}

/// Read and fingerprint the configuration file and its rule files.
///
/// Any failure discards the whole snapshot; a rule file that vanishes between
/// resolution and reading is an error, not a skip.
pub async fn take_snapshot(config_file: &Path, source: &dyn RuleSource) -> Result<Snapshot> {
    let raw = tokio::fs::read(config_file)
        .await
        .map_err(|source| WatchError::ConfigRead {
            path: config_file.to_path_buf(),
            source,
        })?;

    let config = Fingerprint::of(&raw);
    debug!(fingerprint = %config, "Config fingerprint");

    let patterns = source
        .rule_patterns(&raw)
        .map_err(|source| WatchError::ConfigParse {
            path: config_file.to_path_buf(),
            source,
        })?;

    let rule_files = resolve_rule_files(&patterns, config_dir(config_file))?;
    debug!(rule_files = ?rule_files, "Resolved rule files");

    let mut fp = Fingerprinter::new();
    for path in &rule_files {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|source| WatchError::RuleFileRead {
                path: path.clone(),
                source,
            })?;
        fp.update(&contents);
    }
    let rules = fp.finish();
    debug!(fingerprint = %rules, "Rules fingerprint");

    Ok(Snapshot {
        rule_files,
        fingerprints: FingerprintPair { config, rules },
    })
}
