//! Rule-file pattern extraction from the watched configuration

use crate::settings::ConfigError;
use serde::Deserialize;
use tracing::debug;

/// Pulls rule-file patterns out of a raw configuration file.
///
/// Patterns come back in the order they appear in the file. Each may be a
/// literal path or a glob, relative or absolute.
pub trait RuleSource: Send + Sync {
    /// Extract the rule-file patterns from the raw file contents
    fn rule_patterns(&self, raw: &[u8]) -> Result<Vec<String>, ConfigError>;

    /// Short name of the configuration format, for logs
    fn name(&self) -> &'static str;
}

/// The subset of a Prometheus configuration we care about
#[derive(Debug, Default, Deserialize)]
struct PrometheusSubset {
    #[serde(default)]
    rule_files: Option<Vec<String>>,
}

/// Reads `rule_files` from a Prometheus YAML configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusRules;

impl RuleSource for PrometheusRules {
    fn rule_patterns(&self, raw: &[u8]) -> Result<Vec<String>, ConfigError> {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }

        let subset: Option<PrometheusSubset> = serde_yaml::from_slice(raw)?;
        let patterns = subset.and_then(|s| s.rule_files).unwrap_or_default();
        debug!(patterns = ?patterns, "Parsed rule_files");
        Ok(patterns)
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}
