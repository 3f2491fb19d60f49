//! Settings structures and parsing for reloader

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// What to watch and where to send reloads.
///
/// Built once at startup from [`Settings::watch_target`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    /// Primary configuration file
    pub config_file: PathBuf,
    /// Endpoint that receives an empty POST on every detected change
    pub reload_url: String,
    /// Poll interval
    pub interval: Duration,
}

/// Directory containing `config_file`, or `.` for a bare file name
pub fn config_dir(config_file: &Path) -> &Path {
    match config_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// What to do when the very first apply cycle fails.
///
/// A first-cycle failure means no baseline could be established at all, so
/// the default is to give up and let the supervisor restart us. Later cycles
/// are always retried on the next tick regardless of this policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialFailurePolicy {
    /// Stop the watch loop and return the error
    #[default]
    Exit,
    /// Log the error and keep polling
    Continue,
}

/// Root settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Global settings
    #[serde(default)]
    pub global: GlobalSettings,

    /// Watch settings
    #[serde(default)]
    pub watch: WatchSettings,
}

impl Settings {
    /// Load settings from a file.
    ///
    /// Values are not validated here; callers apply their overrides first and
    /// then call [`Settings::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.config_file.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "No configuration file to watch".to_string(),
            ));
        }

        let url = self.watch.reload_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "Reload URL '{}' must start with http:// or https://",
                self.watch.reload_url
            )));
        }

        self.interval()?;
        self.request_timeout()?;

        Ok(())
    }

    /// Poll interval
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_positive_duration("interval", &self.watch.interval)
    }

    /// Upper bound for a single reload request
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_positive_duration("request_timeout", &self.watch.request_timeout)
    }

    /// Build the immutable watch target
    pub fn watch_target(&self) -> Result<WatchTarget, ConfigError> {
        Ok(WatchTarget {
            config_file: self.watch.config_file.clone(),
            reload_url: self.watch.reload_url.trim().to_string(),
            interval: self.interval()?,
        })
    }
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Watch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Prometheus configuration file
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,

    /// Prometheus reload endpoint
    #[serde(default = "default_reload_url")]
    pub reload_url: String,

    /// How often to check config and rule files for changes (e.g. "10s")
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Timeout for a single reload request (e.g. "30s")
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Whether a failed first cycle stops the process
    #[serde(default)]
    pub on_initial_failure: InitialFailurePolicy,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            config_file: default_config_file(),
            reload_url: default_reload_url(),
            interval: default_interval(),
            request_timeout: default_request_timeout(),
            on_initial_failure: InitialFailurePolicy::default(),
        }
    }
}

fn default_config_file() -> PathBuf {
    PathBuf::from("/etc/prometheus/prometheus.yml")
}

fn default_reload_url() -> String {
    "http://127.0.0.1:9090/-/reload".to_string()
}

fn default_interval() -> String {
    "10s".to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

/// Parse a human duration such as "500ms", "10s", "5m", "1h" or bare seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(num) = s.strip_suffix("ms") {
        num.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(num) = s.strip_suffix('s') {
        num.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(num) = s.strip_suffix('m') {
        num.trim().parse::<u64>().ok().map(|n| Duration::from_secs(n * 60))
    } else if let Some(num) = s.strip_suffix('h') {
        num.trim().parse::<u64>().ok().map(|n| Duration::from_secs(n * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn parse_positive_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => Err(ConfigError::Validation(format!(
            "{} must be greater than zero",
            field
        ))),
        None => Err(ConfigError::Validation(format!(
            "Invalid duration for {}: '{}'",
            field, value
        ))),
    }
}
