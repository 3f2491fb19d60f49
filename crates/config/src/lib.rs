//! config: Settings and watched-config parsing for reloader
//!
//! This crate provides the sidecar's own settings (what to watch, where to
//! send reloads, how often to poll) and the capability to pull rule-file
//! patterns out of the watched configuration file.

pub mod rules;
pub mod settings;

pub use rules::{PrometheusRules, RuleSource};
pub use settings::*;
