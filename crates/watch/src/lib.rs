//! watch: Change detection and reload triggering for reloader
//!
//! Polls a configuration file and the rule files it references, fingerprints
//! their contents, and POSTs to a reload endpoint whenever the fingerprints
//! move. The last seen fingerprints only advance once a reload succeeds, so a
//! failed reload is retried on the next tick.

pub mod error;
pub mod fingerprint;
pub mod resolver;
pub mod shutdown;
pub mod snapshot;
pub mod trigger;
pub mod watcher;

pub use error::{Result, TransportError, WatchError};
pub use fingerprint::{Fingerprint, FingerprintPair, Fingerprinter};
pub use resolver::resolve_rule_files;
pub use shutdown::{shutdown_channel, shutdown_requested};
pub use snapshot::{take_snapshot, Snapshot};
pub use trigger::{HttpReloadTrigger, Reload};
pub use watcher::{ApplyOutcome, Watcher};
