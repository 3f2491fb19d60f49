//! Polling watch loop
//!
//! Re-reads the configuration and its rule files on every tick and asks the
//! server to reload when their fingerprints move. The observed fingerprints
//! only advance after a reload succeeds, so a failed reload is attempted
//! again on the next tick instead of being forgotten.

use crate::error::Result;
use crate::fingerprint::FingerprintPair;
use crate::shutdown::shutdown_requested;
use crate::snapshot::take_snapshot;
use crate::trigger::Reload;
use config::{InitialFailurePolicy, RuleSource, WatchTarget};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What a single apply cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First observation; recorded as the baseline without reloading
    Seeded,
    /// Nothing changed since the last confirmed observation
    Unchanged,
    /// A change was detected and the server accepted the reload
    Reloaded,
}

/// Watches a configuration file and its rule files for changes
pub struct Watcher {
    target: WatchTarget,
    source: Arc<dyn RuleSource>,
    trigger: Arc<dyn Reload>,
    initial_failure: InitialFailurePolicy,
    observed: Option<FingerprintPair>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Watcher {
    /// Create a new watcher
    pub fn new(
        target: WatchTarget,
        source: Arc<dyn RuleSource>,
        trigger: Arc<dyn Reload>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            target,
            source,
            trigger,
            initial_failure: InitialFailurePolicy::default(),
            observed: None,
            shutdown_rx,
        }
    }

    /// Set what happens when the very first cycle fails
    pub fn with_initial_failure(mut self, policy: InitialFailurePolicy) -> Self {
        self.initial_failure = policy;
        self
    }

    /// Last confirmed fingerprints, `None` until the first successful cycle
    pub fn observed(&self) -> Option<FingerprintPair> {
        self.observed
    }

    /// Run one detection cycle.
    ///
    /// Errors leave the observed fingerprints untouched.
    pub async fn apply(&mut self) -> Result<ApplyOutcome> {
        let snapshot = take_snapshot(&self.target.config_file, self.source.as_ref()).await?;
        let current = snapshot.fingerprints;

        let Some(previous) = self.observed else {
            info!(
                config = %current.config,
                rules = %current.rules,
                rule_files = snapshot.rule_files.len(),
                "Recorded initial fingerprints"
            );
            self.observed = Some(current);
            return Ok(ApplyOutcome::Seeded);
        };

        if previous == current {
            debug!("No config changes detected");
            return Ok(ApplyOutcome::Unchanged);
        }

        info!(
            config_changed = previous.config != current.config,
            rules_changed = previous.rules != current.rules,
            rule_files = snapshot.rule_files.len(),
            "Config change detected, reloading"
        );

        self.trigger.reload(self.shutdown_rx.clone()).await?;

        self.observed = Some(current);
        info!("Reload succeeded");
        Ok(ApplyOutcome::Reloaded)
    }

    /// Apply immediately, then once per interval until shutdown.
    ///
    /// Only a failure of the first cycle can end the loop with an error, and
    /// only under [`InitialFailurePolicy::Exit`].
    pub async fn run(mut self) -> Result<()> {
        info!(
            config_file = ?self.target.config_file,
            reload_url = %self.target.reload_url,
            interval = ?self.target.interval,
            format = self.source.name(),
            "Watching configuration for changes"
        );

        if let Err(e) = self.apply().await {
            if *self.shutdown_rx.borrow() {
                info!("Watcher shutting down");
                return Ok(());
            }
            match self.initial_failure {
                InitialFailurePolicy::Exit => return Err(e),
                InitialFailurePolicy::Continue => {
                    warn!(error = %e, "Initial apply failed, will retry on next tick");
                }
            }
        }

        let mut ticker = interval(self.target.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial apply already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown_rx) => {
                    info!("Watcher shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.apply().await {
                Err(e) if e.is_reload_failure() => {
                    warn!(error = %e, "Reload failed, will retry on next tick");
                }
                Err(e) => error!(error = %e, "Apply failed"),
                Ok(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransportError, WatchError};
    use crate::shutdown::shutdown_channel;
    use async_trait::async_trait;
    use config::PrometheusRules;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records calls and replays scripted results; succeeds once the script runs out.
    #[derive(Default)]
    struct ScriptedTrigger {
        calls: AtomicUsize,
        script: Mutex<VecDeque<bool>>,
    }

    impl ScriptedTrigger {
        fn failing_then_ok(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(std::iter::repeat(false).take(failures).collect()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Reload for ScriptedTrigger {
        async fn reload(&self, _shutdown: watch::Receiver<bool>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(WatchError::ReloadRejected { status: 503 })
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        config: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = dir.path().join("prometheus.yml");
            fs::write(&config, "rule_files:\n  - rules/*.yml\n").unwrap();
            fs::create_dir(dir.path().join("rules")).unwrap();
            fs::write(dir.path().join("rules/a.yml"), "groups: [a]\n").unwrap();
            fs::write(dir.path().join("rules/b.yml"), "groups: [b]\n").unwrap();
            Self { dir, config }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn watcher(
            &self,
            trigger: Arc<ScriptedTrigger>,
            shutdown_rx: watch::Receiver<bool>,
        ) -> Watcher {
            let target = WatchTarget {
                config_file: self.config.clone(),
                reload_url: "http://127.0.0.1:9090/-/reload".to_string(),
                interval: Duration::from_millis(20),
            };
            Watcher::new(target, Arc::new(PrometheusRules), trigger, shutdown_rx)
        }
    }

    fn touch(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_first_apply_seeds_without_reload() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        assert!(watcher.observed().is_none());
        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Seeded);
        assert!(watcher.observed().is_some());
        assert_eq!(trigger.calls(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_files_do_not_reload() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        watcher.apply().await.unwrap();
        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(trigger.calls(), 0);
    }

    #[tokio::test]
    async fn test_rule_change_reloads_once() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        watcher.apply().await.unwrap();
        let seeded = watcher.observed().unwrap();

        touch(&fixture.path("rules/b.yml"), "groups: [b, c]\n");
        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Reloaded);
        assert_eq!(trigger.calls(), 1);

        let updated = watcher.observed().unwrap();
        assert_eq!(updated.config, seeded.config);
        assert_ne!(updated.rules, seeded.rules);

        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(trigger.calls(), 1);
    }

    #[tokio::test]
    async fn test_config_change_reloads() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        watcher.apply().await.unwrap();
        touch(
            &fixture.config,
            "global:\n  scrape_interval: 30s\nrule_files:\n  - rules/*.yml\n",
        );

        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Reloaded);
        assert_eq!(trigger.calls(), 1);
    }

    #[tokio::test]
    async fn test_new_rule_pattern_is_picked_up() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        watcher.apply().await.unwrap();

        fs::create_dir(fixture.path("alerts")).unwrap();
        touch(&fixture.path("alerts/page.yml"), "groups: [page]\n");
        touch(
            &fixture.config,
            "rule_files:\n  - rules/*.yml\n  - alerts/*.yml\n",
        );
        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Reloaded);

        // Only the newly referenced file changes now.
        touch(&fixture.path("alerts/page.yml"), "groups: [page, ticket]\n");
        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Reloaded);
        assert_eq!(trigger.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_is_retried() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::failing_then_ok(1));
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        watcher.apply().await.unwrap();
        let seeded = watcher.observed();

        touch(&fixture.path("rules/b.yml"), "groups: [b, c]\n");
        let err = watcher.apply().await.unwrap_err();
        assert!(matches!(err, WatchError::ReloadRejected { status: 503 }));
        assert_eq!(watcher.observed(), seeded);
        assert_eq!(trigger.calls(), 1);

        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Reloaded);
        assert_eq!(trigger.calls(), 2);

        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(trigger.calls(), 2);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_state() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        watcher.apply().await.unwrap();
        let seeded = watcher.observed();

        // A directory matched by the glob cannot be read as a rule file.
        fs::create_dir(fixture.path("rules/c.yml")).unwrap();
        let err = watcher.apply().await.unwrap_err();
        assert!(matches!(err, WatchError::RuleFileRead { .. }));
        assert_eq!(watcher.observed(), seeded);
        assert_eq!(trigger.calls(), 0);

        fs::remove_dir(fixture.path("rules/c.yml")).unwrap();
        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_failed_first_apply_stays_unseeded() {
        let fixture = Fixture::new();
        touch(&fixture.config, "rule_files: [\n");
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();
        let mut watcher = fixture.watcher(trigger.clone(), rx);

        assert!(matches!(
            watcher.apply().await,
            Err(WatchError::ConfigParse { .. })
        ));
        assert!(watcher.observed().is_none());

        touch(&fixture.config, "rule_files:\n  - rules/*.yml\n");
        assert_eq!(watcher.apply().await.unwrap(), ApplyOutcome::Seeded);
        assert_eq!(trigger.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_exits_on_initial_failure() {
        let fixture = Fixture::new();
        fs::remove_file(&fixture.config).unwrap();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (_tx, rx) = shutdown_channel();

        let result = fixture.watcher(trigger, rx).run().await;
        assert!(matches!(result, Err(WatchError::ConfigRead { .. })));
    }

    #[tokio::test]
    async fn test_run_continues_after_initial_failure() {
        let fixture = Fixture::new();
        fs::remove_file(&fixture.config).unwrap();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (tx, rx) = shutdown_channel();

        let watcher = fixture
            .watcher(trigger.clone(), rx)
            .with_initial_failure(InitialFailurePolicy::Continue);
        let handle = tokio::spawn(watcher.run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should stop promptly")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(trigger.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_reloads_on_tick_and_stops() {
        let fixture = Fixture::new();
        let trigger = Arc::new(ScriptedTrigger::default());
        let (tx, rx) = shutdown_channel();

        let handle = tokio::spawn(fixture.watcher(trigger.clone(), rx).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(trigger.calls(), 0);

        touch(&fixture.path("rules/a.yml"), "groups: [a, z]\n");
        let mut waited = Duration::ZERO;
        while trigger.calls() == 0 && waited < Duration::from_secs(2) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }
        assert_eq!(trigger.calls(), 1);

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should stop promptly")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(trigger.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_reload_keeps_state() {
        struct CancelledTrigger;

        #[async_trait]
        impl Reload for CancelledTrigger {
            async fn reload(&self, _shutdown: watch::Receiver<bool>) -> Result<()> {
                Err(WatchError::Transport {
                    url: "http://127.0.0.1:9090/-/reload".to_string(),
                    source: TransportError::Cancelled,
                })
            }
        }

        let fixture = Fixture::new();
        let (_tx, rx) = shutdown_channel();
        let target = WatchTarget {
            config_file: fixture.config.clone(),
            reload_url: "http://127.0.0.1:9090/-/reload".to_string(),
            interval: Duration::from_secs(10),
        };
        let mut watcher = Watcher::new(
            target,
            Arc::new(PrometheusRules),
            Arc::new(CancelledTrigger),
            rx,
        );

        watcher.apply().await.unwrap();
        let seeded = watcher.observed();

        touch(&fixture.path("rules/a.yml"), "groups: []\n");
        assert!(watcher.apply().await.is_err());
        assert_eq!(watcher.observed(), seeded);
    }
}
