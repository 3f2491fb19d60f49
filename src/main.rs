//! reloader: a Prometheus config reload sidecar
//!
//! Polls the Prometheus configuration and the rule files it references and
//! calls the reload endpoint whenever their contents change, so Prometheus
//! itself does not need to watch files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{InitialFailurePolicy, PrometheusRules, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use watch::{shutdown_channel, take_snapshot, HttpReloadTrigger, Watcher};

const GIT_HASH: &str = match option_env!("RELOADER_GIT_HASH") {
    Some(hash) => hash,
    None => "N/A",
};

#[derive(Parser)]
#[command(name = "reloader")]
#[command(author, version, about = "Reloads Prometheus when its config or rule files change")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file (TOML); flags override its values
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Prometheus configuration file path
    #[arg(short = 'c', long, global = true)]
    config_file: Option<PathBuf>,

    /// Prometheus reload endpoint
    #[arg(short = 'u', long, global = true)]
    reload_url: Option<String>,

    /// Interval for watching config and rule files for changes (e.g. 10s)
    #[arg(short = 'i', long, global = true)]
    watch_interval: Option<String>,

    /// Timeout for a single reload request (e.g. 30s)
    #[arg(long, global = true)]
    request_timeout: Option<String>,

    /// Keep polling when the very first check fails instead of exiting
    #[arg(long, global = true)]
    keep_going: bool,

    /// Log level
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for changes and trigger reloads
    Run,
    /// Resolve rule files once, print their fingerprints and exit
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    // Setup logging
    let level = match settings.global.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match cli.command {
        Some(Commands::Validate) => rt.block_on(validate(settings)),
        Some(Commands::Run) | None => rt.block_on(run(settings)),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => Settings::default(),
    };

    if let Some(config_file) = &cli.config_file {
        settings.watch.config_file = config_file.clone();
    }
    if let Some(reload_url) = &cli.reload_url {
        settings.watch.reload_url = reload_url.clone();
    }
    if let Some(interval) = &cli.watch_interval {
        settings.watch.interval = interval.clone();
    }
    if let Some(timeout) = &cli.request_timeout {
        settings.watch.request_timeout = timeout.clone();
    }
    if cli.keep_going {
        settings.watch.on_initial_failure = InitialFailurePolicy::Continue;
    }
    if let Some(level) = &cli.log_level {
        settings.global.log_level = level.clone();
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

async fn run(settings: Settings) -> Result<()> {
    info!(
        "Starting reloader {} ({})",
        env!("CARGO_PKG_VERSION"),
        GIT_HASH
    );

    let target = settings.watch_target()?;
    let trigger = HttpReloadTrigger::new(target.reload_url.clone(), settings.request_timeout()?)
        .context("Failed to create reload client")?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    })
    .context("Failed to install signal handler")?;

    let watcher = Watcher::new(
        target,
        Arc::new(PrometheusRules),
        Arc::new(trigger),
        shutdown_rx,
    )
    .with_initial_failure(settings.watch.on_initial_failure);

    watcher
        .run()
        .await
        .context("Could not establish initial fingerprints")?;

    info!("Shutdown complete");
    Ok(())
}

async fn validate(settings: Settings) -> Result<()> {
    let target = settings.watch_target()?;
    let snapshot = take_snapshot(&target.config_file, &PrometheusRules)
        .await
        .with_context(|| format!("Failed to check {:?}", target.config_file))?;

    println!("Configuration is valid!");
    println!("  Config: {:?}", target.config_file);
    println!("  Config fingerprint: {}", snapshot.fingerprints.config);
    println!("  Rule files: {}", snapshot.rule_files.len());
    for path in &snapshot.rule_files {
        println!("    {}", path.display());
    }
    println!("  Rules fingerprint: {}", snapshot.fingerprints.rules);
    println!("  Reload URL: {}", target.reload_url);

    Ok(())
}
