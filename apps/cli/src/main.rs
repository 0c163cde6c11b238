//! `dbkeeper` entry point
//!
//! Loads the lock configuration, starts the lock manager with its expiry and
//! session sweepers, and logs the audit stream until interrupted.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dbkeeper_lock::{Admin, LockConfig, LockEvent, LockManager, ResourceSet};
use secrecy::SecretString;
use tokio::sync::broadcast::error::RecvError;

/// Exclusive leases on a pool of test databases
#[derive(Debug, Parser)]
#[command(name = "dbkeeper", version, about)]
struct Cli {
    /// JSON configuration file; built-in defaults are used when omitted
    #[arg(short, long, global = true, env = "DBKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Credential clients present on acquire and release (overrides the file)
    #[arg(long, global = true, env = "DBKEEPER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Admin dashboard password (overrides the file)
    #[arg(long, global = true, env = "DBKEEPER_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Log filter directive, e.g. `info` or `dbkeeper_lock=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true)]
    log_format: Option<dbkeeper_log::Format>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the lock manager until Ctrl-C (default)
    Serve,
    /// Print the resource identifiers with passwords redacted
    Resources,
    /// Validate the configuration and print it as JSON
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = dbkeeper_log::Config::from_env();
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    dbkeeper_log::init(log_config).context("failed to initialize logging")?;

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Resources => print_resources(&config),
        Command::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LockConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config_file(path)?,
        None => LockConfig::default(),
    };
    if let Some(key) = &cli.api_key {
        config.api_key = SecretString::from(key.clone());
    }
    if let Some(password) = &cli.admin_password {
        config.admin_password = SecretString::from(password.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn read_config_file(path: &Path) -> anyhow::Result<LockConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    // Validation runs after CLI overrides are applied.
    serde_json::from_str(&raw).with_context(|| format!("malformed config file {}", path.display()))
}

fn print_resources(config: &LockConfig) -> anyhow::Result<()> {
    let resources = ResourceSet::from_config(&config.database)?;
    for id in resources.iter() {
        println!("{}", id.redacted());
    }
    Ok(())
}

async fn serve(config: LockConfig) -> anyhow::Result<()> {
    let manager = LockManager::new(config)?;
    let admin = Admin::new(manager.clone());
    let lock_sweeper = manager.start_sweeper();
    let session_sweeper = admin.start();
    let audit = tokio::spawn(log_events(manager.clone()));

    tracing::info!(
        resources = manager.resources().len(),
        lock_ttl_secs = manager.config().lock_ttl.as_secs(),
        "dbkeeper started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutting down");
    manager.shutdown();
    lock_sweeper.join().await;
    session_sweeper.join().await;
    audit.abort();

    let stats = manager.stats();
    tracing::info!(
        held = stats.held,
        acquisitions = stats.total_acquisitions,
        releases = stats.total_releases,
        expired = stats.total_expired,
        forced = stats.total_forced,
        "dbkeeper stopped"
    );
    Ok(())
}

async fn log_events(manager: LockManager) {
    let mut rx = manager.events().subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "audit log lagged behind lock events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &LockEvent) {
    match event {
        LockEvent::Acquired { resource, owner } => {
            tracing::info!(target: "dbkeeper::audit", resource = %resource.redacted(), owner, "acquired");
        }
        LockEvent::Released {
            resource,
            owner,
            held_for,
        } => {
            tracing::info!(target: "dbkeeper::audit", resource = %resource.redacted(), owner, held_ms = held_for.as_millis() as u64, "released");
        }
        LockEvent::Expired {
            resource,
            owner,
            held_for,
        } => {
            tracing::warn!(target: "dbkeeper::audit", resource = %resource.redacted(), owner, held_ms = held_for.as_millis() as u64, "expired");
        }
        LockEvent::ForceReleased { resource, owner } => {
            tracing::warn!(target: "dbkeeper::audit", resource = %resource.redacted(), owner, "force released");
        }
        LockEvent::BulkReleased { owner, count } => {
            tracing::warn!(target: "dbkeeper::audit", owner, count, "bulk released");
        }
        LockEvent::SessionOpened => {
            tracing::info!(target: "dbkeeper::audit", "admin session opened");
        }
        LockEvent::SessionClosed { reason } => {
            tracing::info!(target: "dbkeeper::audit", ?reason, "admin session closed");
        }
    }
}
