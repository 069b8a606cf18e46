//! social-send - Background daemon for scheduled publishing
//!
//! Sweeps the schedule table at a fixed interval and publishes every post
//! whose time has come. Each claimed schedule is dispatched in the
//! background, so a post waiting out a retry does not hold up the next
//! poll. Several instances may share one database; claims keep them from
//! publishing the same target twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use libsocialcast::logging::{LogFormat, LoggingConfig};
use libsocialcast::engine::{DispatchPool, DispatchReport};
use libsocialcast::{Config, EngineConfig, ScheduleEngine, SocialcastError, SweepReport};
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "social-send")]
#[command(version)]
#[command(about = "Background daemon that publishes scheduled posts")]
#[command(long_about = "\
social-send - Background daemon for scheduled publishing

DESCRIPTION:
    social-send is a long-running daemon that watches the socialcast
    schedule table and publishes each post when its time comes.

    Every poll promotes pending schedules that are due, claims them,
    and publishes each target through its platform publisher in the
    background. Transient failures are retried with backoff; a platform
    that keeps failing is skipped by its circuit breaker until it
    recovers.

USAGE:
    # Run in foreground (logs to stderr)
    social-send

    # Sweep every 15 seconds
    social-send --poll-interval 15

    # One sweep, print the report as JSON, exit
    social-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes running dispatches)

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    (override with SOCIALCAST_CONFIG)

    [scheduling]
    poll_interval = 60              # seconds between polls
    max_concurrent_publishes = 8    # platform calls in flight at once
    claim_lease_secs = 300          # abandoned claims expire after this

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_name = "FORMAT", env = "SOCIALCAST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Worker identity recorded in claims (defaults to a random id)
    #[arg(long, value_name = "ID")]
    worker_id: Option<String>,

    /// Sweep once, print the report and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, "info".to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let mut engine_config = EngineConfig::from_scheduling(&config.scheduling);
    if let Some(worker_id) = cli.worker_id {
        engine_config = engine_config.with_worker_id(worker_id);
    }

    let engine = Arc::new(ScheduleEngine::from_config_as(&config, engine_config).await?);

    info!(
        "social-send starting as {} with {}",
        engine.config().worker_id,
        engine.registry().platforms().join(", ")
    );

    if cli.once {
        let report = engine.sweep(chrono::Utc::now()).await?;
        log_sweep(&report);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduling.poll_interval).max(1);
    info!("Poll interval: {}s", poll_interval);

    run_daemon_loop(DispatchPool::new(engine), poll_interval, shutdown).await;

    info!("social-send stopped");
    Ok(())
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<SocialcastError>() {
        Some(SocialcastError::Config(_)) => 2,
        _ => 1,
    }
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping after running dispatches...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping after running dispatches...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}

async fn run_daemon_loop(
    mut pool: DispatchPool,
    poll_interval: u64,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match pool.tick(chrono::Utc::now()).await {
            Ok(report) => log_finished(&report.finished),
            Err(e) => error!("Poll failed: {}", e),
        }

        // Sleep until next poll (check shutdown every second)
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    if pool.in_flight() > 0 {
        info!("Waiting for {} running dispatch(es)", pool.in_flight());
    }
    log_finished(&pool.drain().await);
}

fn log_sweep(report: &SweepReport) {
    log_finished(&report.dispatches);
    if report.skipped > 0 {
        info!("{} schedule(s) were claimed by another worker", report.skipped);
    }
}

fn log_finished(dispatches: &[DispatchReport]) {
    if dispatches.is_empty() {
        return;
    }

    let published: usize = dispatches.iter().map(|d| d.published()).sum();
    let failed: usize = dispatches.iter().map(|d| d.failed()).sum();
    info!(
        "Finished {} dispatch(es): {} target(s) published, {} failed",
        dispatches.len(),
        published,
        failed
    );
}
