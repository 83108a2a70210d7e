// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Flockwatch - Surveillance-Emitter Detection Engine
//!
//! Headless runner: loads the configuration, starts one supervised scanner per
//! radio domain and logs anomalies and scanner health until Ctrl+C.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use flockwatch::sensors::ScanLoopState;
use flockwatch::{Config, Domain, Engine, ThreatLevel, VERSION};

/// Flockwatch - Surveillance-Emitter Detection Engine
#[derive(Parser, Debug)]
#[command(name = "flockwatch")]
#[command(author = "Flockwatch Project")]
#[command(version = VERSION)]
#[command(about = "Detects IMSI catchers, GNSS spoofers, trackers and rogue access points")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated sensors
    #[arg(long)]
    demo: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Flockwatch v{} - Surveillance-Emitter Detection Engine", VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config, args.duration_secs.map(Duration::from_secs)))
}

/// Run until Ctrl+C or the requested duration elapses
async fn run_headless(config: Config, duration: Option<Duration>) -> Result<()> {
    let demo_mode = config.demo_mode;
    let mut engine = Engine::new(config).await?;
    engine.start().await?;

    if demo_mode {
        register_demo_sensors(&engine)?;
    } else {
        warn!("No radio drivers are built in; run with --demo to use simulated sensors");
    }

    let mut anomalies = engine.subscribe_anomalies();
    let anomaly_log = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match anomalies.recv().await {
                Ok(anomaly) => {
                    let json = serde_json::to_string(&anomaly).unwrap_or_default();
                    if anomaly.severity >= ThreatLevel::High {
                        warn!("[{}] {}: {} {}", anomaly.severity, anomaly.anomaly_type, anomaly.description, json);
                    } else {
                        info!("[{}] {}: {} {}", anomaly.severity, anomaly.anomaly_type, anomaly.description, json);
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Anomaly log lagged, {} anomalies skipped", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut health = engine.subscribe_health();
    let health_log = tokio::spawn(async move {
        let mut last: BTreeMap<Domain, ScanLoopState> = BTreeMap::new();
        while health.changed().await.is_ok() {
            let snapshot = health.borrow_and_update().clone();
            for (domain, status) in snapshot.iter() {
                if last.insert(*domain, status.state) == Some(status.state) {
                    continue;
                }
                match status.state {
                    ScanLoopState::Failed | ScanLoopState::Stalled => error!(
                        "{} scanner {:?} (failures: {}, restarts: {}, last error: {})",
                        domain,
                        status.state,
                        status.consecutive_failures,
                        status.restart_count,
                        status.last_error.as_deref().unwrap_or("none")
                    ),
                    state => info!("{} scanner {:?}", domain, state),
                }
            }
        }
    });

    info!("Flockwatch running in headless mode");
    info!("   Press Ctrl+C to shutdown");

    match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = tokio::time::sleep(duration) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutdown signal received, cleaning up...");
    let state = engine.state().await;
    engine.stop().await?;
    anomaly_log.abort();
    health_log.abort();

    info!(
        "Flockwatch shutdown complete: {} anomalies, {} readings dropped, health {:.0}%, up {} s",
        state.anomalies_detected, state.readings_dropped, state.health_score, state.uptime_seconds
    );
    Ok(())
}

#[cfg(feature = "simulator")]
fn register_demo_sensors(engine: &Engine) -> Result<()> {
    engine.register_simulated_sensors()?;
    info!("Simulated sensors registered");
    Ok(())
}

#[cfg(not(feature = "simulator"))]
fn register_demo_sensors(_engine: &Engine) -> Result<()> {
    anyhow::bail!("Simulator feature not enabled. Build with --features simulator");
}
