// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Scanner supervisor - owns the scan loops, restarts them, reports health

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::health::{health_score, HealthBoard, HealthSnapshot, ScanLoopState};
use super::scan_loop::ScanLoop;
use super::{Domain, SensorSource};
use crate::core::{Clock, EventBus};

/// Supervisor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Consecutive failures before a loop is unhealthy and restarted
    pub failure_threshold: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Silence longer than `stall_factor` poll intervals flags a stall
    pub stall_factor: u32,
    /// Sensor call timeout as a multiple of the poll interval
    pub timeout_factor: u32,
    /// `None` restarts forever
    pub max_restarts: Option<u32>,
    pub watchdog_interval_ms: u64,
    /// Health score weight per domain name, default 1.0
    pub weights: BTreeMap<String, f64>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            stall_factor: 3,
            timeout_factor: 2,
            max_restarts: None,
            watchdog_interval_ms: 500,
            weights: BTreeMap::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms.max(self.backoff_base_ms))
    }

    pub fn call_timeout(&self, poll_interval: Duration) -> Duration {
        poll_interval.saturating_mul(self.timeout_factor.max(1))
    }
}

/// Supervisor API misuse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("a scan loop for {0} is already registered")]
    DuplicateDomain(Domain),

    #[error("sensor {sensor} reports {actual}, cannot register it for {expected}")]
    DomainMismatch {
        sensor: String,
        expected: Domain,
        actual: Domain,
    },

    #[error("poll interval for {0} must be non-zero")]
    InvalidInterval(Domain),

    #[error("no scan loop registered for {0}")]
    UnknownDomain(Domain),

    #[error("scan loop for {0} is not failed")]
    NotFailed(Domain),

    #[error("supervisor is shut down")]
    ShutDown,
}

struct LoopHandle {
    reset: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Runs one scan loop per domain
pub struct ScannerSupervisor {
    config: Arc<SupervisorConfig>,
    clock: Clock,
    event_bus: Arc<EventBus>,
    board: Arc<HealthBoard>,
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<BTreeMap<Domain, LoopHandle>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl ScannerSupervisor {
    pub fn new(config: SupervisorConfig, clock: Clock, event_bus: Arc<EventBus>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            clock,
            event_bus,
            board: Arc::new(HealthBoard::new(clock)),
            shutdown_tx,
            loops: Mutex::new(BTreeMap::new()),
            watchdog: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start a scan loop for `domain`. Must be called inside a tokio runtime.
    pub fn register(
        &self,
        domain: Domain,
        poll_interval: Duration,
        sensor: Box<dyn SensorSource>,
    ) -> Result<(), SupervisorError> {
        if *self.shutdown_tx.borrow() {
            return Err(SupervisorError::ShutDown);
        }
        if poll_interval.is_zero() {
            return Err(SupervisorError::InvalidInterval(domain));
        }
        if sensor.domain() != domain {
            return Err(SupervisorError::DomainMismatch {
                sensor: sensor.id().to_string(),
                expected: domain,
                actual: sensor.domain(),
            });
        }

        let mut loops = self.loops.lock();
        if loops.contains_key(&domain) {
            return Err(SupervisorError::DuplicateDomain(domain));
        }

        let name = sensor.id().to_string();
        self.board.insert(domain, &name, poll_interval);

        let reset = Arc::new(Notify::new());
        let scan_loop = ScanLoop {
            domain,
            sensor,
            poll_interval,
            config: Arc::clone(&self.config),
            clock: self.clock,
            board: Arc::clone(&self.board),
            event_bus: Arc::clone(&self.event_bus),
            shutdown: self.shutdown_tx.subscribe(),
            reset: Arc::clone(&reset),
        };
        let task = tokio::spawn(scan_loop.run());
        loops.insert(domain, LoopHandle { reset, task });
        drop(loops);

        info!("Registered {} scanner {} every {:?}", domain, name, poll_interval);
        self.ensure_watchdog();
        Ok(())
    }

    fn ensure_watchdog(&self) {
        let mut watchdog = self.watchdog.lock();
        if watchdog.is_some() {
            return;
        }

        let board = Arc::clone(&self.board);
        let stall_factor = self.config.stall_factor;
        let period = Duration::from_millis(self.config.watchdog_interval_ms.max(1));
        let mut shutdown = self.shutdown_tx.subscribe();

        *watchdog = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    _ = ticker.tick() => board.check_stalls(stall_factor),
                }
            }
            debug!("Stall watchdog stopped");
        }));
    }

    pub fn registered(&self) -> Vec<Domain> {
        self.loops.lock().keys().copied().collect()
    }

    pub fn health_snapshot(&self) -> Arc<HealthSnapshot> {
        self.board.snapshot()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<Arc<HealthSnapshot>> {
        self.board.subscribe()
    }

    /// Aggregate score in [0, 100]; reporting only
    pub fn health_score(&self) -> f64 {
        health_score(
            &self.board.snapshot(),
            self.config.failure_threshold,
            &self.config.weights,
        )
    }

    /// Revive a loop parked in `Failed`
    pub fn reset(&self, domain: Domain) -> Result<(), SupervisorError> {
        let loops = self.loops.lock();
        let handle = loops.get(&domain).ok_or(SupervisorError::UnknownDomain(domain))?;
        if self.board.state(domain) != Some(ScanLoopState::Failed) {
            return Err(SupervisorError::NotFailed(domain));
        }
        info!("Manual reset requested for {} scanner", domain);
        handle.reset.notify_one();
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signal every loop, wait for in-flight calls, release sensors
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Scanner supervisor shutting down...");

        let tasks: Vec<JoinHandle<()>> = {
            let mut loops = self.loops.lock();
            std::mem::take(&mut *loops).into_values().map(|h| h.task).collect()
        };
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Scan loop task ended abnormally: {}", e);
            }
        }

        let watchdog = self.watchdog.lock().take();
        if let Some(task) = watchdog {
            let _ = task.await;
        }
        info!("Scanner supervisor stopped");
    }
}
