// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! One supervised polling task per domain

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::health::{backoff_delay, HealthBoard, ScanLoopState};
use super::supervisor::SupervisorConfig;
use super::{Domain, Reading, ScanReport, SensorError, SensorSource};
use crate::core::{Clock, EventBus};
use crate::detection::ThreatLevel;

/// Why a loop stopped doing useful work
enum Halt {
    Shutdown,
    Failed,
}

pub(crate) struct ScanLoop {
    pub(crate) domain: Domain,
    pub(crate) sensor: Box<dyn SensorSource>,
    pub(crate) poll_interval: Duration,
    pub(crate) config: Arc<SupervisorConfig>,
    pub(crate) clock: Clock,
    pub(crate) board: Arc<HealthBoard>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) reset: Arc<Notify>,
}

impl ScanLoop {
    pub(crate) async fn run(mut self) {
        info!("Starting {} scan loop ({})", self.domain, self.sensor.id());
        self.board.set_state(self.domain, ScanLoopState::Starting);

        let mut halted = match self.connect_sensor().await {
            Ok(()) => {
                self.board.mark_running(self.domain);
                None
            }
            Err(e) if e.is_fatal() => Some(self.fail(&e.to_string())),
            Err(e) => {
                self.board.record_failure(self.domain, &e, self.config.failure_threshold);
                warn!("{} connect failed: {}", self.domain, e);
                self.restart().await
            }
        };

        loop {
            let halt = match halted.take() {
                Some(halt) => halt,
                None => self.poll_until_halt().await,
            };
            match halt {
                Halt::Shutdown => break,
                Halt::Failed => {
                    if !self.park().await {
                        break;
                    }
                }
            }
        }

        self.disconnect_sensor("on shutdown").await;
        self.board.set_state(self.domain, ScanLoopState::Stopped);
        info!("{} scan loop stopped", self.domain);
    }

    /// Poll on every tick until shutdown or a terminal failure
    async fn poll_until_halt(&mut self) -> Halt {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let call_timeout = self.config.call_timeout(self.poll_interval);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait_for(|stop| *stop) => return Halt::Shutdown,
                _ = ticker.tick() => {}
            }

            self.board.check_stall(self.domain, self.config.stall_factor);

            let outcome = match timeout(call_timeout, self.sensor.poll()).await {
                Ok(result) => result,
                Err(_) => Err(SensorError::Timeout(call_timeout)),
            };

            match outcome {
                Ok(reading) if reading.is_live() => {
                    self.board.record_success(self.domain);
                    if !matches!(reading, Reading::Heartbeat) {
                        self.event_bus.publish_reading(ScanReport {
                            domain: self.domain,
                            timestamp: self.clock.now_ms(),
                            reading,
                        });
                    }
                }
                Ok(_) => debug!("{} scan returned nothing", self.domain),
                Err(e) if e.is_fatal() => return self.fail(&e.to_string()),
                Err(e) => {
                    let failures = self.board.record_failure(self.domain, &e, self.config.failure_threshold);
                    warn!("{} scan failed ({} consecutive): {}", self.domain, failures, e);
                    if failures >= self.config.failure_threshold {
                        if let Some(halt) = self.restart().await {
                            return halt;
                        }
                    }
                }
            }
        }
    }

    /// Back off and reconnect until the sensor comes back. `None` means running again.
    async fn restart(&mut self) -> Option<Halt> {
        loop {
            let (restarts, attempt) = self.board.begin_restart(self.domain);
            if let Some(max) = self.config.max_restarts {
                if restarts >= max {
                    return Some(self.fail(&format!("gave up after {} restarts", restarts)));
                }
            }

            self.disconnect_sensor("before restart").await;

            let delay = backoff_delay(attempt, self.config.backoff_base(), self.config.backoff_cap());
            info!("Restarting {} scanner in {:?} (attempt {})", self.domain, delay, attempt);
            tokio::select! {
                biased;
                _ = self.shutdown.wait_for(|stop| *stop) => return Some(Halt::Shutdown),
                _ = sleep(delay) => {}
            }

            self.board.count_restart(self.domain);
            match self.connect_sensor().await {
                Ok(()) => {
                    self.board.mark_running(self.domain);
                    return None;
                }
                Err(e) if e.is_fatal() => return Some(self.fail(&e.to_string())),
                Err(e) => {
                    self.board.record_failure(self.domain, &e, self.config.failure_threshold);
                    warn!("{} reconnect failed: {}", self.domain, e);
                }
            }
        }
    }

    /// `connect` bounded by the call timeout; a hang becomes a recoverable `Timeout`
    async fn connect_sensor(&mut self) -> Result<(), SensorError> {
        let call_timeout = self.config.call_timeout(self.poll_interval);
        match timeout(call_timeout, self.sensor.connect()).await {
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout(call_timeout)),
        }
    }

    /// `disconnect` bounded by the call timeout. Errors are logged and ignored.
    async fn disconnect_sensor(&mut self, context: &str) {
        let call_timeout = self.config.call_timeout(self.poll_interval);
        match timeout(call_timeout, self.sensor.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{} disconnect {}: {}", self.domain, context, e),
            Err(_) => warn!("{} disconnect {} timed out after {:?}", self.domain, context, call_timeout),
        }
    }

    fn fail(&self, reason: &str) -> Halt {
        error!("{} scanner failed: {}", self.domain, reason);
        self.board.mark_failed(self.domain, reason);
        self.event_bus.publish_alert(
            ThreatLevel::High,
            self.domain,
            &format!("{} scanner failed: {}", self.domain, reason),
        );
        Halt::Failed
    }

    /// Wait in `Failed` for a manual reset. Returns false on shutdown.
    async fn park(&mut self) -> bool {
        self.disconnect_sensor("while parking").await;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait_for(|stop| *stop) => return false,
                _ = self.reset.notified() => {}
            }

            self.board.manual_reset(self.domain);
            match self.connect_sensor().await {
                Ok(()) => {
                    self.board.mark_running(self.domain);
                    info!("{} scanner revived", self.domain);
                    return true;
                }
                Err(e) => {
                    self.fail(&e.to_string());
                }
            }
        }
    }
}
