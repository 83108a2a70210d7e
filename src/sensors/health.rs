// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Scan loop health - per-loop status, aggregate score, backoff

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use super::{Domain, SensorError};
use crate::core::Clock;

/// Lifecycle of a scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanLoopState {
    Idle,
    Starting,
    Running,
    Stalled,
    Failed,
    Restarting,
    Stopped,
}

impl ScanLoopState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ScanLoopState::Starting
                | ScanLoopState::Running
                | ScanLoopState::Stalled
                | ScanLoopState::Restarting
        )
    }
}

/// Health of one scan loop as seen by consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorHealthStatus {
    pub name: String,
    pub domain: Domain,
    pub is_running: bool,
    pub is_healthy: bool,
    pub last_successful_scan: Option<i64>,
    pub consecutive_failures: u32,
    pub restart_count: u32,
    pub last_error: Option<String>,
    pub last_error_time: Option<i64>,
    pub state: ScanLoopState,
    pub poll_interval_ms: u64,
}

pub type HealthSnapshot = BTreeMap<Domain, DetectorHealthStatus>;

/// Weighted mean of `clamp(1 - failures / threshold)` as a percentage.
///
/// Failed loops score 0. No loops means nothing is broken: 100.
pub fn health_score(snapshot: &HealthSnapshot, failure_threshold: u32, weights: &BTreeMap<String, f64>) -> f64 {
    let threshold = failure_threshold.max(1) as f64;
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (domain, status) in snapshot {
        let weight = weights.get(domain.name()).copied().unwrap_or(1.0).max(0.0);
        let score = if status.state == ScanLoopState::Failed {
            0.0
        } else {
            (1.0 - status.consecutive_failures as f64 / threshold).clamp(0.0, 1.0)
        };
        weighted += weight * score;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return 100.0;
    }
    weighted / total_weight * 100.0
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent).min(cap)
}

#[derive(Debug)]
struct LoopRecord {
    status: DetectorHealthStatus,
    poll_interval: Duration,
    /// Last success, or the moment the loop (re)entered Running
    stall_baseline: Instant,
    restarts_since_success: u32,
}

/// Shared health map; scan loops and the watchdog write, consumers read snapshots
pub(crate) struct HealthBoard {
    clock: Clock,
    records: Mutex<BTreeMap<Domain, LoopRecord>>,
    tx: watch::Sender<Arc<HealthSnapshot>>,
}

impl HealthBoard {
    pub(crate) fn new(clock: Clock) -> Self {
        let (tx, _) = watch::channel(Arc::new(HealthSnapshot::new()));
        Self {
            clock,
            records: Mutex::new(BTreeMap::new()),
            tx,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<HealthSnapshot>> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.tx.borrow().clone()
    }

    pub(crate) fn insert(&self, domain: Domain, name: &str, poll_interval: Duration) {
        let mut records = self.records.lock();
        records.insert(domain, LoopRecord {
            status: DetectorHealthStatus {
                name: name.to_string(),
                domain,
                is_running: false,
                is_healthy: true,
                last_successful_scan: None,
                consecutive_failures: 0,
                restart_count: 0,
                last_error: None,
                last_error_time: None,
                state: ScanLoopState::Idle,
                poll_interval_ms: poll_interval.as_millis() as u64,
            },
            poll_interval,
            stall_baseline: Instant::now(),
            restarts_since_success: 0,
        });
        self.publish(&records);
    }

    pub(crate) fn state(&self, domain: Domain) -> Option<ScanLoopState> {
        self.records.lock().get(&domain).map(|r| r.status.state)
    }

    pub(crate) fn set_state(&self, domain: Domain, state: ScanLoopState) {
        self.modify(domain, |r| Self::transition(r, state));
    }

    /// Entered Running after a (re)connect
    pub(crate) fn mark_running(&self, domain: Domain) {
        self.modify(domain, |r| {
            Self::transition(r, ScanLoopState::Running);
            r.stall_baseline = Instant::now();
        });
    }

    pub(crate) fn record_success(&self, domain: Domain) {
        let now_ms = self.clock.now_ms();
        self.modify(domain, |r| {
            r.status.consecutive_failures = 0;
            r.status.is_healthy = true;
            r.status.last_successful_scan = Some(now_ms);
            r.restarts_since_success = 0;
            r.stall_baseline = Instant::now();
            if r.status.state == ScanLoopState::Stalled {
                Self::transition(r, ScanLoopState::Running);
            }
        });
    }

    /// Returns the new consecutive failure count
    pub(crate) fn record_failure(&self, domain: Domain, error: &SensorError, failure_threshold: u32) -> u32 {
        let now_ms = self.clock.now_ms();
        self.modify(domain, |r| {
            r.status.consecutive_failures = r.status.consecutive_failures.saturating_add(1);
            r.status.last_error = Some(error.to_string());
            r.status.last_error_time = Some(now_ms);
            if r.status.consecutive_failures >= failure_threshold {
                r.status.is_healthy = false;
            }
            r.status.consecutive_failures
        })
        .unwrap_or(0)
    }

    /// Returns `(restart_count, backoff attempt)` for the restart about to happen
    pub(crate) fn begin_restart(&self, domain: Domain) -> (u32, u32) {
        self.modify(domain, |r| {
            Self::transition(r, ScanLoopState::Restarting);
            r.status.is_healthy = false;
            (r.status.restart_count, r.restarts_since_success + 1)
        })
        .unwrap_or((0, 1))
    }

    pub(crate) fn count_restart(&self, domain: Domain) {
        self.modify(domain, |r| {
            r.status.restart_count = r.status.restart_count.saturating_add(1);
            r.restarts_since_success = r.restarts_since_success.saturating_add(1);
        });
    }

    pub(crate) fn mark_failed(&self, domain: Domain, reason: &str) {
        let now_ms = self.clock.now_ms();
        self.modify(domain, |r| {
            Self::transition(r, ScanLoopState::Failed);
            r.status.is_healthy = false;
            r.status.last_error = Some(reason.to_string());
            r.status.last_error_time = Some(now_ms);
        });
    }

    /// Manual revive: counters cleared, error history kept
    pub(crate) fn manual_reset(&self, domain: Domain) {
        self.modify(domain, |r| {
            r.status.consecutive_failures = 0;
            r.status.restart_count = 0;
            r.status.is_healthy = true;
            r.restarts_since_success = 0;
            Self::transition(r, ScanLoopState::Starting);
        });
    }

    /// Flag `domain` as stalled if it has been silent too long
    pub(crate) fn check_stall(&self, domain: Domain, stall_factor: u32) {
        let now = Instant::now();
        self.modify(domain, |r| Self::stall_if_silent(r, now, stall_factor));
    }

    /// Watchdog pass over every loop
    pub(crate) fn check_stalls(&self, stall_factor: u32) {
        let now = Instant::now();
        let mut records = self.records.lock();
        let mut changed = false;
        for record in records.values_mut() {
            changed |= Self::stall_if_silent(record, now, stall_factor);
        }
        if changed {
            self.publish(&records);
        }
    }

    fn stall_if_silent(record: &mut LoopRecord, now: Instant, stall_factor: u32) -> bool {
        if record.status.state != ScanLoopState::Running {
            return false;
        }
        let limit = record.poll_interval.saturating_mul(stall_factor);
        if now.saturating_duration_since(record.stall_baseline) <= limit {
            return false;
        }
        Self::transition(record, ScanLoopState::Stalled);
        record.status.is_healthy = false;
        true
    }

    fn transition(record: &mut LoopRecord, state: ScanLoopState) {
        record.status.state = state;
        record.status.is_running = state.is_running();
    }

    fn modify<R>(&self, domain: Domain, f: impl FnOnce(&mut LoopRecord) -> R) -> Option<R> {
        let mut records = self.records.lock();
        let record = records.get_mut(&domain)?;
        let before = record.status.clone();
        let result = f(record);
        if record.status != before {
            self.publish(&records);
        }
        Some(result)
    }

    fn publish(&self, records: &BTreeMap<Domain, LoopRecord>) {
        let snapshot: HealthSnapshot = records
            .iter()
            .map(|(domain, record)| (*domain, record.status.clone()))
            .collect();
        self.tx.send_replace(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(domain: Domain, failures: u32, state: ScanLoopState) -> DetectorHealthStatus {
        DetectorHealthStatus {
            name: domain.to_string(),
            domain,
            is_running: state.is_running(),
            is_healthy: true,
            last_successful_scan: None,
            consecutive_failures: failures,
            restart_count: 0,
            last_error: None,
            last_error_time: None,
            state,
            poll_interval_ms: 1_000,
        }
    }

    #[test]
    fn test_health_score() {
        let weights = BTreeMap::new();
        assert_eq!(health_score(&HealthSnapshot::new(), 5, &weights), 100.0);

        let mut snapshot = HealthSnapshot::new();
        snapshot.insert(Domain::Ble, status(Domain::Ble, 0, ScanLoopState::Running));
        snapshot.insert(Domain::Wifi, status(Domain::Wifi, 2, ScanLoopState::Running));
        // (1.0 + 0.6) / 2
        assert!((health_score(&snapshot, 5, &weights) - 80.0).abs() < 1e-9);

        snapshot.insert(Domain::Rf, status(Domain::Rf, 9, ScanLoopState::Restarting));
        snapshot.insert(Domain::Cellular, status(Domain::Cellular, 0, ScanLoopState::Failed));
        assert!((health_score(&snapshot, 5, &weights) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_health_score_weights() {
        let mut snapshot = HealthSnapshot::new();
        snapshot.insert(Domain::Ble, status(Domain::Ble, 0, ScanLoopState::Running));
        snapshot.insert(Domain::Wifi, status(Domain::Wifi, 5, ScanLoopState::Running));

        let mut weights = BTreeMap::new();
        weights.insert("ble".to_string(), 3.0);
        assert!((health_score(&snapshot, 5, &weights) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(60);
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(4, base, cap), Duration::from_secs(8));
        assert_eq!(backoff_delay(7, base, cap), Duration::from_secs(60));
        assert_eq!(backoff_delay(100, base, cap), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_board_stall_and_recovery() {
        let board = HealthBoard::new(Clock::starting_at(0));
        board.insert(Domain::Wifi, "wifi-sim", Duration::from_secs(10));
        board.mark_running(Domain::Wifi);

        tokio::time::advance(Duration::from_secs(29)).await;
        board.check_stalls(3);
        assert_eq!(board.state(Domain::Wifi), Some(ScanLoopState::Running));

        tokio::time::advance(Duration::from_secs(2)).await;
        board.check_stalls(3);
        let snap = board.snapshot();
        assert_eq!(snap[&Domain::Wifi].state, ScanLoopState::Stalled);
        assert!(!snap[&Domain::Wifi].is_healthy);

        board.record_success(Domain::Wifi);
        let snap = board.snapshot();
        assert_eq!(snap[&Domain::Wifi].state, ScanLoopState::Running);
        assert_eq!(snap[&Domain::Wifi].last_successful_scan, Some(31_000));
    }
}
