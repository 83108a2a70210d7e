// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Scripted sensor for scan loop tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use super::{Domain, Reading, SensorError, SensorSource};

/// Call counters shared with the test body
#[derive(Debug, Default)]
pub struct SensorProbe {
    polls: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SensorProbe {
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements `in_flight` even when the poll future is dropped by a timeout
struct InFlight<'a>(&'a SensorProbe);

impl<'a> InFlight<'a> {
    fn enter(probe: &'a SensorProbe) -> Self {
        let now = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(probe)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Replays queued results, then repeats `fallback` forever
pub struct ScriptedSensor {
    id: String,
    domain: Domain,
    script: VecDeque<Result<Reading, SensorError>>,
    fallback: Result<Reading, SensorError>,
    delay: Duration,
    connect_error: Option<SensorError>,
    hang_on_reconnect: bool,
    probe: Arc<SensorProbe>,
}

impl ScriptedSensor {
    pub fn new(domain: Domain, fallback: Result<Reading, SensorError>) -> Self {
        Self {
            id: format!("scripted-{}", domain),
            domain,
            script: VecDeque::new(),
            fallback,
            delay: Duration::ZERO,
            connect_error: None,
            hang_on_reconnect: false,
            probe: Arc::new(SensorProbe::default()),
        }
    }

    pub fn then(mut self, result: Result<Reading, SensorError>) -> Self {
        self.script.push_back(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_connect_error(mut self, error: SensorError) -> Self {
        self.connect_error = Some(error);
        self
    }

    /// First connect succeeds, every later one never resolves
    pub fn with_hanging_reconnect(mut self) -> Self {
        self.hang_on_reconnect = true;
        self
    }

    pub fn probe(&self) -> Arc<SensorProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl SensorSource for ScriptedSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn domain(&self) -> Domain {
        self.domain
    }

    async fn connect(&mut self) -> Result<(), SensorError> {
        let previous = self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_reconnect && previous > 0 {
            std::future::pending::<()>().await;
        }
        match &self.connect_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn disconnect(&mut self) -> Result<(), SensorError> {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn poll(&mut self) -> Result<Reading, SensorError> {
        let _guard = InFlight::enter(&self.probe);
        self.probe.polls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.script.pop_front() {
            Some(result) => result,
            None => self.fallback.clone(),
        }
    }
}
