// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Main detection engine - wires scanners, classifiers and the anomaly stream

use std::sync::Arc;
use std::time::{Duration, Instant};
use futures::future::join_all;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use anyhow::Result;
use tracing::{info, warn};

use crate::config::{Config, DetectionSettings, SettingsError, SettingsStore};
use crate::detection::{
    Anomaly, BleClassifier, BleRules, CellularClassifier, CellularRules, Classifier, CooldownGate,
    DetectionEngine, RfClassifier, RfRules, SatelliteClassifier, SatelliteRules, WifiClassifier,
    WifiRules,
};
use crate::sensors::{Domain, HealthSnapshot, ScannerSupervisor, SensorSource, SupervisorError};
use super::{Clock, EngineState, EventBus};

/// Main Flockwatch engine
pub struct Engine {
    pub config: Arc<Config>,
    clock: Clock,
    event_bus: Arc<EventBus>,
    settings: SettingsStore,
    cooldown: Arc<CooldownGate>,
    supervisor: ScannerSupervisor,
    detection: Arc<DetectionEngine>,
    shutdown_tx: watch::Sender<bool>,
    classifiers: Vec<JoinHandle<()>>,
    state: Arc<RwLock<EngineState>>,
    start_time: Option<Instant>,
}

impl Engine {
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Clock::new())
    }

    /// Engine whose timestamps come from `clock`
    pub fn with_clock(config: Config, clock: Clock) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
        let settings = SettingsStore::new(config.detection.clone())?;
        let supervisor = ScannerSupervisor::new(config.supervisor.clone(), clock, Arc::clone(&event_bus));
        let detection = Arc::new(DetectionEngine::new(Arc::clone(&event_bus)));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            clock,
            event_bus,
            settings,
            cooldown: Arc::new(CooldownGate::new()),
            supervisor,
            detection,
            shutdown_tx,
            classifiers: Vec::new(),
            state: Arc::new(RwLock::new(EngineState::default())),
            start_time: None,
        })
    }

    /// Spawn one classifier task per domain
    pub async fn start(&mut self) -> Result<()> {
        if self.start_time.is_some() {
            return Ok(());
        }
        info!("Starting Flockwatch engine...");
        self.start_time = Some(Instant::now());

        let capacity = self.config.history_capacity;
        let classifiers: Vec<Box<dyn Classifier>> = vec![
            Box::new(CellularClassifier::new(CellularRules::new(), capacity, Arc::clone(&self.cooldown))),
            Box::new(SatelliteClassifier::new(SatelliteRules::new(), capacity, Arc::clone(&self.cooldown))),
            Box::new(BleClassifier::new(BleRules::new(), capacity, Arc::clone(&self.cooldown))),
            Box::new(WifiClassifier::new(WifiRules::new(), capacity, Arc::clone(&self.cooldown))),
            Box::new(RfClassifier::new(RfRules::new(), capacity, Arc::clone(&self.cooldown))),
        ];
        for classifier in classifiers {
            let handle = self.detection.spawn(classifier, self.settings.subscribe(), self.shutdown_tx.subscribe());
            self.classifiers.push(handle);
        }

        {
            let mut state = self.state.write().await;
            state.running = true;
        }
        self.event_bus.publish_status("engine", "running");

        info!("Flockwatch engine started");
        Ok(())
    }

    /// Hand a sensor to the supervisor; its domain picks the scan loop
    pub fn register_sensor(
        &self,
        sensor: Box<dyn SensorSource>,
        poll_interval: Duration,
    ) -> Result<(), SupervisorError> {
        let domain = sensor.domain();
        self.supervisor.register(domain, poll_interval, sensor)
    }

    /// Register a simulated sensor for every enabled scanner
    #[cfg(feature = "simulator")]
    pub fn register_simulated_sensors(&self) -> Result<(), SupervisorError> {
        use crate::sensors::SimulatedSensor;

        for domain in Domain::ALL {
            let scanner = self.config.scanners.get(domain);
            if !scanner.enabled {
                continue;
            }
            let sensor = SimulatedSensor::new(domain, self.clock);
            self.register_sensor(Box::new(sensor), scanner.poll_interval())?;
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping Flockwatch engine...");

        self.supervisor.shutdown().await;
        self.shutdown_tx.send_replace(true);
        for result in join_all(self.classifiers.drain(..)).await {
            if let Err(e) = result {
                warn!("Classifier task ended abnormally: {}", e);
            }
        }

        {
            let mut state = self.state.write().await;
            state.running = false;
        }
        self.event_bus.publish_status("engine", "stopped");

        info!("Flockwatch engine stopped");
        Ok(())
    }

    /// Swap detection settings; a rejected update leaves the old ones active
    pub fn update_settings(&self, settings: DetectionSettings) -> Result<(), SettingsError> {
        self.settings.update(settings)
    }

    pub fn settings(&self) -> Arc<DetectionSettings> {
        self.settings.current()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe_anomalies(&self) -> broadcast::Receiver<Anomaly> {
        self.event_bus.subscribe_anomalies()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<Arc<HealthSnapshot>> {
        self.supervisor.subscribe_health()
    }

    pub fn health_snapshot(&self) -> Arc<HealthSnapshot> {
        self.supervisor.health_snapshot()
    }

    pub fn health_score(&self) -> f64 {
        self.supervisor.health_score()
    }

    pub fn reset_scanner(&self, domain: Domain) -> Result<(), SupervisorError> {
        self.supervisor.reset(domain)
    }

    /// Newest first
    pub fn recent_anomalies(&self, limit: usize) -> Vec<Anomaly> {
        self.detection.recent_anomalies(limit)
    }

    /// Drop cooldown entries last fired before `timestamp`
    pub fn evict_cooldowns_older_than(&self, timestamp: i64) -> usize {
        self.cooldown.evict_older_than(timestamp)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub async fn state(&self) -> EngineState {
        let mut state = self.state.read().await.clone();
        state.scanners_registered = self.supervisor.registered().len();
        state.anomalies_detected = self.detection.anomaly_count();
        state.readings_dropped = self.detection.readings_dropped();
        state.health_score = self.health_score();
        state.uptime_seconds = self.uptime();
        state.last_anomaly = self.detection.recent_anomalies(1).first().map(|a| a.timestamp);
        state
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}
