// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Event bus for inter-component communication

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::detection::{Anomaly, ThreatLevel};
use crate::sensors::{Domain, ScanReport};

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Anomaly,
    Alert,
    SystemStatus,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Anomaly(Anomaly),
    Alert {
        level: ThreatLevel,
        source: Domain,
        message: String,
    },
    Status { key: String, value: String },
}

/// Central event bus for pub/sub communication.
///
/// Every channel is a `broadcast`: publishing never blocks, slow subscribers
/// lag and are told how many messages they missed.
pub struct EventBus {
    reading_tx: broadcast::Sender<ScanReport>,
    anomaly_tx: broadcast::Sender<Anomaly>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (reading_tx, _) = broadcast::channel(capacity);
        let (anomaly_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            reading_tx,
            anomaly_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    /// Readings are high volume and go to their own channel only
    pub fn publish_reading(&self, report: ScanReport) {
        let _ = self.reading_tx.send(report);
    }

    pub fn publish_anomaly(&self, anomaly: Anomaly) {
        let _ = self.anomaly_tx.send(anomaly.clone());
        self.publish_event(EventType::Anomaly, EventPayload::Anomaly(anomaly));
    }

    pub fn publish_alert(&self, level: ThreatLevel, source: Domain, message: &str) {
        self.publish_event(
            EventType::Alert,
            EventPayload::Alert {
                level,
                source,
                message: message.to_string(),
            },
        );
    }

    pub fn publish_status(&self, key: &str, value: &str) {
        self.publish_event(
            EventType::SystemStatus,
            EventPayload::Status {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_readings(&self) -> broadcast::Receiver<ScanReport> {
        self.reading_tx.subscribe()
    }

    pub fn subscribe_anomalies(&self) -> broadcast::Receiver<Anomaly> {
        self.anomaly_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Reading;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe_readings();
        for ts in 0..5 {
            bus.publish_reading(ScanReport { domain: Domain::Rf, timestamp: ts, reading: Reading::Heartbeat });
        }
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Lagged(3));
        assert_eq!(rx.try_recv().unwrap().timestamp, 3);
    }

    #[test]
    fn test_alert_event_ids_increase() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe_events();
        bus.publish_alert(ThreatLevel::High, Domain::Ble, "adapter gone");
        bus.publish_status("state", "running");

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.event_type, EventType::Alert);
        assert_eq!(second.event_type, EventType::SystemStatus);
        assert!(second.id > first.id);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish_alert(ThreatLevel::Low, Domain::Wifi, "nobody listening");
    }
}
