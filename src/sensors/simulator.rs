// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Sensor simulator for demo/testing

use async_trait::async_trait;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Uniform};

use super::{
    BleAdvertisement, BleScan, CellObservation, CellScan, Constellation, DeauthFrame, Domain,
    GeoPoint, RadioTechnology, Reading, RfSample, RfSweep, SatelliteFix, SatelliteObservation,
    SensorError, SensorSource, WifiBeacon, WifiScan, WifiSecurity,
};
use crate::core::Clock;

const HOME_MCC: u16 = 310;
const HOME_MNC: u16 = 260;
const HOME_SSID: &str = "flock-home";
const HOME_BSSID: &str = "3C:52:82:10:20:30";
const ISM_433: u64 = 433_920_000;

/// Produces plausible readings for one domain with occasional planted threats
pub struct SimulatedSensor {
    id: String,
    domain: Domain,
    clock: Clock,
    rng: StdRng,
    connected: bool,

    // Simulation state
    position: GeoPoint,
    anomaly_probability: f64,
    failure_probability: f64,
    jamming_polls_left: u32,
}

impl SimulatedSensor {
    pub fn new(domain: Domain, clock: Clock) -> Self {
        Self {
            id: format!("sim-{}", domain),
            domain,
            clock,
            rng: StdRng::from_entropy(),
            connected: false,
            position: GeoPoint::new(47.6062, -122.3321),
            anomaly_probability: 0.05,
            failure_probability: 0.01,
            jamming_polls_left: 0,
        }
    }

    /// Deterministic stream for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_anomaly_probability(mut self, p: f64) -> Self {
        self.anomaly_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_failure_probability(mut self, p: f64) -> Self {
        self.failure_probability = p.clamp(0.0, 1.0);
        self
    }

    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        match Normal::new(mean, std_dev) {
            Ok(normal) => self.rng.sample(normal),
            Err(_) => mean,
        }
    }

    fn inject(&mut self) -> bool {
        self.rng.gen::<f64>() < self.anomaly_probability
    }

    /// The user walks roughly 50 m per poll
    fn walk(&mut self) -> GeoPoint {
        let step = Uniform::new(-0.0006, 0.0006);
        self.position.lat += self.rng.sample(&step);
        self.position.lon += self.rng.sample(&step);
        self.position
    }

    fn generate(&mut self, now: i64) -> Reading {
        match self.domain {
            Domain::Cellular => Reading::Cellular(self.generate_cells(now)),
            Domain::Satellite => Reading::Satellite(self.generate_fix(now)),
            Domain::Ble => Reading::Ble(self.generate_ble(now)),
            Domain::Wifi => Reading::Wifi(self.generate_wifi(now)),
            Domain::Rf => Reading::Rf(self.generate_rf(now)),
        }
    }

    fn generate_cells(&mut self, now: i64) -> CellScan {
        let location = Some(self.walk());
        let mut cells: Vec<CellObservation> = (0..3u64)
            .map(|i| CellObservation {
                cell_id: 20_481 + i,
                area_code: 7_100,
                mcc: HOME_MCC,
                mnc: HOME_MNC,
                technology: RadioTechnology::Lte,
                signal_dbm: 0,
                registered: i == 0,
                timestamp: now,
                location,
            })
            .collect();
        for (i, cell) in cells.iter_mut().enumerate() {
            cell.signal_dbm = self.gaussian(-85.0 - 6.0 * i as f64, 2.5).round() as i32;
        }

        // Rogue base station: loud, unknown, 2G only
        if self.inject() {
            for cell in cells.iter_mut() {
                cell.registered = false;
            }
            cells.push(CellObservation {
                cell_id: self.rng.gen_range(1..100),
                area_code: 1,
                mcc: 1,
                mnc: 1,
                technology: RadioTechnology::Gsm,
                signal_dbm: self.gaussian(-45.0, 2.0).round() as i32,
                registered: true,
                timestamp: now,
                location,
            });
        }

        CellScan { cells, moving: true }
    }

    fn generate_fix(&mut self, now: i64) -> SatelliteFix {
        let location = Some(self.position);
        let spoofed = self.inject();
        let elevation = Uniform::new(10.0, 85.0);
        let azimuth = Uniform::new(0.0, 360.0);

        let satellites = (0..8u16)
            .map(|i| {
                let cn0_dbhz = if spoofed {
                    // A single transmitter shows up as identical power on every SV
                    50.0 + self.gaussian(0.0, 0.2)
                } else {
                    self.gaussian(38.0, 4.0).clamp(20.0, 50.0)
                };
                SatelliteObservation {
                    constellation: Constellation::Gps,
                    svid: 2 + i * 3,
                    cn0_dbhz,
                    elevation: self.rng.sample(&elevation),
                    azimuth: self.rng.sample(&azimuth),
                    used_in_fix: true,
                    timestamp: now,
                    location,
                }
            })
            .collect();

        SatelliteFix { satellites }
    }

    fn generate_ble(&mut self, now: i64) -> BleScan {
        let location = Some(self.walk());
        let mut advertisements: Vec<BleAdvertisement> = (0..self.rng.gen_range(1..4u8))
            .map(|i| BleAdvertisement {
                address: format!("D4:{:02X}:5E:11:90:{:02X}", self.rng.gen::<u8>(), i),
                name: None,
                rssi: self.rng.gen_range(-95..-70),
                manufacturer_id: Some(0x0006),
                manufacturer_data: vec![0x01, 0x09, 0x20],
                service_uuids: vec![],
                timestamp: now,
                location,
            })
            .collect();

        // The same AirTag keeps showing up wherever we go
        if self.inject() {
            let mut payload = vec![0x12, 0x19, 0x10];
            payload.resize(27, 0xA5);
            advertisements.push(BleAdvertisement {
                address: "F1:2A:77:0B:C4:E9".into(),
                name: None,
                rssi: self.gaussian(-60.0, 4.0).round() as i32,
                manufacturer_id: Some(0x004C),
                manufacturer_data: payload,
                service_uuids: vec![],
                timestamp: now,
                location,
            });
        }

        BleScan { advertisements }
    }

    fn generate_wifi(&mut self, now: i64) -> WifiScan {
        let location = Some(self.position);
        let mut scan = WifiScan::default();
        scan.beacons.push(WifiBeacon {
            bssid: HOME_BSSID.into(),
            ssid: HOME_SSID.into(),
            rssi: self.gaussian(-62.0, 3.0).round() as i32,
            channel: 6,
            security: WifiSecurity::Wpa2,
            timestamp: now,
            location,
        });
        for i in 0..self.rng.gen_range(0..4u8) {
            scan.beacons.push(WifiBeacon {
                bssid: format!("80:2A:A8:{:02X}:00:{:02X}", self.rng.gen::<u8>(), i),
                ssid: format!("neighbor-{}", i),
                rssi: self.rng.gen_range(-92..-70),
                channel: [1, 6, 11][i as usize % 3],
                security: WifiSecurity::Wpa2,
                timestamp: now,
                location,
            });
        }

        if self.inject() {
            if self.rng.gen_bool(0.5) {
                // Evil twin of the home network
                scan.beacons.push(WifiBeacon {
                    bssid: "02:00:5E:AB:CD:EF".into(),
                    ssid: HOME_SSID.into(),
                    rssi: self.gaussian(-48.0, 2.0).round() as i32,
                    channel: 11,
                    security: WifiSecurity::Open,
                    timestamp: now,
                    location,
                });
            } else {
                // Deauth burst against the home AP
                for k in 0..12 {
                    scan.deauth_frames.push(DeauthFrame {
                        source: HOME_BSSID.into(),
                        target: "FF:FF:FF:FF:FF:FF".into(),
                        timestamp: now - k * 50,
                    });
                }
            }
        }

        scan
    }

    fn generate_rf(&mut self, now: i64) -> RfSweep {
        if self.jamming_polls_left == 0 && self.inject() {
            self.jamming_polls_left = self.rng.gen_range(3..8);
        }

        let samples = [315_000_000u64, ISM_433, 868_000_000, 915_000_000]
            .into_iter()
            .map(|frequency_hz| {
                let jammed = frequency_hz == ISM_433 && self.jamming_polls_left > 0;
                RfSample {
                    frequency_hz,
                    rssi: if jammed {
                        self.gaussian(-30.0, 2.0).round() as i32
                    } else {
                        self.gaussian(-95.0, 3.0).round() as i32
                    },
                    decoded: !jammed && self.rng.gen_bool(0.3),
                    timestamp: now,
                }
            })
            .collect();
        self.jamming_polls_left = self.jamming_polls_left.saturating_sub(1);

        RfSweep { samples }
    }
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn domain(&self) -> Domain {
        self.domain
    }

    async fn connect(&mut self) -> Result<(), SensorError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SensorError> {
        self.connected = false;
        Ok(())
    }

    async fn poll(&mut self) -> Result<Reading, SensorError> {
        if !self.connected {
            return Err(SensorError::Recoverable(format!("{} is not connected", self.id)));
        }
        if self.rng.gen::<f64>() < self.failure_probability {
            return Err(SensorError::Recoverable("simulated radio glitch".into()));
        }
        let now = self.clock.now_ms();
        Ok(self.generate(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::identify_tracker;

    fn sensor(domain: Domain) -> SimulatedSensor {
        SimulatedSensor::new(domain, Clock::starting_at(1_000)).with_seed(7)
    }

    #[tokio::test]
    async fn test_poll_requires_connect() {
        let mut sim = sensor(Domain::Wifi).with_failure_probability(0.0);
        assert!(matches!(sim.poll().await, Err(SensorError::Recoverable(_))));
        sim.connect().await.unwrap();
        let reading = sim.poll().await.unwrap();
        assert_eq!(reading.domain(), Some(Domain::Wifi));
        assert!(reading.is_live());
    }

    #[tokio::test]
    async fn test_every_domain_produces_its_payload() {
        for domain in Domain::ALL {
            let mut sim = sensor(domain).with_failure_probability(0.0);
            sim.connect().await.unwrap();
            let reading = sim.poll().await.unwrap();
            assert_eq!(reading.domain(), Some(domain));
            assert!(!reading.is_empty());
        }
    }

    #[tokio::test]
    async fn test_injected_tracker_is_recognized() {
        let mut sim = sensor(Domain::Ble).with_anomaly_probability(1.0).with_failure_probability(0.0);
        sim.connect().await.unwrap();
        let Reading::Ble(scan) = sim.poll().await.unwrap() else {
            panic!("expected a BLE scan");
        };
        assert!(scan.advertisements.iter().any(|adv| identify_tracker(adv).is_some()));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mut sim = sensor(Domain::Rf).with_failure_probability(1.0);
        sim.connect().await.unwrap();
        assert_eq!(
            sim.poll().await.unwrap_err(),
            SensorError::Recoverable("simulated radio glitch".into())
        );
    }
}
