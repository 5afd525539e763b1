//! C2 — locate the household power meter and keep a live [`Reading`] plus
//! per-phase currents flowing into the sample pipeline. The `Platform`
//! abstraction only exposes pull-style capability reads, so this connector
//! is poll-driven rather than event-subscribed; the watchdog timings mirror
//! what an event+poll-fallback design would enforce regardless.

use tracing::{info, warn};

use crate::domain::{Reading, ReadingSource, Timestamp};
use crate::platform::{DeviceSnapshot, Platform, PlatformResult};

const PHASE_CAPABILITY_SETS: [[&str; 3]; 2] = [
    ["measure_current.L1", "measure_current.L2", "measure_current.L3"],
    ["measure_current.phase_a", "measure_current.phase_b", "measure_current.phase_c"],
];

const BRAND_TOKENS: [&str; 4] = ["han", "equalizer", "tibber", "mnemonic"];

fn is_meter_like(device: &DeviceSnapshot) -> bool {
    if device.class == "meter" {
        return true;
    }
    let driver = device.driver_id.to_lowercase();
    if driver.contains("equalizer") || driver.contains("easee") {
        return true;
    }
    let name = device.name.to_lowercase();
    BRAND_TOKENS.iter().any(|tok| {
        name.split(|c: char| !c.is_alphanumeric())
            .any(|word| word == *tok)
    })
}

fn brand_label(device: &DeviceSnapshot) -> String {
    if !device.name.is_empty() {
        device.name.clone()
    } else {
        device.driver_id.clone()
    }
}

/// Connection state for the household power meter.
pub struct MeterConnector {
    device_id: Option<String>,
    brand: Option<String>,
    last_reading_at: Option<Timestamp>,
    unavailable: bool,
    phase_capabilities: Option<[&'static str; 3]>,
}

impl MeterConnector {
    pub fn new() -> Self {
        Self {
            device_id: None,
            brand: None,
            last_reading_at: None,
            unavailable: false,
            phase_capabilities: None,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    /// Resolve the meter device: a preselected id with `measurePower`, else
    /// the first auto-detected meter-like device.
    pub async fn discover(&mut self, platform: &dyn Platform, selected_device_id: Option<&str>) -> PlatformResult<bool> {
        if let Some(id) = selected_device_id {
            if let Ok(device) = platform.get_device(id).await {
                if device.capabilities.iter().any(|c| c == "measurePower") {
                    self.adopt(platform, device).await;
                    return Ok(true);
                }
            }
        }

        let devices = platform.list_devices().await?;
        let candidate = devices
            .into_iter()
            .find(|d| d.capabilities.iter().any(|c| c == "measurePower") && is_meter_like(d));

        match candidate {
            Some(device) => {
                self.adopt(platform, device).await;
                Ok(true)
            }
            None => {
                self.device_id = None;
                Ok(false)
            }
        }
    }

    async fn adopt(&mut self, _platform: &dyn Platform, device: DeviceSnapshot) {
        self.brand = Some(brand_label(&device));
        self.phase_capabilities = PHASE_CAPABILITY_SETS
            .into_iter()
            .find(|set| set.iter().all(|cap| device.capabilities.iter().any(|c| c == cap)));
        info!(device_id = %device.id, brand = ?self.brand, "meter discovered");
        self.device_id = Some(device.id);
    }

    /// Poll the meter once. Returns `None` if no meter is resolved.
    pub async fn poll(&mut self, platform: &dyn Platform) -> PlatformResult<Option<(Reading, [Option<f64>; 3])>> {
        let Some(device_id) = self.device_id.clone() else {
            return Ok(None);
        };

        let power = platform.get_capability_value(&device_id, "measurePower").await?;
        let watts = power.as_f64().unwrap_or(0.0);

        let mut phases = [None, None, None];
        if let Some(caps) = self.phase_capabilities {
            for (i, cap) in caps.iter().enumerate() {
                if let Ok(v) = platform.get_capability_value(&device_id, cap).await {
                    phases[i] = v.as_f64();
                }
            }
        }

        let now = Timestamp::now();
        self.last_reading_at = Some(now);
        if self.unavailable {
            platform.set_unavailable(false).await?;
            self.unavailable = false;
        }

        let mut reading = Reading::new(watts, ReadingSource::Poll).with_phases(phases[0], phases[1], phases[2]);
        reading.timestamp = now;
        Ok(Some((reading, phases)))
    }

    /// Watchdog pass: tear down and force rediscovery after prolonged
    /// silence, and mark the virtual device unavailable after a shorter one.
    pub async fn watchdog(&mut self, platform: &dyn Platform, silent_timeout_secs: i64, unavailable_timeout_secs: i64) -> PlatformResult<bool> {
        let silent_for = self
            .last_reading_at
            .map(|t| t.elapsed_ms() / 1000)
            .unwrap_or(i64::MAX);

        if self.device_id.is_none() || silent_for > silent_timeout_secs {
            warn!(silent_for, "meter silent past watchdog threshold, forcing rediscovery");
            self.device_id = None;
            return Ok(true);
        }

        if silent_for > unavailable_timeout_secs && !self.unavailable {
            platform.set_unavailable(true).await?;
            self.unavailable = true;
        }

        Ok(false)
    }
}

impl Default for MeterConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;
    use serde_json::json;

    fn meter_device(id: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            id: id.into(),
            name: "HAN Meter".into(),
            class: "meter".into(),
            driver_id: "han".into(),
            capabilities: vec!["measurePower".into()],
            owner_uri: None,
        }
    }

    #[tokio::test]
    async fn discovers_meter_by_class() {
        let platform = SimulatedPlatform::new();
        platform.add_device(meter_device("m1"));
        let mut connector = MeterConnector::new();
        let found = connector.discover(&platform, None).await.unwrap();
        assert!(found);
        assert_eq!(connector.device_id(), Some("m1"));
    }

    #[tokio::test]
    async fn ignores_non_meter_devices() {
        let platform = SimulatedPlatform::new();
        platform.add_device(DeviceSnapshot {
            capabilities: vec!["measurePower".into()],
            class: "socket".into(),
            name: "Kitchen plug".into(),
            driver_id: "generic".into(),
            ..meter_device("p1")
        });
        let mut connector = MeterConnector::new();
        let found = connector.discover(&platform, None).await.unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn poll_returns_reading() {
        let platform = SimulatedPlatform::new();
        platform.add_device(meter_device("m1"));
        platform.seed_capability("m1", "measurePower", json!(2500.0));
        let mut connector = MeterConnector::new();
        connector.discover(&platform, None).await.unwrap();
        let (reading, _) = connector.poll(&platform).await.unwrap().unwrap();
        assert_eq!(reading.total_watts, 2500.0);
    }

    #[tokio::test]
    async fn watchdog_forces_rediscovery_when_never_polled() {
        let platform = SimulatedPlatform::new();
        let mut connector = MeterConnector::new();
        let should_rediscover = connector.watchdog(&platform, 60, 30).await.unwrap();
        assert!(should_rediscover);
    }

    #[tokio::test]
    async fn watchdog_keeps_meter_after_recent_poll() {
        let platform = SimulatedPlatform::new();
        platform.add_device(meter_device("m1"));
        platform.seed_capability("m1", "measurePower", json!(1000.0));
        let mut connector = MeterConnector::new();
        connector.discover(&platform, None).await.unwrap();
        connector.poll(&platform).await.unwrap();
        let should_rediscover = connector.watchdog(&platform, 60, 30).await.unwrap();
        assert!(!should_rediscover);
    }
}
