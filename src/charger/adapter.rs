//! C4 — vendor-abstract charger adapter. One operation,
//! [`ChargerAdapter::set_current`], dispatches the correct capability/flow
//! action sequence for the charger's vendor and updates the charger's
//! command-confirmation state.
//!
//! The per-vendor command tables mirror the pause/set/resume sequencing an
//! OCPP-style EV charger driver uses, generalized from a single protocol to
//! three capability-driven vendors.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::domain::{ChargerState, ChargerVendor};
use crate::platform::{Platform, PlatformError, PlatformResult};

use super::allocator::MIN_CURRENT_A;
use super::discovery::VendorDiscovery;

/// `None` pauses; `Some(amps)` sets a dynamic current limit.
pub type CurrentCommand = Option<f64>;

pub struct ChargerAdapter {
    platform: Arc<dyn Platform>,
    discovery: VendorDiscovery,
    max_retries: u32,
    retry_base_delay_ms: u64,
    redirects: Mutex<std::collections::HashMap<String, String>>,
}

impl ChargerAdapter {
    pub fn new(platform: Arc<dyn Platform>, max_retries: u32, retry_base_delay_ms: u64) -> Self {
        Self {
            platform,
            discovery: VendorDiscovery::new(),
            max_retries,
            retry_base_delay_ms,
            redirects: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Resolve a possibly-redirected device id (Zaptec auto-redirect: the
    /// configured device has no charging-control capability, so commands
    /// are routed to a sibling device that does).
    pub fn resolve_device_id(&self, configured_id: &str) -> String {
        self.redirects
            .lock()
            .get(configured_id)
            .cloned()
            .unwrap_or_else(|| configured_id.to_string())
    }

    pub fn set_redirect(&self, configured_id: &str, real_id: &str) {
        self.redirects
            .lock()
            .insert(configured_id.to_string(), real_id.to_string());
    }

    /// Dispatch a current command, honoring the 15s pending-command guard
    /// and retrying transient transport errors with exponential backoff.
    pub async fn set_current(
        &self,
        state: &mut ChargerState,
        device_id: &str,
        command: CurrentCommand,
        circuit_limit_a: f64,
    ) -> PlatformResult<()> {
        if state.has_pending_command() {
            debug!(device_id, "command rejected, pending command guard active");
            return Err(PlatformError::TransientTransport("pending command guard active".into()));
        }

        let resolved_id = self.resolve_device_id(device_id);
        let mut attempt = 0;
        loop {
            let result = self.dispatch_once(&resolved_id, state.vendor, command, circuit_limit_a).await;
            match result {
                Ok(()) => {
                    state.record_command(command);
                    return Ok(());
                }
                Err(PlatformError::TransientTransport(msg)) if attempt < self.max_retries => {
                    warn!(device_id, attempt, error = %msg, "charger command failed, retrying");
                    sleep(Duration::from_millis(self.retry_base_delay_ms * 2u64.pow(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch_once(
        &self,
        device_id: &str,
        vendor: ChargerVendor,
        command: CurrentCommand,
        circuit_limit_a: f64,
    ) -> PlatformResult<()> {
        match vendor {
            ChargerVendor::EaseeLike => self.dispatch_easee(device_id, command, circuit_limit_a).await,
            ChargerVendor::Zaptec => self.dispatch_zaptec(device_id, command).await,
            ChargerVendor::Enua => self.dispatch_enua(device_id, command).await,
        }
    }

    async fn dispatch_easee(&self, device_id: &str, command: CurrentCommand, circuit_limit_a: f64) -> PlatformResult<()> {
        match command {
            None => {
                self.platform.set_capability(device_id, "onoff", json!(false)).await?;
                let _ = self.platform.set_capability(device_id, "target_circuit_current", json!(0)).await;
            }
            Some(amps) => {
                let current_cap = self
                    .first_available_capability(
                        device_id,
                        &[
                            "dynamic_charger_current",
                            "dynamicChargerCurrent",
                            "dynamicCircuitCurrentP1",
                            "target_charger_current",
                        ],
                    )
                    .await
                    .unwrap_or("dynamic_charger_current");
                self.platform.set_capability(device_id, current_cap, json!(amps)).await?;
                self.platform
                    .set_capability(device_id, "target_circuit_current", json!(circuit_limit_a))
                    .await?;
                self.platform.set_capability(device_id, "onoff", json!(true)).await?;
            }
        }
        Ok(())
    }

    async fn dispatch_zaptec(&self, device_id: &str, command: CurrentCommand) -> PlatformResult<()> {
        let action = self
            .discovery
            .discover_current_action(&*self.platform, ChargerVendor::Zaptec, "homey:app:com.zaptec")
            .await?;
        match command {
            None => {
                self.platform.set_capability(device_id, "charging_button", json!(false)).await?;
                let _ = self
                    .platform
                    .run_flow_action(&action.owner_uri, &action.id, json!({"current1": 0, "current2": 0, "current3": 0}))
                    .await;
            }
            Some(amps) => {
                let clamped = amps.clamp(MIN_CURRENT_A, 40.0);
                self.platform
                    .run_flow_action(
                        &action.owner_uri,
                        &action.id,
                        json!({"current1": clamped, "current2": clamped, "current3": clamped}),
                    )
                    .await?;
                self.platform.set_capability(device_id, "charging_button", json!(true)).await?;
            }
        }
        Ok(())
    }

    async fn dispatch_enua(&self, device_id: &str, command: CurrentCommand) -> PlatformResult<()> {
        let action = self
            .discovery
            .discover_current_action(&*self.platform, ChargerVendor::Enua, "homey:app:com.enua")
            .await?;
        match command {
            None => {
                self.platform
                    .set_capability(device_id, "toggleChargingCapability", json!(false))
                    .await?;
            }
            Some(amps) => {
                let clamped = amps.clamp(MIN_CURRENT_A, 32.0);
                self.platform
                    .run_flow_action(&action.owner_uri, &action.id, json!({"current": clamped}))
                    .await?;
                self.platform
                    .set_capability(device_id, "toggleChargingCapability", json!(true))
                    .await?;
            }
        }
        Ok(())
    }

    async fn first_available_capability(&self, device_id: &str, candidates: &[&'static str]) -> Option<&'static str> {
        for cap in candidates {
            if self.platform.get_capability_value(device_id, cap).await.is_ok() {
                return Some(cap);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;

    fn device(id: &str) -> crate::platform::DeviceSnapshot {
        crate::platform::DeviceSnapshot {
            id: id.into(),
            name: id.into(),
            class: "evcharger".into(),
            driver_id: "easee".into(),
            capabilities: vec!["dynamic_charger_current".into(), "onoff".into()],
            owner_uri: None,
        }
    }

    #[tokio::test]
    async fn dispatch_easee_sets_current_and_turns_on() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.add_device(device("c1"));
        platform.seed_capability("c1", "dynamic_charger_current", json!(0));
        let adapter = ChargerAdapter::new(platform.clone(), 2, 10);
        let mut state = ChargerState::new(ChargerVendor::EaseeLike);

        adapter.set_current(&mut state, "c1", Some(16.0), 32.0).await.unwrap();

        assert_eq!(platform.get_capability("c1", "onoff"), Some(json!(true)));
        assert_eq!(state.last_command_a, Some(16.0));
    }

    #[tokio::test]
    async fn pending_guard_rejects_second_command() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.add_device(device("c1"));
        platform.seed_capability("c1", "dynamic_charger_current", json!(0));
        let adapter = ChargerAdapter::new(platform, 2, 10);
        let mut state = ChargerState::new(ChargerVendor::EaseeLike);
        adapter.set_current(&mut state, "c1", Some(16.0), 32.0).await.unwrap();

        let result = adapter.set_current(&mut state, "c1", Some(10.0), 32.0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn pause_turns_off_and_zeroes_circuit_current() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.add_device(device("c1"));
        let adapter = ChargerAdapter::new(platform.clone(), 2, 10);
        let mut state = ChargerState::new(ChargerVendor::EaseeLike);

        adapter.set_current(&mut state, "c1", None, 32.0).await.unwrap();

        assert_eq!(platform.get_capability("c1", "onoff"), Some(json!(false)));
    }

    #[tokio::test]
    async fn zaptec_clamps_current_to_vendor_range() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.add_device(crate::platform::DeviceSnapshot {
            capabilities: vec!["charging_button".into()],
            driver_id: "zaptec".into(),
            ..device("z1")
        });
        let adapter = ChargerAdapter::new(platform.clone(), 2, 10);
        let mut state = ChargerState::new(ChargerVendor::Zaptec);

        adapter.set_current(&mut state, "z1", Some(50.0), 32.0).await.unwrap();

        let ran = platform.ran_flow_actions();
        assert_eq!(ran.len(), 1);
        assert_eq!(ran[0].2["current1"], 40.0);
    }
}
