use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{DeviceSnapshot, FlowAction, Platform, PlatformError, PlatformResult};

#[derive(Default)]
struct Inner {
    devices: HashMap<String, DeviceSnapshot>,
    capabilities: HashMap<(String, String), Value>,
    flow_actions: Vec<FlowAction>,
    settings: HashMap<String, Value>,
    alarm: bool,
    unavailable: bool,
    fired_triggers: Vec<(String, Value)>,
    ran_flow_actions: Vec<(String, String, Value)>,
}

/// In-memory platform used by tests and local development. Mirrors the
/// `SimulatedBattery`/`SimulatedEvCharger` style of standing in for real
/// hardware: deterministic, introspectable, and safe to mutate freely.
pub struct SimulatedPlatform {
    inner: RwLock<Inner>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn add_device(&self, device: DeviceSnapshot) {
        self.inner.write().devices.insert(device.id.clone(), device);
    }

    pub fn seed_capability(&self, device_id: &str, capability: &str, value: Value) {
        self.inner
            .write()
            .capabilities
            .insert((device_id.to_string(), capability.to_string()), value);
    }

    pub fn add_flow_action(&self, id: &str, owner_uri: &str) {
        self.inner.write().flow_actions.push(FlowAction {
            id: id.to_string(),
            owner_uri: owner_uri.to_string(),
        });
    }

    pub fn get_capability(&self, device_id: &str, capability: &str) -> Option<Value> {
        self.inner
            .read()
            .capabilities
            .get(&(device_id.to_string(), capability.to_string()))
            .cloned()
    }

    pub fn fired_triggers(&self) -> Vec<(String, Value)> {
        self.inner.read().fired_triggers.clone()
    }

    pub fn ran_flow_actions(&self) -> Vec<(String, String, Value)> {
        self.inner.read().ran_flow_actions.clone()
    }

    pub fn is_alarm_active(&self) -> bool {
        self.inner.read().alarm
    }

    pub fn is_unavailable(&self) -> bool {
        self.inner.read().unavailable
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for SimulatedPlatform {
    async fn list_devices(&self) -> PlatformResult<Vec<DeviceSnapshot>> {
        Ok(self.inner.read().devices.values().cloned().collect())
    }

    async fn get_device(&self, device_id: &str) -> PlatformResult<DeviceSnapshot> {
        self.inner
            .read()
            .devices
            .get(device_id)
            .cloned()
            .ok_or_else(|| PlatformError::DeviceGone(device_id.to_string()))
    }

    async fn get_capability_value(&self, device_id: &str, capability: &str) -> PlatformResult<Value> {
        self.inner
            .read()
            .capabilities
            .get(&(device_id.to_string(), capability.to_string()))
            .cloned()
            .ok_or_else(|| PlatformError::CapabilityUnsupported(capability.to_string(), device_id.to_string()))
    }

    async fn set_capability(&self, device_id: &str, capability: &str, value: Value) -> PlatformResult<()> {
        if !self.inner.read().devices.contains_key(device_id) {
            return Err(PlatformError::DeviceGone(device_id.to_string()));
        }
        self.inner
            .write()
            .capabilities
            .insert((device_id.to_string(), capability.to_string()), value);
        Ok(())
    }

    async fn run_flow_action(&self, app_uri: &str, action_id: &str, args: Value) -> PlatformResult<()> {
        self.inner
            .write()
            .ran_flow_actions
            .push((app_uri.to_string(), action_id.to_string(), args));
        Ok(())
    }

    async fn list_flow_actions(&self) -> PlatformResult<Vec<FlowAction>> {
        Ok(self.inner.read().flow_actions.clone())
    }

    async fn settings_get(&self, key: &str) -> PlatformResult<Option<Value>> {
        Ok(self.inner.read().settings.get(key).cloned())
    }

    async fn settings_set(&self, key: &str, value: Value) -> PlatformResult<()> {
        self.inner.write().settings.insert(key.to_string(), value);
        Ok(())
    }

    async fn fire_trigger(&self, trigger_id: &str, tokens: Value) -> PlatformResult<()> {
        self.inner.write().fired_triggers.push((trigger_id.to_string(), tokens));
        Ok(())
    }

    async fn set_alarm(&self, active: bool) -> PlatformResult<()> {
        self.inner.write().alarm = active;
        Ok(())
    }

    async fn set_unavailable(&self, unavailable: bool) -> PlatformResult<()> {
        self.inner.write().unavailable = unavailable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            id: id.to_string(),
            name: id.to_string(),
            class: "socket".to_string(),
            driver_id: "test".to_string(),
            capabilities: vec!["onoff".to_string()],
            owner_uri: None,
        }
    }

    #[tokio::test]
    async fn set_capability_on_unknown_device_fails() {
        let p = SimulatedPlatform::new();
        let err = p.set_capability("ghost", "onoff", Value::Bool(false)).await;
        assert!(matches!(err, Err(PlatformError::DeviceGone(_))));
    }

    #[tokio::test]
    async fn round_trips_capability_values() {
        let p = SimulatedPlatform::new();
        p.add_device(device("d1"));
        p.set_capability("d1", "onoff", Value::Bool(true)).await.unwrap();
        let v = p.get_capability_value("d1", "onoff").await.unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[tokio::test]
    async fn fires_triggers_and_records_tokens() {
        let p = SimulatedPlatform::new();
        p.fire_trigger("power_limit_exceeded", serde_json::json!({"watts": 9000})).await.unwrap();
        assert_eq!(p.fired_triggers().len(), 1);
    }
}
