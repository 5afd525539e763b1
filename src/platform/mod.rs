//! Abstraction over the host automation platform: device registry,
//! capability I/O, flow actions and the settings store. Every suspension
//! point the control core touches goes through this trait, the way the
//! battery/inverter/charger domain traits in a sibling controller isolate
//! the control loop from real hardware.

mod simulated;

pub use simulated::SimulatedPlatform;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub id: String,
    pub name: String,
    pub class: String,
    pub driver_id: String,
    pub capabilities: Vec<String>,
    pub owner_uri: Option<String>,
}

#[derive(Debug, Error, Clone)]
pub enum PlatformError {
    #[error("transient transport error: {0}")]
    TransientTransport(String),
    #[error("device not found: {0}")]
    DeviceGone(String),
    #[error("capability not supported: {0} on {1}")]
    CapabilityUnsupported(String, String),
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Clone)]
pub struct FlowAction {
    pub id: String,
    pub owner_uri: String,
}

/// The host automation platform surface the control core is written
/// against. A production implementation talks to the real host API; tests
/// and local development use [`SimulatedPlatform`].
#[async_trait]
pub trait Platform: Send + Sync {
    async fn list_devices(&self) -> PlatformResult<Vec<DeviceSnapshot>>;
    async fn get_device(&self, device_id: &str) -> PlatformResult<DeviceSnapshot>;
    async fn get_capability_value(&self, device_id: &str, capability: &str) -> PlatformResult<Value>;
    async fn set_capability(&self, device_id: &str, capability: &str, value: Value) -> PlatformResult<()>;
    async fn run_flow_action(&self, app_uri: &str, action_id: &str, args: Value) -> PlatformResult<()>;
    async fn list_flow_actions(&self) -> PlatformResult<Vec<FlowAction>>;

    async fn settings_get(&self, key: &str) -> PlatformResult<Option<Value>>;
    async fn settings_set(&self, key: &str, value: Value) -> PlatformResult<()>;

    async fn fire_trigger(&self, trigger_id: &str, tokens: Value) -> PlatformResult<()>;

    async fn set_alarm(&self, active: bool) -> PlatformResult<()>;
    async fn set_unavailable(&self, unavailable: bool) -> PlatformResult<()>;
}
