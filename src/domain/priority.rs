use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::Timestamp;

/// The mitigation action a priority-list entry performs when chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MitigationAction {
    Onoff,
    Dim,
    TargetTemperature,
    HoiaxPower,
    ChargePause,
    DynamicCurrent,
}

impl MitigationAction {
    /// EV-charger actions are driven continuously by the charger controller
    /// (C5), not by the threshold-triggered mitigation cycle (C6).
    pub fn is_charger_action(&self) -> bool {
        matches!(self, Self::ChargePause | Self::DynamicCurrent)
    }
}

/// One entry in the ordered mitigation priority list. Lower `priority` is
/// considered earlier in a mitigation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub device_id: String,
    pub name: String,
    pub priority: i32,
    pub action: MitigationAction,
    pub enabled: bool,
    pub min_runtime_seconds: u64,
    pub min_off_time_seconds: u64,
    pub circuit_limit_a: f64,
    pub charger_phases: u8,
    pub started_at: Option<Timestamp>,
}

impl PriorityEntry {
    pub fn new(device_id: impl Into<String>, name: impl Into<String>, priority: i32, action: MitigationAction) -> Self {
        Self {
            device_id: device_id.into(),
            name: name.into(),
            priority,
            action,
            enabled: true,
            min_runtime_seconds: 0,
            min_off_time_seconds: 0,
            circuit_limit_a: 32.0,
            charger_phases: 3,
            started_at: None,
        }
    }

    pub fn runtime_met(&self, now: Timestamp) -> bool {
        match self.started_at {
            None => true,
            Some(start) => now.duration_since(&start).as_seconds() as u64 >= self.min_runtime_seconds,
        }
    }
}

/// A single capability value captured before mitigation, so it can be
/// restored byte-for-byte when the load is released.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
    Text(String),
    None,
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Snapshot of every capability a mitigation action mutates, captured
/// before the action runs so restoring it can put all of them back.
/// `TargetTemperature` is the example that needs more than one key: it
/// writes both `target_temperature` and `thermostat_mode`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CapabilitySnapshot(pub Vec<(String, CapabilityValue)>);

impl CapabilitySnapshot {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, capability: impl Into<String>, value: CapabilityValue) -> Self {
        self.0.push((capability.into(), value));
        self
    }

    pub fn get(&self, capability: &str) -> Option<&CapabilityValue> {
        self.0.iter().find(|(k, _)| k == capability).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Record of a currently-mitigated device. Invariant: at most one
/// [`MitigatedEntry`] exists per `device_id` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigatedEntry {
    pub device_id: String,
    pub action: MitigationAction,
    pub previous_state: CapabilitySnapshot,
    pub mitigated_at: Timestamp,
    /// Only meaningful for `DynamicCurrent`: `None`/`Some(0.0)` means paused.
    pub current_target_a: Option<f64>,
}

impl MitigatedEntry {
    pub fn new(device_id: impl Into<String>, action: MitigationAction, previous_state: CapabilitySnapshot) -> Self {
        Self {
            device_id: device_id.into(),
            action,
            previous_state,
            mitigated_at: Timestamp::now(),
            current_target_a: None,
        }
    }
}
