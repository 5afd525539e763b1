use serde::{Deserialize, Serialize};
use validator::Validate;

use super::priority::PriorityEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Profile {
    #[default]
    Normal,
    Strict,
    Solar,
}

impl Profile {
    pub fn limit_factor(&self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Strict => 0.8,
            Self::Solar => 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString, Default)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum VoltageSystem {
    #[default]
    Auto,
    #[serde(rename = "230v-1phase")]
    #[strum(serialize = "230v-1phase")]
    Single230v,
    #[serde(rename = "400v-3phase")]
    #[strum(serialize = "400v-3phase")]
    Three400v,
}

impl VoltageSystem {
    /// Line voltage used in watt<->amp conversions. `auto` resolves to the
    /// three-phase figure; callers with live phase data should prefer that
    /// over this constant.
    pub fn voltage(&self) -> f64 {
        match self {
            Self::Single230v => 230.0,
            Self::Three400v | Self::Auto => 692.0,
        }
    }
}

/// Persisted user-configurable settings (§3 Settings in the specification
/// this crate implements). Validated on every write via [`validator`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub profile: Profile,

    #[validate(range(min = 500.0, max = 100_000.0))]
    #[serde(default = "default_power_limit_w")]
    pub power_limit_w: f64,

    #[serde(default = "default_phase_limit")]
    pub phase_limit_a: [f64; 3],

    #[validate(range(min = 1, max = 60))]
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    #[validate(range(min = 1.0, max = 10.0))]
    #[serde(default = "default_spike_multiplier")]
    pub spike_multiplier: f64,

    #[validate(range(min = 1, max = 20))]
    #[serde(default = "default_hysteresis_count")]
    pub hysteresis_count: u32,

    #[validate(range(min = 0, max = 3600))]
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    #[serde(default)]
    pub voltage_system: VoltageSystem,

    #[serde(default = "default_phase_distribution")]
    pub phase_distribution: u8,

    #[validate(range(min = 6.0, max = 125.0))]
    #[serde(default = "default_main_circuit_a")]
    pub main_circuit_a: f64,

    #[serde(default)]
    pub priority_list: Vec<PriorityEntry>,

    #[serde(default)]
    pub selected_meter_device_id: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_power_limit_w() -> f64 {
    10_000.0
}
fn default_phase_limit() -> [f64; 3] {
    [32.0, 32.0, 32.0]
}
fn default_smoothing_window() -> usize {
    5
}
fn default_spike_multiplier() -> f64 {
    3.0
}
fn default_hysteresis_count() -> u32 {
    3
}
fn default_cooldown_seconds() -> u64 {
    60
}
fn default_phase_distribution() -> u8 {
    3
}
fn default_main_circuit_a() -> f64 {
    40.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            profile: Profile::default(),
            power_limit_w: default_power_limit_w(),
            phase_limit_a: default_phase_limit(),
            smoothing_window: default_smoothing_window(),
            spike_multiplier: default_spike_multiplier(),
            hysteresis_count: default_hysteresis_count(),
            cooldown_seconds: default_cooldown_seconds(),
            voltage_system: VoltageSystem::default(),
            phase_distribution: default_phase_distribution(),
            main_circuit_a: default_main_circuit_a(),
            priority_list: Vec::new(),
            selected_meter_device_id: None,
        }
    }
}

impl Settings {
    pub fn effective_limit_w(&self) -> f64 {
        self.power_limit_w * self.profile.limit_factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
    }

    #[test]
    fn effective_limit_applies_profile_factor() {
        let mut s = Settings {
            power_limit_w: 10_000.0,
            profile: Profile::Strict,
            ..Default::default()
        };
        assert_eq!(s.effective_limit_w(), 8_000.0);
        s.profile = Profile::Solar;
        assert_eq!(s.effective_limit_w(), 12_000.0);
    }

    #[test]
    fn out_of_range_power_limit_fails_validation() {
        let s = Settings {
            power_limit_w: 10.0,
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn voltage_system_resolves_line_voltage() {
        assert_eq!(VoltageSystem::Single230v.voltage(), 230.0);
        assert_eq!(VoltageSystem::Three400v.voltage(), 692.0);
    }
}
