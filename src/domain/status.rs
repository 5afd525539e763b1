use serde::{Deserialize, Serialize};

use super::energy::HourlyEnergyRecord;
use super::priority::MitigatedEntry;
use super::settings::Profile;
use super::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ChargerDisplayStatus {
    Idle,
    Connected,
    Waiting,
    Completed,
    Charging,
    Dynamic,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerStatusEntry {
    pub device_id: String,
    pub name: String,
    pub power_w: f64,
    pub is_charging: bool,
    pub status: ChargerDisplayStatus,
    pub status_label: String,
    pub current_a: Option<f64>,
    pub circuit_limit_a: f64,
    pub charger_status: String,
    pub confirmed: bool,
    pub reliability: f64,
    pub offered_current: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticLogEntry {
    pub timestamp: Timestamp,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffekttariffStatus {
    pub tier_label: String,
    pub monthly_kw: f64,
    pub current_hour_kw: f64,
}

/// The full diagnostic payload returned by the supervisor's status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub enabled: bool,
    pub profile: Profile,
    pub current_power_w: f64,
    pub limit_w: f64,
    pub over_limit_count: u32,
    pub mitigated_devices: Vec<MitigatedEntry>,
    pub han_connected: bool,
    pub han_device_name: Option<String>,
    pub han_last_seen: Option<Timestamp>,
    pub log: Vec<DiagnosticLogEntry>,
    pub ev_chargers: Vec<ChargerStatusEntry>,
    pub hourly_energy: Vec<HourlyEnergyRecord>,
    pub effekttariff: EffekttariffStatus,
    pub last_mitigation_scan: Option<Timestamp>,
}
