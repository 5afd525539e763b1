//! C6 — threshold-driven mitigation: hysteresis, cooldown-gated load
//! shedding for non-charger devices, and LIFO restore once the smoothed
//! reading drops back under the limit. EV chargers are excluded throughout;
//! they are driven continuously by the charger controller (C5).

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::domain::{CapabilitySnapshot, CapabilityValue, MitigatedEntry, MitigationAction, PriorityEntry, Timestamp};
use crate::platform::{Platform, PlatformResult};

const TARGET_TEMPERATURE_STEP: f64 = 3.0;
const TARGET_TEMPERATURE_MIN: f64 = 5.0;
const HOIAX_LADDER: [f64; 5] = [3000.0, 2000.0, 1000.0, 500.0, 0.0];

fn value_to_capability(v: &Value) -> CapabilityValue {
    match v {
        Value::Bool(b) => CapabilityValue::Bool(*b),
        Value::Number(n) => CapabilityValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => CapabilityValue::Text(s.clone()),
        _ => CapabilityValue::None,
    }
}

fn next_rung_down(current: f64) -> Option<f64> {
    HOIAX_LADDER.iter().copied().find(|&rung| rung < current - 0.5)
}

pub struct MitigationEngine {
    mitigated: Vec<MitigatedEntry>,
    over_limit_count: u32,
    last_mitigation_time: Option<Timestamp>,
}

impl MitigationEngine {
    pub fn new() -> Self {
        Self {
            mitigated: Vec::new(),
            over_limit_count: 0,
            last_mitigation_time: None,
        }
    }

    pub fn mitigated(&self) -> &[MitigatedEntry] {
        &self.mitigated
    }

    pub fn restore_state(&mut self, mitigated: Vec<MitigatedEntry>) {
        self.mitigated = mitigated;
    }

    pub fn over_limit_count(&self) -> u32 {
        self.over_limit_count
    }

    /// Advance the hysteresis counter for one reading. Returns `true` on the
    /// single tick where the count crosses into the triggering threshold.
    pub fn record_reading(&mut self, smoothed_w: f64, limit_w: f64, hysteresis_count: u32) -> bool {
        if smoothed_w > limit_w {
            self.over_limit_count += 1;
            self.over_limit_count == hysteresis_count
        } else {
            self.over_limit_count = 0;
            false
        }
    }

    pub fn mitigation_permitted(&self, hysteresis_count: u32) -> bool {
        self.over_limit_count >= hysteresis_count
    }

    /// Force the hysteresis counter to the triggering threshold, used by the
    /// settings-change recheck to bypass the usual multi-reading debounce.
    pub fn force_over_limit(&mut self, hysteresis_count: u32) {
        self.over_limit_count = hysteresis_count;
    }

    /// Record the charger controller's (C5) latest target for `device_id` so
    /// status reporting and the next allocation decision can see it.
    /// `None`/`Some(0.0)` both mean paused.
    pub fn apply_charger_target(&mut self, device_id: &str, target: Option<f64>) {
        let target_a = target.unwrap_or(0.0);
        if let Some(existing) = self.mitigated.iter_mut().find(|m| m.device_id == device_id) {
            existing.current_target_a = Some(target_a);
            existing.mitigated_at = Timestamp::now();
        } else {
            let mut entry = MitigatedEntry::new(device_id, MitigationAction::DynamicCurrent, CapabilitySnapshot::new());
            entry.current_target_a = Some(target_a);
            self.mitigated.push(entry);
        }
    }

    fn cooldown_elapsed(&self, cooldown_seconds: u64) -> bool {
        match self.last_mitigation_time {
            None => true,
            Some(t) => t.elapsed_ms() >= cooldown_seconds as i64 * 1000,
        }
    }

    /// Drop entries whose device no longer appears in the priority list, or
    /// whose recorded action no longer matches (except `hoiax_power`, which
    /// is allowed to re-step without the list changing).
    pub fn prune_stale(&mut self, priority_list: &[PriorityEntry]) {
        self.mitigated.retain(|entry| {
            match priority_list.iter().find(|p| p.device_id == entry.device_id) {
                None => false,
                Some(p) => p.action == entry.action || entry.action == MitigationAction::HoiaxPower,
            }
        });
    }

    fn is_already_mitigated(&self, device_id: &str) -> bool {
        self.mitigated.iter().any(|m| m.device_id == device_id)
    }

    /// Run one mitigation cycle: walk the sorted, non-charger priority list
    /// and shed the first eligible device. Bypasses the cooldown check if
    /// `force` is set (used by the supervisor's settings-change recheck).
    pub async fn run_cycle(
        &mut self,
        platform: &dyn Platform,
        priority_list: &[PriorityEntry],
        cooldown_seconds: u64,
        force: bool,
    ) -> PlatformResult<bool> {
        if !force && !self.cooldown_elapsed(cooldown_seconds) {
            return Ok(false);
        }

        let mut sorted: Vec<&PriorityEntry> = priority_list
            .iter()
            .filter(|p| p.enabled && !p.action.is_charger_action())
            .collect();
        sorted.sort_by_key(|p| p.priority);

        let now = Timestamp::now();
        for entry in sorted {
            if self.is_already_mitigated(&entry.device_id) && entry.action != MitigationAction::HoiaxPower {
                continue;
            }
            if !entry.runtime_met(now) {
                continue;
            }

            match self.apply_action(platform, entry).await {
                Ok(Some(mut applied)) => {
                    applied.mitigated_at = now;
                    if let Some(existing) = self
                        .mitigated
                        .iter_mut()
                        .find(|m| m.device_id == entry.device_id && m.action == MitigationAction::HoiaxPower)
                    {
                        existing.mitigated_at = now;
                    } else {
                        self.mitigated.push(applied);
                    }
                    self.last_mitigation_time = Some(now);
                    platform
                        .fire_trigger("mitigation_applied", json!({"deviceId": entry.device_id, "action": entry.action.to_string()}))
                        .await?;
                    platform.set_alarm(true).await?;
                    info!(device_id = %entry.device_id, action = %entry.action, "mitigated device");
                    return Ok(true);
                }
                Ok(None) => {
                    warn!(device_id = %entry.device_id, "mitigation action had no effect, trying next");
                    continue;
                }
                Err(e) => {
                    warn!(device_id = %entry.device_id, error = %e, "mitigation action failed, trying next");
                    continue;
                }
            }
        }

        Ok(false)
    }

    async fn apply_action(&self, platform: &dyn Platform, entry: &PriorityEntry) -> PlatformResult<Option<MitigatedEntry>> {
        match entry.action {
            MitigationAction::Onoff => {
                let current = platform.get_capability_value(&entry.device_id, "onoff").await?;
                platform.set_capability(&entry.device_id, "onoff", json!(false)).await?;
                let snapshot = CapabilitySnapshot::new().with("onoff", value_to_capability(&current));
                Ok(Some(MitigatedEntry::new(&entry.device_id, entry.action, snapshot)))
            }
            MitigationAction::Dim => {
                let current = platform.get_capability_value(&entry.device_id, "dim").await?;
                if current.as_f64().unwrap_or(1.0) <= 0.0 {
                    return Ok(None);
                }
                platform.set_capability(&entry.device_id, "dim", json!(0.0)).await?;
                let snapshot = CapabilitySnapshot::new().with("dim", value_to_capability(&current));
                Ok(Some(MitigatedEntry::new(&entry.device_id, entry.action, snapshot)))
            }
            MitigationAction::TargetTemperature => {
                let current = platform.get_capability_value(&entry.device_id, "target_temperature").await?;
                let current_val = current.as_f64().unwrap_or(TARGET_TEMPERATURE_MIN);
                if current_val <= TARGET_TEMPERATURE_MIN {
                    return Ok(None);
                }
                let mut snapshot = CapabilitySnapshot::new().with("target_temperature", value_to_capability(&current));
                if let Ok(mode) = platform.get_capability_value(&entry.device_id, "thermostat_mode").await {
                    snapshot = snapshot.with("thermostat_mode", value_to_capability(&mode));
                    if mode.as_str() != Some("heat") {
                        platform.set_capability(&entry.device_id, "thermostat_mode", json!("heat")).await?;
                    }
                }
                let new_val = (current_val - TARGET_TEMPERATURE_STEP).max(TARGET_TEMPERATURE_MIN);
                platform.set_capability(&entry.device_id, "target_temperature", json!(new_val)).await?;
                Ok(Some(MitigatedEntry::new(&entry.device_id, entry.action, snapshot)))
            }
            MitigationAction::HoiaxPower => {
                let cap = if platform.get_capability_value(&entry.device_id, "max_power_3000").await.is_ok() {
                    "max_power_3000"
                } else {
                    "max_power"
                };
                let current = platform.get_capability_value(&entry.device_id, cap).await?;
                let current_val = current.as_f64().unwrap_or(0.0);
                let Some(next) = next_rung_down(current_val) else {
                    return Ok(None);
                };
                platform.set_capability(&entry.device_id, cap, json!(next)).await?;

                if let Some(existing) = self
                    .mitigated
                    .iter()
                    .find(|m| m.device_id == entry.device_id && m.action == MitigationAction::HoiaxPower)
                {
                    let mut carried = existing.clone();
                    carried.mitigated_at = Timestamp::now();
                    return Ok(Some(carried));
                }
                let snapshot = CapabilitySnapshot::new().with(cap, value_to_capability(&current));
                Ok(Some(MitigatedEntry::new(&entry.device_id, entry.action, snapshot)))
            }
            MitigationAction::ChargePause | MitigationAction::DynamicCurrent => Ok(None),
        }
    }

    /// Pop and restore the most recently mitigated non-charger device, if
    /// its `minOffTimeSeconds` has elapsed. Returns true if a restore
    /// happened and the mitigated list is now empty.
    pub async fn restore_ready(&mut self, platform: &dyn Platform, priority_list: &[PriorityEntry]) -> PlatformResult<bool> {
        let Some(pos) = self.mitigated.iter().rposition(|m| !m.action.is_charger_action()) else {
            return Ok(false);
        };

        let entry = &self.mitigated[pos];
        let min_off = priority_list
            .iter()
            .find(|p| p.device_id == entry.device_id)
            .map(|p| p.min_off_time_seconds)
            .unwrap_or(0);

        if entry.mitigated_at.elapsed_ms() < min_off as i64 * 1000 {
            return Ok(false);
        }

        let entry = self.mitigated.remove(pos);
        let restored = self.restore_device(platform, &entry).await;
        if let Err(e) = restored {
            warn!(device_id = %entry.device_id, error = %e, "restore failed, dropping entry anyway");
        }

        if self.mitigated.is_empty() {
            platform.fire_trigger("mitigation_cleared", json!({})).await?;
            platform.set_alarm(false).await?;
        }
        Ok(true)
    }

    /// Re-apply every capability captured in `entry.previous_state`, not
    /// just the one the mitigation action mutated directly (`TargetTemperature`
    /// also flips `thermostat_mode`, which must come back too).
    async fn restore_device(&self, platform: &dyn Platform, entry: &MitigatedEntry) -> PlatformResult<()> {
        if entry.action.is_charger_action() {
            return Ok(());
        }
        for (capability, value) in &entry.previous_state.0 {
            let value = match value {
                CapabilityValue::Bool(b) => json!(b),
                CapabilityValue::Number(n) => json!(n),
                CapabilityValue::Text(s) => json!(s),
                CapabilityValue::None => continue,
            };
            platform.set_capability(&entry.device_id, capability, value).await?;
        }
        Ok(())
    }
}

impl Default for MitigationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;

    fn device(id: &str, caps: &[&str]) -> crate::platform::DeviceSnapshot {
        crate::platform::DeviceSnapshot {
            id: id.into(),
            name: id.into(),
            class: "socket".into(),
            driver_id: "test".into(),
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
            owner_uri: None,
        }
    }

    #[test]
    fn hysteresis_fires_exactly_on_threshold_crossing() {
        let mut e = MitigationEngine::new();
        assert!(!e.record_reading(11000.0, 10000.0, 3));
        assert!(!e.record_reading(11000.0, 10000.0, 3));
        assert!(e.record_reading(11000.0, 10000.0, 3));
        assert!(!e.record_reading(11000.0, 10000.0, 3));
    }

    #[test]
    fn hysteresis_resets_below_limit() {
        let mut e = MitigationEngine::new();
        e.record_reading(11000.0, 10000.0, 3);
        e.record_reading(9000.0, 10000.0, 3);
        assert_eq!(e.over_limit_count(), 0);
    }

    #[tokio::test]
    async fn mitigates_onoff_device_and_fires_trigger() {
        let platform = SimulatedPlatform::new();
        platform.add_device(device("d1", &["onoff"]));
        platform.seed_capability("d1", "onoff", json!(true));
        let mut engine = MitigationEngine::new();
        let list = vec![PriorityEntry::new("d1", "Heater", 1, MitigationAction::Onoff)];

        let applied = engine.run_cycle(&platform, &list, 60, false).await.unwrap();
        assert!(applied);
        assert_eq!(platform.get_capability("d1", "onoff"), Some(json!(false)));
        assert_eq!(engine.mitigated().len(), 1);
        assert!(platform.is_alarm_active());
    }

    #[tokio::test]
    async fn skips_already_mitigated_device() {
        let platform = SimulatedPlatform::new();
        platform.add_device(device("d1", &["onoff"]));
        platform.add_device(device("d2", &["onoff"]));
        platform.seed_capability("d1", "onoff", json!(true));
        platform.seed_capability("d2", "onoff", json!(true));
        let mut engine = MitigationEngine::new();
        let list = vec![
            PriorityEntry::new("d1", "Heater", 1, MitigationAction::Onoff),
            PriorityEntry::new("d2", "Fan", 2, MitigationAction::Onoff),
        ];
        engine.run_cycle(&platform, &list, 60, false).await.unwrap();
        let applied_second = engine.run_cycle(&platform, &list, 60, true).await.unwrap();
        assert!(applied_second);
        assert_eq!(engine.mitigated().len(), 2);
    }

    #[tokio::test]
    async fn hoiax_steps_down_ladder_and_keeps_original_snapshot() {
        let platform = SimulatedPlatform::new();
        platform.add_device(device("d1", &["max_power_3000"]));
        platform.seed_capability("d1", "max_power_3000", json!(3000.0));
        let mut engine = MitigationEngine::new();
        let list = vec![PriorityEntry::new("d1", "Water heater", 1, MitigationAction::HoiaxPower)];

        engine.run_cycle(&platform, &list, 0, true).await.unwrap();
        assert_eq!(platform.get_capability("d1", "max_power_3000"), Some(json!(2000.0)));

        engine.run_cycle(&platform, &list, 0, true).await.unwrap();
        assert_eq!(platform.get_capability("d1", "max_power_3000"), Some(json!(1000.0)));
        assert_eq!(engine.mitigated().len(), 1);
        assert_eq!(
            engine.mitigated()[0].previous_state.get("max_power_3000"),
            Some(&CapabilityValue::Number(3000.0))
        );
    }

    #[tokio::test]
    async fn restore_waits_for_min_off_time() {
        let platform = SimulatedPlatform::new();
        platform.add_device(device("d1", &["onoff"]));
        platform.seed_capability("d1", "onoff", json!(true));
        let mut engine = MitigationEngine::new();
        let mut entry = PriorityEntry::new("d1", "Heater", 1, MitigationAction::Onoff);
        entry.min_off_time_seconds = 3600;
        let list = vec![entry];

        engine.run_cycle(&platform, &list, 0, true).await.unwrap();
        let restored = engine.restore_ready(&platform, &list).await.unwrap();
        assert!(!restored);
        assert_eq!(engine.mitigated().len(), 1);
    }

    #[tokio::test]
    async fn restore_reapplies_previous_state_and_clears_alarm() {
        let platform = SimulatedPlatform::new();
        platform.add_device(device("d1", &["onoff"]));
        platform.seed_capability("d1", "onoff", json!(true));
        let mut engine = MitigationEngine::new();
        let list = vec![PriorityEntry::new("d1", "Heater", 1, MitigationAction::Onoff)];

        engine.run_cycle(&platform, &list, 0, true).await.unwrap();
        let restored = engine.restore_ready(&platform, &list).await.unwrap();
        assert!(restored);
        assert_eq!(platform.get_capability("d1", "onoff"), Some(json!(true)));
        assert!(!platform.is_alarm_active());
        assert!(engine.mitigated().is_empty());
    }

    #[tokio::test]
    async fn restore_reapplies_thermostat_mode_alongside_target_temperature() {
        let platform = SimulatedPlatform::new();
        platform.add_device(device("d1", &["target_temperature", "thermostat_mode"]));
        platform.seed_capability("d1", "target_temperature", json!(21.0));
        platform.seed_capability("d1", "thermostat_mode", json!("auto"));
        let mut engine = MitigationEngine::new();
        let list = vec![PriorityEntry::new("d1", "Floor heating", 1, MitigationAction::TargetTemperature)];

        engine.run_cycle(&platform, &list, 0, true).await.unwrap();
        assert_eq!(platform.get_capability("d1", "thermostat_mode"), Some(json!("heat")));

        let restored = engine.restore_ready(&platform, &list).await.unwrap();
        assert!(restored);
        assert_eq!(platform.get_capability("d1", "target_temperature"), Some(json!(21.0)));
        assert_eq!(platform.get_capability("d1", "thermostat_mode"), Some(json!("auto")));
    }

    #[test]
    fn apply_charger_target_tracks_pause_and_resume() {
        let mut engine = MitigationEngine::new();
        engine.apply_charger_target("c1", None);
        assert_eq!(engine.mitigated()[0].current_target_a, Some(0.0));
        engine.apply_charger_target("c1", Some(16.0));
        assert_eq!(engine.mitigated().len(), 1);
        assert_eq!(engine.mitigated()[0].current_target_a, Some(16.0));
    }

    #[test]
    fn force_over_limit_sets_counter_to_threshold() {
        let mut engine = MitigationEngine::new();
        engine.force_over_limit(3);
        assert!(engine.mitigation_permitted(3));
    }

    #[test]
    fn prune_drops_entries_for_removed_devices() {
        let mut engine = MitigationEngine::new();
        let snapshot = CapabilitySnapshot::new().with("onoff", CapabilityValue::Bool(true));
        engine.mitigated.push(MitigatedEntry::new("gone", MitigationAction::Onoff, snapshot));
        engine.prune_stale(&[]);
        assert!(engine.mitigated().is_empty());
    }
}
