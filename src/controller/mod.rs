//! C7 — the supervisor: owns every timer, the in-memory control state, and
//! persistence. Everything the API surface and the background tasks touch
//! goes through [`AppState`], a cheap `Arc` handle onto [`Supervisor`].

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::charger::allocator::{AllocationDecision, OptimalInputs};
use crate::charger::{ChargerAdapter, ChargerAllocator};
use crate::config::AppConfig;
use crate::domain::{
    effekt_tier_for, ChargerDisplayStatus, ChargerState, ChargerStatusEntry, ChargerVendor, DailyPeaks,
    DiagnosticLogEntry, EffekttariffStatus, EvLiveData, HourlyEnergy, MitigatedEntry, PriorityEntry, Settings,
    Status, Timestamp,
};
use crate::meter::MeterConnector;
use crate::mitigation::MitigationEngine;
use crate::pipeline::{HeadroomEstimate, SamplePipeline};
use crate::platform::Platform;

const MITIGATION_LOG_MAX: usize = 50;

/// Everything the supervisor persists across restarts, mirrored to a JSON
/// backup file and (best-effort) to the platform settings store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    settings: Option<Settings>,
    mitigated_devices: Vec<MitigatedEntry>,
    hourly_energy: Option<HourlyEnergy>,
    daily_peaks: Option<DailyPeaks>,
}

fn load_backup(path: &Path) -> PersistedState {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

struct ChargerRuntime {
    state: ChargerState,
    live: EvLiveData,
    circuit_limit_a: f64,
}

pub struct Supervisor {
    pub config: AppConfig,
    platform: Arc<dyn Platform>,
    settings: RwLock<Settings>,
    pipeline: RwLock<SamplePipeline>,
    meter: RwLock<MeterConnector>,
    mitigation: RwLock<MitigationEngine>,
    charger_adapter: ChargerAdapter,
    chargers: RwLock<HashMap<String, ChargerRuntime>>,
    log: RwLock<VecDeque<DiagnosticLogEntry>>,
    last_mitigation_scan: RwLock<Option<Timestamp>>,
    dirty: RwLock<bool>,
}

/// Cheap, `Clone`-able handle used as axum `State` and passed to background
/// tasks. All mutable state lives behind the inner `Arc<Supervisor>`.
#[derive(Clone)]
pub struct AppState(pub Arc<Supervisor>);

impl std::ops::Deref for AppState {
    type Target = Supervisor;
    fn deref(&self) -> &Supervisor {
        &self.0
    }
}

impl Supervisor {
    pub async fn new(config: AppConfig, platform: Arc<dyn Platform>) -> anyhow::Result<AppState> {
        let persisted = load_backup(&config.persistence.backup_file_path);
        let settings = persisted.settings.clone().unwrap_or_default();

        let mut pipeline = SamplePipeline::new(settings.smoothing_window, settings.spike_multiplier);
        if let (Some(hourly), Some(peaks)) = (persisted.hourly_energy.clone(), persisted.daily_peaks.clone()) {
            pipeline.restore_state(hourly, peaks);
        }

        let mut mitigation = MitigationEngine::new();
        mitigation.restore_state(persisted.mitigated_devices.clone());

        let charger_adapter = ChargerAdapter::new(
            Arc::clone(&platform),
            config.charger.max_retries,
            config.charger.retry_base_delay_ms,
        );

        let supervisor = Supervisor {
            config,
            platform,
            settings: RwLock::new(settings),
            pipeline: RwLock::new(pipeline),
            meter: RwLock::new(MeterConnector::new()),
            mitigation: RwLock::new(mitigation),
            charger_adapter,
            chargers: RwLock::new(HashMap::new()),
            log: RwLock::new(VecDeque::new()),
            last_mitigation_scan: RwLock::new(None),
            dirty: RwLock::new(false),
        };

        Ok(AppState(Arc::new(supervisor)))
    }

    async fn push_log(&self, level: &str, message: impl Into<String>) {
        let mut log = self.log.write().await;
        log.push_back(DiagnosticLogEntry {
            timestamp: Timestamp::now(),
            level: level.to_string(),
            message: message.into(),
        });
        while log.len() > MITIGATION_LOG_MAX {
            log.pop_front();
        }
    }

    /// Process one accepted total-power reading: pipeline ingest, the C5
    /// charger pass, then the C6 hysteresis/mitigation pass. Runs in that
    /// order for a single reading, as required by the ordering guarantees.
    pub async fn process_reading(&self, raw_watts: f64, phase_currents: [Option<f64>; 3]) {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            return;
        }

        let headroom = self.headroom_estimate(&settings).await;
        let outcome = {
            let mut pipeline = self.pipeline.write().await;
            pipeline.ingest(raw_watts, headroom)
        };
        if !outcome.accepted {
            return;
        }
        if outcome.rebaselined {
            self.push_log("warn", "power buffer rebaselined after repeated spikes").await;
        }

        let limit_w = settings.effective_limit_w();
        let phases: Option<[f64; 3]> = match phase_currents {
            [Some(a), Some(b), Some(c)] => Some([a, b, c]),
            _ => None,
        };

        self.run_charger_pass(&settings, outcome.smoothed_w, limit_w, phases).await;
        self.run_mitigation_pass(&settings, outcome.smoothed_w, limit_w, false).await;
    }

    async fn headroom_estimate(&self, settings: &Settings) -> HeadroomEstimate {
        let max_charger_w = settings
            .priority_list
            .iter()
            .filter(|p| p.action.is_charger_action())
            .map(|p| p.circuit_limit_a.min(32.0) * 692.0)
            .fold(0.0, f64::max);
        HeadroomEstimate {
            max_charger_w,
            max_heater_cycle_w: 3000.0,
        }
    }

    async fn run_charger_pass(&self, settings: &Settings, smoothed_w: f64, limit_w: f64, phase_currents: Option<[f64; 3]>) {
        let charger_entries: Vec<PriorityEntry> = settings
            .priority_list
            .iter()
            .filter(|p| p.enabled && p.action.is_charger_action())
            .cloned()
            .collect();

        for entry in charger_entries {
            let mut chargers = self.chargers.write().await;
            let Some(runtime) = chargers.get_mut(&entry.device_id) else {
                continue;
            };

            let inputs = OptimalInputs {
                smoothed_total_w: smoothed_w,
                limit_w,
                main_circuit_a: settings.main_circuit_a,
                phase_currents,
                charger_phase_indices: &[0, 1, 2][..entry.charger_phases as usize],
                live: &runtime.live,
            };

            let mut mitigation = self.mitigation.write().await;
            let prior_target = mitigation
                .mitigated()
                .iter()
                .find(|m| m.device_id == entry.device_id)
                .and_then(|m| m.current_target_a);

            let decision = ChargerAllocator::evaluate(&entry, &runtime.state, &inputs, prior_target);
            let circuit_limit_a = runtime.circuit_limit_a;
            drop(mitigation);

            if let AllocationDecision::Apply(target) = decision {
                match self
                    .charger_adapter
                    .set_current(&mut runtime.state, &entry.device_id, target, circuit_limit_a)
                    .await
                {
                    Ok(()) => {
                        runtime.state.last_adjust_time = Some(Timestamp::now());
                        let max_current = circuit_limit_a.min(32.0);
                        let was_limited = prior_target.map(|p| (p - max_current).abs() >= 0.5).unwrap_or(false);
                        let now_limited = (target.unwrap_or(0.0) - max_current).abs() >= 0.5;

                        let mut mitigation = self.mitigation.write().await;
                        mitigation.apply_charger_target(&entry.device_id, target);
                        drop(mitigation);

                        if now_limited && !was_limited {
                            let _ = self
                                .platform
                                .fire_trigger("mitigation_applied", json!({"deviceId": entry.device_id, "action": entry.action.to_string()}))
                                .await;
                        } else if !now_limited && was_limited {
                            let _ = self
                                .platform
                                .fire_trigger("mitigation_cleared", json!({"deviceId": entry.device_id}))
                                .await;
                        }
                        self.mark_dirty().await;
                    }
                    Err(e) => {
                        warn!(device_id = %entry.device_id, error = %e, "charger command failed");
                    }
                }
            }
        }
    }

    async fn run_mitigation_pass(&self, settings: &Settings, smoothed_w: f64, limit_w: f64, force: bool) {
        let mut mitigation = self.mitigation.write().await;
        let crossed = mitigation.record_reading(smoothed_w, limit_w, settings.hysteresis_count);
        if crossed {
            let _ = self
                .platform
                .fire_trigger("power_limit_exceeded", json!({"watts": smoothed_w}))
                .await;
            self.push_log("warn", format!("power limit exceeded: {:.0}W > {:.0}W", smoothed_w, limit_w)).await;
        }

        *self.last_mitigation_scan.write().await = Some(Timestamp::now());

        if smoothed_w <= limit_w {
            if mitigation.restore_ready(&*self.platform, &settings.priority_list).await.unwrap_or(false) {
                self.mark_dirty().await;
            }
            return;
        }

        if force || mitigation.mitigation_permitted(settings.hysteresis_count) {
            mitigation.prune_stale(&settings.priority_list);
            if mitigation
                .run_cycle(&*self.platform, &settings.priority_list, settings.cooldown_seconds, force)
                .await
                .unwrap_or(false)
            {
                self.mark_dirty().await;
            }
        }
    }

    async fn mark_dirty(&self) {
        *self.dirty.write().await = true;
    }

    /// Apply a new settings payload. If any control-relevant field changed,
    /// force an immediate recheck bypassing hysteresis and the EV throttle.
    pub async fn update_settings(&self, new_settings: Settings) -> Result<(), validator::ValidationErrors> {
        use validator::Validate;
        new_settings.validate()?;

        let force_recheck = {
            let current = self.settings.read().await;
            current.power_limit_w != new_settings.power_limit_w
                || current.profile != new_settings.profile
                || current.enabled != new_settings.enabled
                || current.phase_limit_a != new_settings.phase_limit_a
        };

        {
            let mut pipeline = self.pipeline.write().await;
            pipeline.set_tuning(new_settings.smoothing_window, new_settings.spike_multiplier);
        }
        *self.settings.write().await = new_settings.clone();
        self.mark_dirty().await;

        if force_recheck {
            let smoothed = self.pipeline.read().await.smoothed();
            let limit_w = new_settings.effective_limit_w();
            {
                let mut mitigation = self.mitigation.write().await;
                mitigation.force_over_limit(new_settings.hysteresis_count);
            }
            self.run_charger_pass(&new_settings, smoothed, limit_w, None).await;
            self.run_mitigation_pass(&new_settings, smoothed, limit_w, true).await;
        }

        Ok(())
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Persist current state to the backup file. Best-effort: failures are
    /// logged, never fatal.
    pub async fn persist(&self) {
        let mut dirty = self.dirty.write().await;
        if !*dirty {
            return;
        }
        let settings = self.settings.read().await.clone();
        let pipeline = self.pipeline.read().await;
        let mitigation = self.mitigation.read().await;
        let state = PersistedState {
            settings: Some(settings),
            mitigated_devices: mitigation.mitigated().to_vec(),
            hourly_energy: Some(pipeline.hourly_energy().clone()),
            daily_peaks: Some(pipeline.daily_peaks().clone()),
        };
        drop(pipeline);
        drop(mitigation);

        match serde_json::to_string_pretty(&state) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.config.persistence.backup_file_path, json) {
                    warn!(error = %e, "failed to write settings backup file");
                    return;
                }
                *dirty = false;
            }
            Err(e) => warn!(error = %e, "failed to serialize persisted state"),
        }
    }

    /// One meter poll + watchdog tick, feeding any reading into the pipeline.
    pub async fn meter_tick(&self) {
        let selected = self.settings.read().await.selected_meter_device_id.clone();
        let mut meter = self.meter.write().await;
        if meter.device_id().is_none() {
            match meter.discover(&*self.platform, selected.as_deref()).await {
                Ok(true) => info!("meter discovered"),
                Ok(false) => return,
                Err(e) => {
                    warn!(error = %e, "meter discovery failed");
                    return;
                }
            }
        }

        match meter.poll(&*self.platform).await {
            Ok(Some((reading, phases))) => {
                drop(meter);
                self.process_reading(reading.total_watts, phases).await;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "meter poll failed"),
        }
    }

    pub async fn meter_watchdog_tick(&self) {
        let mut meter = self.meter.write().await;
        let needs_rediscovery = meter
            .watchdog(
                &*self.platform,
                self.config.meter.silent_timeout_secs as i64,
                self.config.meter.unavailable_timeout_secs as i64,
            )
            .await
            .unwrap_or(false);
        if needs_rediscovery {
            self.push_log("warn", "meter watchdog forced rediscovery").await;
        }
    }

    /// Register a charger (from device-cache refresh) with its classified
    /// vendor so the charger pass can act on it.
    pub async fn register_charger(&self, device_id: &str, vendor: ChargerVendor, circuit_limit_a: f64) {
        let mut chargers = self.chargers.write().await;
        chargers.entry(device_id.to_string()).or_insert_with(|| ChargerRuntime {
            state: ChargerState::new(vendor),
            live: EvLiveData::default(),
            circuit_limit_a,
        });
    }

    pub async fn update_charger_live(&self, device_id: &str, live: EvLiveData) {
        let mut chargers = self.chargers.write().await;
        if let Some(runtime) = chargers.get_mut(device_id) {
            if let Some(offered) = live.offered_current {
                runtime.state.observe_offered(offered);
            }
            runtime.live = live;
        }
    }

    /// One charger-poll tick: register any charger newly added to the
    /// priority list (classifying its vendor from cached capabilities) and
    /// refresh live telemetry for every already-registered charger. This is
    /// also what drives confirmation outside of a just-dispatched command,
    /// since [`ChargerState::observe_offered`] only advances on a fresh
    /// `measure_current.offered` reading.
    pub async fn charger_poll_tick(&self) {
        let entries: Vec<PriorityEntry> = self
            .settings
            .read()
            .await
            .priority_list
            .iter()
            .filter(|p| p.action.is_charger_action())
            .cloned()
            .collect();

        for entry in &entries {
            let already_registered = self.chargers.read().await.contains_key(&entry.device_id);
            if !already_registered {
                match self.platform.get_device(&entry.device_id).await {
                    Ok(device) => match crate::charger::discovery::classify_vendor(&device) {
                        Some(vendor) => {
                            self.register_charger(&entry.device_id, vendor, entry.circuit_limit_a).await;
                        }
                        None => warn!(device_id = %entry.device_id, "charger capabilities did not match a known vendor"),
                    },
                    Err(e) => warn!(device_id = %entry.device_id, error = %e, "charger device lookup failed"),
                }
            }

            let power_w = self
                .platform
                .get_capability_value(&entry.device_id, "measure_power")
                .await
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let offered_current = self
                .platform
                .get_capability_value(&entry.device_id, "measure_current.offered")
                .await
                .ok()
                .and_then(|v| v.as_f64());
            let charger_status = self
                .platform
                .get_capability_value(&entry.device_id, "charger_status")
                .await
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let car_connected_alarm = self
                .platform
                .get_capability_value(&entry.device_id, "alarm_generic.car_connected")
                .await
                .ok()
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            self.update_charger_live(
                &entry.device_id,
                EvLiveData {
                    power_w,
                    is_charging: power_w > 100.0,
                    charger_status,
                    car_connected_alarm,
                    offered_current,
                },
            )
            .await;
        }
    }

    pub async fn get_status(&self) -> Status {
        let settings = self.settings.read().await.clone();
        let pipeline = self.pipeline.read().await;
        let mitigation = self.mitigation.read().await;
        let meter = self.meter.read().await;
        let chargers = self.chargers.read().await;
        let log = self.log.read().await;

        let monthly_kw = pipeline.daily_peaks().top3_mean();
        let tier = effekt_tier_for(monthly_kw);

        let ev_chargers = settings
            .priority_list
            .iter()
            .filter(|p| p.action.is_charger_action())
            .filter_map(|p| {
                let runtime = chargers.get(&p.device_id)?;
                let mitigated = mitigation.mitigated().iter().find(|m| m.device_id == p.device_id);
                let status = display_status(runtime, mitigated);
                Some(ChargerStatusEntry {
                    device_id: p.device_id.clone(),
                    name: p.name.clone(),
                    power_w: runtime.live.power_w,
                    is_charging: runtime.live.is_charging,
                    status,
                    status_label: status.to_string(),
                    current_a: runtime.state.last_command_a,
                    circuit_limit_a: runtime.circuit_limit_a,
                    charger_status: runtime.live.charger_status.clone(),
                    confirmed: runtime.state.confirmed,
                    reliability: runtime.state.reliability,
                    offered_current: runtime.live.offered_current,
                })
            })
            .collect();

        Status {
            enabled: settings.enabled,
            profile: settings.profile,
            current_power_w: pipeline.smoothed(),
            limit_w: settings.effective_limit_w(),
            over_limit_count: mitigation.over_limit_count(),
            mitigated_devices: mitigation.mitigated().to_vec(),
            han_connected: meter.device_id().is_some(),
            han_device_name: meter.brand().map(str::to_string),
            han_last_seen: None,
            log: log.iter().cloned().collect(),
            ev_chargers,
            hourly_energy: pipeline.hourly_energy().history.iter().cloned().collect(),
            effekttariff: EffekttariffStatus {
                tier_label: tier.label.to_string(),
                monthly_kw,
                current_hour_kw: pipeline.hourly_energy().current_kwh(),
            },
            last_mitigation_scan: *self.last_mitigation_scan.read().await,
        }
    }
}

fn display_status(runtime: &ChargerRuntime, mitigated: Option<&MitigatedEntry>) -> ChargerDisplayStatus {
    if let Some(m) = mitigated {
        return match m.current_target_a {
            Some(a) if a > 0.0 => ChargerDisplayStatus::Dynamic,
            _ => ChargerDisplayStatus::Paused,
        };
    }
    if !runtime.live.is_connected(runtime.state.vendor) {
        return ChargerDisplayStatus::Idle;
    }
    if runtime.live.is_charging {
        ChargerDisplayStatus::Charging
    } else {
        ChargerDisplayStatus::Connected
    }
}

/// Spawn the supervisor's background timers: meter poll/watchdog, charger
/// poll, and the settings-save-queue drain. Returns immediately; tasks run
/// until the process exits.
pub fn spawn_controller_tasks(state: AppState) {
    let meter_state = state.clone();
    let meter_interval = Duration::from_secs(meter_state.config.meter.poll_interval_secs);
    tokio::spawn(async move {
        let mut ticker = interval(meter_interval);
        loop {
            ticker.tick().await;
            meter_state.meter_tick().await;
        }
    });

    let watchdog_state = state.clone();
    let watchdog_interval = Duration::from_secs(watchdog_state.config.meter.watchdog_interval_secs);
    tokio::spawn(async move {
        let mut ticker = interval(watchdog_interval);
        loop {
            ticker.tick().await;
            watchdog_state.meter_watchdog_tick().await;
        }
    });

    let charger_state = state.clone();
    let charger_interval = Duration::from_secs(charger_state.config.charger.poll_interval_secs);
    tokio::spawn(async move {
        let mut ticker = interval(charger_interval);
        loop {
            ticker.tick().await;
            charger_state.charger_poll_tick().await;
        }
    });

    let persist_state = state.clone();
    let drain_interval = Duration::from_secs(persist_state.config.persistence.save_queue_drain_secs);
    tokio::spawn(async move {
        let mut ticker = interval(drain_interval);
        loop {
            ticker.tick().await;
            persist_state.persist().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChargerConfig, MeterConfig, PersistenceConfig, ServerConfig, TelemetryConfig};
    use crate::domain::{MitigationAction, Profile};
    use crate::platform::SimulatedPlatform;

    fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                request_timeout_secs: 10,
                enable_cors: true,
            },
            meter: MeterConfig {
                poll_interval_secs: 10,
                event_staleness_secs: 8,
                watchdog_interval_secs: 10,
                silent_timeout_secs: 60,
                unavailable_timeout_secs: 30,
            },
            charger: ChargerConfig {
                poll_interval_secs: 5,
                max_retries: 2,
                retry_base_delay_ms: 10,
                confirmation_timeout_ms: 60_000,
            },
            persistence: PersistenceConfig {
                backup_file_path: std::env::temp_dir().join(format!("loadguard-test-{}.json", std::process::id())),
                save_queue_drain_secs: 3,
                max_write_retries: 2,
            },
            telemetry: TelemetryConfig {
                log_level: "info".into(),
                log_json: false,
            },
        }
    }

    async fn supervisor() -> (AppState, Arc<SimulatedPlatform>) {
        let platform = Arc::new(SimulatedPlatform::new());
        let state = Supervisor::new(test_config(), Arc::clone(&platform) as Arc<dyn Platform>)
            .await
            .unwrap();
        (state, platform)
    }

    #[tokio::test]
    async fn fresh_supervisor_reports_default_settings_in_status() {
        let (state, _platform) = supervisor().await;
        let status = state.get_status().await;
        assert!(status.enabled);
        assert_eq!(status.profile, Profile::Normal);
        assert_eq!(status.over_limit_count, 0);
        assert!(status.mitigated_devices.is_empty());
    }

    #[tokio::test]
    async fn process_reading_over_limit_mitigates_after_hysteresis() {
        let (state, platform) = supervisor().await;
        platform.add_device(crate::platform::DeviceSnapshot {
            id: "heater".into(),
            name: "Heater".into(),
            class: "socket".into(),
            driver_id: "test".into(),
            capabilities: vec!["onoff".into()],
            owner_uri: None,
        });
        platform.seed_capability("heater", "onoff", serde_json::json!(true));

        let mut settings = Settings::default();
        settings.power_limit_w = 5_000.0;
        settings.hysteresis_count = 2;
        settings.smoothing_window = 1;
        settings.priority_list.push(PriorityEntry::new("heater", "Heater", 1, MitigationAction::Onoff));
        state.update_settings(settings).await.unwrap();

        for _ in 0..3 {
            state.process_reading(6_000.0, [None, None, None]).await;
        }

        let status = state.get_status().await;
        assert_eq!(status.mitigated_devices.len(), 1);
        assert_eq!(platform.get_capability("heater", "onoff"), Some(serde_json::json!(false)));
    }

    #[tokio::test]
    async fn update_settings_rejects_invalid_power_limit() {
        let (state, _platform) = supervisor().await;
        let mut settings = Settings::default();
        settings.power_limit_w = 10.0;
        assert!(state.update_settings(settings).await.is_err());
    }

    #[tokio::test]
    async fn charger_poll_tick_registers_and_refreshes_unregistered_charger() {
        let (state, platform) = supervisor().await;
        platform.add_device(crate::platform::DeviceSnapshot {
            id: "c1".into(),
            name: "Charger".into(),
            class: "evcharger".into(),
            driver_id: "easee".into(),
            capabilities: vec!["dynamic_charger_current".into(), "onoff".into()],
            owner_uri: None,
        });
        platform.seed_capability("c1", "measure_power", serde_json::json!(4500.0));
        platform.seed_capability("c1", "measure_current.offered", serde_json::json!(19.5));

        let mut settings = Settings::default();
        settings
            .priority_list
            .push(PriorityEntry::new("c1", "Charger", 5, MitigationAction::DynamicCurrent));
        state.update_settings(settings).await.unwrap();

        state.charger_poll_tick().await;

        let status = state.get_status().await;
        assert_eq!(status.ev_chargers.len(), 1);
        assert_eq!(status.ev_chargers[0].power_w, 4500.0);
        assert!(status.ev_chargers[0].is_charging);
        assert_eq!(status.ev_chargers[0].offered_current, Some(19.5));
    }

    #[tokio::test]
    async fn registered_charger_in_priority_list_appears_in_status() {
        let (state, _platform) = supervisor().await;
        state.register_charger("c1", ChargerVendor::EaseeLike, 32.0).await;
        state
            .update_charger_live(
                "c1",
                EvLiveData {
                    power_w: 3000.0,
                    is_charging: true,
                    charger_status: "charging".into(),
                    car_connected_alarm: true,
                    offered_current: Some(13.0),
                },
            )
            .await;

        let mut settings = Settings::default();
        settings
            .priority_list
            .push(PriorityEntry::new("c1", "Charger", 5, MitigationAction::DynamicCurrent));
        state.update_settings(settings).await.unwrap();

        let status = state.get_status().await;
        assert_eq!(status.ev_chargers.len(), 1);
        assert_eq!(status.ev_chargers[0].power_w, 3000.0);
        assert!(status.ev_chargers[0].is_charging);
    }
}
