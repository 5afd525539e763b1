//! C5 — continuous per-reading headroom allocation for a single EV charger.
//! Pure decision logic lives in [`calc_optimal`]; [`ChargerAllocator`] wraps
//! it with the connection gate, throttle and apply-decision rules.

use crate::domain::{ChargerState, ChargerVendor, EvLiveData, PriorityEntry};

pub const MIN_CURRENT_A: f64 = 7.0;
pub const START_CURRENT_A: f64 = 11.0;

fn voltage_for(phases: u8) -> f64 {
    if phases == 1 {
        230.0
    } else {
        692.0
    }
}

/// Inputs needed by [`calc_optimal`] beyond the priority entry's own fields.
pub struct OptimalInputs<'a> {
    pub smoothed_total_w: f64,
    pub limit_w: f64,
    pub main_circuit_a: f64,
    pub phase_currents: Option<[f64; 3]>,
    pub charger_phase_indices: &'a [usize],
    pub live: &'a EvLiveData,
}

/// Compute the target charger current for this reading, or `None` to pause.
/// Implements both the phase-aware path (when per-phase currents are
/// available) and the watt-only fallback.
pub fn calc_optimal(entry: &PriorityEntry, inputs: &OptimalInputs) -> Option<f64> {
    let max_current = entry.circuit_limit_a.min(32.0);
    let phases = entry.charger_phases;
    let voltage = voltage_for(phases);

    let charger_power_w = inputs.live.power_w;
    let offered = inputs.live.offered_current;

    if let Some(phase_currents) = inputs.phase_currents {
        let charger_contribution_per_phase = if let Some(off) = offered.filter(|_| charger_power_w > 200.0) {
            off
        } else if charger_power_w > 0.0 {
            charger_power_w / (phases as f64 * 230.0)
        } else {
            0.0
        };

        let mut available_candidates = Vec::new();
        for &i in inputs.charger_phase_indices {
            let phase_total = phase_currents[i];
            let non_charger = (phase_total - charger_contribution_per_phase).max(0.0);
            if non_charger >= inputs.main_circuit_a - 1.5 {
                return None;
            }
            available_candidates.push(inputs.main_circuit_a - non_charger - 1.5);
        }
        let mut available_a = available_candidates
            .into_iter()
            .fold(f64::INFINITY, f64::min);

        let non_charger_w = (inputs.smoothed_total_w - charger_power_w).max(0.0);
        let watt_bound_a = (inputs.limit_w - non_charger_w - 200.0) / voltage;
        available_a = available_a.min(watt_bound_a);

        if available_a < MIN_CURRENT_A {
            if non_charger_w > inputs.limit_w - 200.0 {
                return None;
            }
            return Some(MIN_CURRENT_A);
        }
        return Some(available_a.floor().clamp(MIN_CURRENT_A, max_current));
    }

    // Watt-only fallback: no per-phase data available.
    let non_charger_w = inputs.smoothed_total_w - charger_power_w;
    let phase_factor = if phases == 3 { 3f64.sqrt() } else { 1.0 };
    let max_fuse_drain_w = phase_factor * 230.0 * inputs.main_circuit_a;

    if non_charger_w > inputs.limit_w - 200.0 {
        return None;
    }

    let available_w = (inputs.limit_w - non_charger_w - 200.0).min(max_fuse_drain_w - non_charger_w - 200.0);

    if available_w <= 0.0 {
        return Some(MIN_CURRENT_A);
    }

    let target = if let Some(off) = offered.filter(|o| *o > 0.0 && charger_power_w > 500.0) {
        (off * (available_w / charger_power_w)).round()
    } else {
        (available_w / voltage).floor()
    };

    Some(target.clamp(MIN_CURRENT_A, max_current))
}

/// Decision produced by [`ChargerAllocator::evaluate`] for the supervisor to
/// act on: either dispatch a new current command or do nothing this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AllocationDecision {
    Skip,
    Apply(Option<f64>),
}

pub struct ChargerAllocator;

impl ChargerAllocator {
    /// Evaluate one charger for the current reading. `prior_target` is the
    /// charger's current `MitigatedEntry.current_target_a`, if any.
    pub fn evaluate(
        entry: &PriorityEntry,
        state: &ChargerState,
        inputs: &OptimalInputs,
        prior_target: Option<f64>,
    ) -> AllocationDecision {
        if !inputs.live.is_connected(state.vendor) {
            return AllocationDecision::Skip;
        }

        let overload_w = (inputs.smoothed_total_w - inputs.limit_w).max(0.0);
        if state.throttled(overload_w) {
            return AllocationDecision::Skip;
        }

        let target = calc_optimal(entry, inputs);
        let target_norm = target.unwrap_or(0.0);
        let max_current = entry.circuit_limit_a.min(32.0);

        if prior_target.is_none() && (target_norm - max_current).abs() < 0.5 {
            return AllocationDecision::Skip;
        }

        if let Some(p) = prior_target {
            if (target_norm - p).abs() < 1.0 {
                return AllocationDecision::Skip;
            }
        }

        let was_paused = prior_target.map(|t| t == 0.0).unwrap_or(false);
        if was_paused {
            if let Some(t) = target {
                if t < START_CURRENT_A {
                    return AllocationDecision::Skip;
                }
            }
        }

        AllocationDecision::Apply(target)
    }
}
