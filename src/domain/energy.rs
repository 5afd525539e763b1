use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::types::Timestamp;

/// One completed hour's worth of accumulated consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyEnergyRecord {
    pub hour: u32,
    pub date: String,
    pub kwh: f64,
}

/// Running accumulator for the current hour plus a bounded history of
/// completed hours (invariant I4: `history.len() <= 24`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyEnergy {
    pub current_hour: u32,
    pub accumulated_wh: f64,
    pub last_reading_w: Option<f64>,
    pub last_reading_time: Option<Timestamp>,
    pub history: VecDeque<HourlyEnergyRecord>,
}

impl Default for HourlyEnergy {
    fn default() -> Self {
        Self {
            current_hour: Timestamp::now().hour(),
            accumulated_wh: 0.0,
            last_reading_w: None,
            last_reading_time: None,
            history: VecDeque::new(),
        }
    }
}

impl HourlyEnergy {
    pub const HISTORY_CAPACITY: usize = 24;
    /// Gaps at or above this are treated as a restart / missed readings and
    /// contribute no energy.
    const MAX_GAP_MS: i64 = 60_000;

    /// Integrate one reading using trapezoidal accumulation; returns the
    /// completed-hour record if this reading crossed an hour boundary.
    pub fn accumulate(&mut self, power_w: f64, now: Timestamp) -> Option<HourlyEnergyRecord> {
        let hour = now.hour();
        if hour != self.current_hour {
            let kwh = (self.accumulated_wh / 1000.0 * 1000.0).round() / 1000.0;
            // Attribute the completed hour to the day it fell in, not the
            // day of the reading that crossed the boundary (matters at
            // midnight: hour 23 belongs to yesterday).
            let completed_hour_date = Timestamp::from(now.inner() - ChronoDuration::hours(1)).date_str();
            let record = HourlyEnergyRecord {
                hour: self.current_hour,
                date: completed_hour_date,
                kwh,
            };
            self.history.push_back(record.clone());
            while self.history.len() > Self::HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.current_hour = hour;
            self.accumulated_wh = 0.0;
            self.last_reading_w = Some(power_w);
            self.last_reading_time = Some(now);
            return Some(record);
        }

        if let Some(last_time) = self.last_reading_time {
            let elapsed_ms = now.duration_since(&last_time).as_milliseconds();
            if elapsed_ms > 0 && elapsed_ms < Self::MAX_GAP_MS {
                let last_w = self.last_reading_w.unwrap_or(power_w);
                let avg_w = (last_w + power_w) / 2.0;
                self.accumulated_wh += avg_w * (elapsed_ms as f64 / 3_600_000.0);
            }
        }
        self.last_reading_w = Some(power_w);
        self.last_reading_time = Some(now);
        None
    }

    pub fn current_kwh(&self) -> f64 {
        self.accumulated_wh / 1000.0
    }
}

/// Daily peak power (kW) keyed by ISO date, pruned to the current month.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyPeaks(pub BTreeMap<String, f64>);

impl DailyPeaks {
    pub fn update(&mut self, date: &str, kw: f64) {
        let entry = self.0.entry(date.to_string()).or_insert(0.0);
        if kw > *entry {
            *entry = kw;
        }
    }

    /// Drop any date not in the same `YYYY-MM` prefix as `current_month`.
    pub fn prune_to_month(&mut self, current_month: &str) {
        self.0.retain(|date, _| date.starts_with(current_month));
    }

    /// Mean of the three highest daily peaks this month, used for the
    /// capacity-tariff tier lookup.
    pub fn top3_mean(&self) -> f64 {
        let mut values: Vec<f64> = self.0.values().copied().collect();
        values.sort_by(|a, b| b.partial_cmp(a).unwrap());
        let top = &values[..values.len().min(3)];
        if top.is_empty() {
            0.0
        } else {
            top.iter().sum::<f64>() / top.len() as f64
        }
    }
}

/// One row of the fixed capacity-tariff tier table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EffektTier {
    pub index: u8,
    pub label: &'static str,
    pub max_kw: f64,
}

/// Fixed Norwegian-style capacity-tariff tier table: the first tier whose
/// `max_kw` strictly exceeds the monthly top-3 mean applies.
pub const EFFEKT_TIERS: &[EffektTier] = &[
    EffektTier { index: 0, label: "0-2 kW", max_kw: 2.0 },
    EffektTier { index: 1, label: "2-5 kW", max_kw: 5.0 },
    EffektTier { index: 2, label: "5-10 kW", max_kw: 10.0 },
    EffektTier { index: 3, label: "10-15 kW", max_kw: 15.0 },
    EffektTier { index: 4, label: "15-20 kW", max_kw: 20.0 },
    EffektTier { index: 5, label: "20-25 kW", max_kw: 25.0 },
    EffektTier { index: 6, label: "25+ kW", max_kw: f64::INFINITY },
];

pub fn effekt_tier_for(monthly_kw: f64) -> EffektTier {
    *EFFEKT_TIERS
        .iter()
        .find(|t| monthly_kw < t.max_kw)
        .unwrap_or(&EFFEKT_TIERS[EFFEKT_TIERS.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_peaks_keeps_the_max() {
        let mut peaks = DailyPeaks::default();
        peaks.update("2026-08-01", 3.0);
        peaks.update("2026-08-01", 5.0);
        peaks.update("2026-08-01", 2.0);
        assert_eq!(peaks.0["2026-08-01"], 5.0);
    }

    #[test]
    fn prune_drops_other_months() {
        let mut peaks = DailyPeaks::default();
        peaks.update("2026-07-31", 4.0);
        peaks.update("2026-08-01", 5.0);
        peaks.prune_to_month("2026-08");
        assert_eq!(peaks.0.len(), 1);
        assert!(peaks.0.contains_key("2026-08-01"));
    }

    #[test]
    fn top3_mean_of_fewer_than_three_uses_available() {
        let mut peaks = DailyPeaks::default();
        peaks.update("2026-08-01", 4.0);
        peaks.update("2026-08-02", 6.0);
        assert_eq!(peaks.top3_mean(), 5.0);
    }

    #[test]
    fn tier_lookup_picks_first_exceeding() {
        let tier = effekt_tier_for(4.5);
        assert_eq!(tier.label, "5-10 kW");
    }

    #[test]
    fn tier_lookup_terminal_for_large_values() {
        let tier = effekt_tier_for(1000.0);
        assert_eq!(tier.label, "25+ kW");
    }

    fn at(rfc3339: &str) -> Timestamp {
        Timestamp::from(chrono::DateTime::parse_from_rfc3339(rfc3339).unwrap())
    }

    #[test]
    fn midnight_rollover_attributes_completed_hour_to_the_prior_day() {
        let mut energy = HourlyEnergy {
            current_hour: 23,
            ..HourlyEnergy::default()
        };
        energy.accumulate(1000.0, at("2026-08-01T23:50:00+00:00"));
        let record = energy.accumulate(1000.0, at("2026-08-02T00:05:00+00:00")).unwrap();
        assert_eq!(record.hour, 23);
        assert_eq!(record.date, "2026-08-01");
    }
}
