//! C1 — ingest, smoothing, spike rejection and energy accumulation for a
//! single total-power reading. Everything downstream (mitigation engine,
//! charger controller, energy tracker) only ever sees the output of
//! [`SamplePipeline::ingest`].

use tracing::{debug, warn};

use crate::domain::{DailyPeaks, HourlyEnergy, PowerBuffer, SpikeState};

/// Snapshot of connected-device headroom used to size the legitimate-surge
/// allowance in the spike test. Recomputed by the caller on each ingest from
/// live charger/heater state.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadroomEstimate {
    pub max_charger_w: f64,
    pub max_heater_cycle_w: f64,
}

/// Outcome of feeding one raw reading through the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub accepted: bool,
    pub smoothed_w: f64,
    pub rebaselined: bool,
}

pub struct SamplePipeline {
    buffer: PowerBuffer,
    spike: SpikeState,
    smoothing_window: usize,
    spike_multiplier: f64,
    hourly_energy: HourlyEnergy,
    daily_peaks: DailyPeaks,
}

impl SamplePipeline {
    pub fn new(smoothing_window: usize, spike_multiplier: f64) -> Self {
        Self {
            buffer: PowerBuffer::new(),
            spike: SpikeState::default(),
            smoothing_window,
            spike_multiplier,
            hourly_energy: HourlyEnergy::default(),
            daily_peaks: DailyPeaks::default(),
        }
    }

    pub fn set_tuning(&mut self, smoothing_window: usize, spike_multiplier: f64) {
        self.smoothing_window = smoothing_window;
        self.spike_multiplier = spike_multiplier;
    }

    pub fn hourly_energy(&self) -> &HourlyEnergy {
        &self.hourly_energy
    }

    pub fn daily_peaks(&self) -> &DailyPeaks {
        &self.daily_peaks
    }

    pub fn restore_state(&mut self, hourly_energy: HourlyEnergy, daily_peaks: DailyPeaks) {
        self.hourly_energy = hourly_energy;
        self.daily_peaks = daily_peaks;
    }

    pub fn smoothed(&self) -> f64 {
        self.buffer.moving_average(self.smoothing_window)
    }

    /// Feed one raw reading through smoothing, spike rejection and energy
    /// accumulation. Returns the outcome so the caller (the supervisor) can
    /// decide whether to run the charger/mitigation passes.
    pub fn ingest(&mut self, raw: f64, headroom: HeadroomEstimate) -> IngestOutcome {
        let r = if raw.is_nan() { 0.0 } else { raw.max(0.0) };

        let avg = self.smoothed();
        let is_spike = self.buffer.len() >= self.smoothing_window && r > avg * self.spike_multiplier;

        if is_spike {
            let allowed_jump = avg + headroom.max_charger_w + headroom.max_heater_cycle_w + 500.0;
            if r <= allowed_jump {
                debug!(value = r, allowed_jump, "surge accepted within headroom");
            } else {
                self.spike.record_rejection(r);
                if self.spike.should_rebaseline() {
                    warn!(value = r, "rebaselining power buffer after repeated spikes");
                    self.buffer.reset_with([r, r, r]);
                    self.spike.reset();
                    return self.accept(r, true);
                }
                return IngestOutcome {
                    accepted: false,
                    smoothed_w: self.smoothed(),
                    rebaselined: false,
                };
            }
        }

        self.accept(r, false)
    }

    fn accept(&mut self, r: f64, rebaselined: bool) -> IngestOutcome {
        if !rebaselined {
            self.buffer.push(r);
        }
        self.spike.reset();

        let now = crate::domain::Timestamp::now();
        if let Some(completed) = self.hourly_energy.accumulate(r, now) {
            let kw = completed.kwh;
            self.daily_peaks.update(&completed.date, kw);
            let month_prefix = &completed.date[..7];
            self.daily_peaks.prune_to_month(month_prefix);
        }

        IngestOutcome {
            accepted: true,
            smoothed_w: self.smoothed(),
            rebaselined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(pipeline: &mut SamplePipeline, values: &[f64]) {
        for v in values {
            pipeline.ingest(*v, HeadroomEstimate::default());
        }
    }

    #[test]
    fn accepts_steady_readings() {
        let mut p = SamplePipeline::new(5, 3.0);
        fill(&mut p, &[1000.0, 1000.0, 1000.0, 1000.0, 1000.0]);
        let outcome = p.ingest(1000.0, HeadroomEstimate::default());
        assert!(outcome.accepted);
        assert_eq!(outcome.smoothed_w, 1000.0);
    }

    #[test]
    fn rejects_spike_beyond_headroom() {
        let mut p = SamplePipeline::new(5, 2.0);
        fill(&mut p, &[500.0, 500.0, 500.0, 500.0, 500.0]);
        let outcome = p.ingest(5000.0, HeadroomEstimate::default());
        assert!(!outcome.accepted);
    }

    #[test]
    fn accepts_spike_within_charger_headroom() {
        let mut p = SamplePipeline::new(5, 2.0);
        fill(&mut p, &[500.0, 500.0, 500.0, 500.0, 500.0]);
        let headroom = HeadroomEstimate {
            max_charger_w: 7000.0,
            max_heater_cycle_w: 0.0,
        };
        let outcome = p.ingest(5000.0, headroom);
        assert!(outcome.accepted);
    }

    #[test]
    fn rebaselines_after_three_consecutive_rejections() {
        let mut p = SamplePipeline::new(5, 2.0);
        fill(&mut p, &[500.0, 500.0, 500.0, 500.0, 500.0]);
        let o1 = p.ingest(5000.0, HeadroomEstimate::default());
        assert!(!o1.accepted);
        let o2 = p.ingest(5000.0, HeadroomEstimate::default());
        assert!(!o2.accepted);
        let o3 = p.ingest(5000.0, HeadroomEstimate::default());
        assert!(o3.accepted);
        assert!(o3.rebaselined);
    }

    #[test]
    fn negative_readings_are_clamped_to_zero() {
        let mut p = SamplePipeline::new(5, 3.0);
        let outcome = p.ingest(-200.0, HeadroomEstimate::default());
        assert_eq!(outcome.smoothed_w, 0.0);
    }
}
