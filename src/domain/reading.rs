use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::types::Timestamp;

/// Where a [`Reading`] came from. Control decisions never depend on this;
/// it exists purely for diagnostics and the meter-connector staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingSource {
    Event,
    Poll,
    Initial,
}

/// A single total-power sample from the meter, plus any per-phase current
/// readings available at the same instant. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: Timestamp,
    pub total_watts: f64,
    pub phase_a: Option<f64>,
    pub phase_b: Option<f64>,
    pub phase_c: Option<f64>,
    pub source: ReadingSource,
}

impl Reading {
    pub fn new(total_watts: f64, source: ReadingSource) -> Self {
        Self {
            timestamp: Timestamp::now(),
            total_watts: total_watts.max(0.0),
            phase_a: None,
            phase_b: None,
            phase_c: None,
            source,
        }
    }

    pub fn with_phases(mut self, a: Option<f64>, b: Option<f64>, c: Option<f64>) -> Self {
        self.phase_a = a;
        self.phase_b = b;
        self.phase_c = c;
        self
    }

    pub fn phases(&self) -> Option<[f64; 3]> {
        match (self.phase_a, self.phase_b, self.phase_c) {
            (Some(a), Some(b), Some(c)) => Some([a, b, c]),
            _ => None,
        }
    }
}

/// Bounded history of recent total-power samples. Invariant I3: never holds
/// more than [`PowerBuffer::CAPACITY`] entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerBuffer {
    values: VecDeque<f64>,
}

impl PowerBuffer {
    pub const CAPACITY: usize = 60;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > Self::CAPACITY {
            self.values.pop_front();
        }
    }

    pub fn reset_with(&mut self, seed: [f64; 3]) {
        self.values.clear();
        self.values.extend(seed);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Moving average of the last `window` samples, 0.0 for an empty buffer.
    pub fn moving_average(&self, window: usize) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let window = window.max(1).min(self.values.len());
        let sum: f64 = self.values.iter().rev().take(window).sum();
        sum / window as f64
    }
}

/// Tracks consecutive spike rejections so a sustained step-change in load
/// (e.g. a new always-on appliance) gets adopted as the new baseline instead
/// of being filtered forever.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpikeState {
    pub consecutive_filtered: u32,
    pub last_filtered_value: Option<f64>,
}

impl SpikeState {
    /// Number of consecutive rejections after which the pipeline rebaselines.
    pub const REBASELINE_THRESHOLD: u32 = 3;

    pub fn reset(&mut self) {
        self.consecutive_filtered = 0;
        self.last_filtered_value = None;
    }

    pub fn record_rejection(&mut self, value: f64) {
        self.consecutive_filtered += 1;
        self.last_filtered_value = Some(value);
    }

    pub fn should_rebaseline(&self) -> bool {
        self.consecutive_filtered >= Self::REBASELINE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_caps_at_sixty() {
        let mut buf = PowerBuffer::new();
        for i in 0..100 {
            buf.push(i as f64);
        }
        assert_eq!(buf.len(), 60);
    }

    #[test]
    fn empty_buffer_average_is_zero() {
        let buf = PowerBuffer::new();
        assert_eq!(buf.moving_average(5), 0.0);
    }

    #[test]
    fn moving_average_uses_last_window() {
        let mut buf = PowerBuffer::new();
        for v in [100.0, 200.0, 300.0, 400.0, 500.0] {
            buf.push(v);
        }
        assert_eq!(buf.moving_average(3), (300.0 + 400.0 + 500.0) / 3.0);
    }

    #[test]
    fn spike_state_rebaselines_after_three() {
        let mut s = SpikeState::default();
        s.record_rejection(1.0);
        s.record_rejection(2.0);
        assert!(!s.should_rebaseline());
        s.record_rejection(3.0);
        assert!(s.should_rebaseline());
    }
}
