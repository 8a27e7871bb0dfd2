//! Signal conditioning: EMA smoothing of raw readings and the adaptive baseline.

use embassy_time::{Duration, Instant};
use fixed::types::I32F32;
use log::debug;

use crate::{detector, Factor, TouchConfig};

/// Number of readings averaged by a calibration
pub const CALIBRATION_SAMPLES: usize = 5;
/// Delay between calibration readings
pub const CALIBRATION_INTERVAL: Duration = Duration::from_millis(50);

/// Smoothed signal and baseline for one channel
///
/// A `smoothed` value of zero means no sample has been seen yet, so a genuine
/// raw reading of exactly zero is treated as a cold start on the next sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConditionedState {
    pub smoothed: i32,
    pub baseline: i32,
}

impl ConditionedState {
    /// Offset of the smoothed signal above the baseline
    pub fn diff(&self) -> i64 {
        i64::from(self.smoothed) - i64::from(self.baseline)
    }
}

/// Moves `from` towards `to` by `factor` of the distance, in fixed point.
fn approach(from: i32, to: i32, factor: Factor) -> I32F32 {
    let delta = I32F32::saturating_from_num(i64::from(to) - i64::from(from));
    delta.saturating_mul(I32F32::from_num(factor))
}

pub struct Conditioner {
    /// When the current uninterrupted touch began, as seen by this loop
    touch_start: Option<Instant>,
}

impl Conditioner {
    pub const fn new() -> Self {
        Self { touch_start: None }
    }

    /// Forget the sustained-touch timer
    pub fn reset(&mut self) {
        self.touch_start = None;
    }

    /// Process one raw reading and return the next conditioned state
    ///
    /// The returned value is meant to replace `state` as a whole, so readers
    /// never observe a smoothed value paired with a stale baseline.
    pub fn update(
        &mut self,
        state: ConditionedState,
        raw: i32,
        now: Instant,
        config: &TouchConfig,
    ) -> ConditionedState {
        let mut next = state;

        next.smoothed = if state.smoothed == 0 {
            raw
        } else {
            let step = approach(state.smoothed, raw, config.ema_factor).saturating_round();
            state.smoothed.saturating_add(step.saturating_to_num())
        };

        if detector::is_touching(&next, config) {
            match self.touch_start {
                None => self.touch_start = Some(now),
                Some(start)
                    if now.saturating_duration_since(start) > config.baseline_reset_timeout =>
                {
                    debug!(
                        "touch held past reset timeout, rebasing {} -> {}",
                        next.baseline, next.smoothed
                    );
                    next.baseline = next.smoothed;
                    self.touch_start = None;
                }
                Some(_) => {}
            }
        } else {
            self.touch_start = None;
        }

        if next.baseline == 0 || next.smoothed < next.baseline {
            next.baseline = next.smoothed;
        } else {
            // One-sided filter, so transient touches barely lift the floor
            let step = approach(next.baseline, next.smoothed, config.baseline_factor).floor();
            next.baseline = next.baseline.saturating_add(step.saturating_to_num());
        }

        next
    }
}

impl Default for Conditioner {
    fn default() -> Self {
        Self::new()
    }
}

/// Baseline from a set of untouched readings: their truncated mean
pub fn calibration_baseline(samples: &[i32]) -> Option<i32> {
    if samples.is_empty() {
        return None;
    }
    let sum: i64 = samples.iter().map(|&s| i64::from(s)).sum();
    Some((sum / samples.len() as i64) as i32)
}
