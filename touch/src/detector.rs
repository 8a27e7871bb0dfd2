use log::debug;

use crate::{ConditionedState, TouchConfig};

/// Is the smoothed signal strictly more than `touch_threshold` above the baseline?
///
/// Stateless. With `config.debug` set, each evaluation is also logged.
pub fn is_touching(state: &ConditionedState, config: &TouchConfig) -> bool {
    let diff = state.diff();
    let touching = diff > i64::from(config.touch_threshold);
    if config.debug {
        debug!(
            "smoothed: {} baseline: {} threshold: {} diff: {} touching: {}",
            state.smoothed, state.baseline, config.touch_threshold, diff, touching
        );
    }
    touching
}
