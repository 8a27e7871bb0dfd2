#![cfg_attr(not(test), no_std)]

//! Gesture recognition for a single capacitive touch channel.
//!
//! Raw readings are smoothed and compared against an adaptive baseline, the
//! resulting touch/release timeline is classified into clicks, double clicks
//! and long presses, and classified gestures are handed to user callbacks.
//!
//! The pieces are usable on their own from a superloop (see [`conditioner`],
//! [`detector`], [`classifier`] and [`dispatch`]), or composed into the
//! async [`button::TouchButton`] which runs sampling and classification as
//! two cooperative loops.

use embassy_time::Duration;
use fixed::types::U1F31;

pub mod button;
pub mod classifier;
pub mod conditioner;
pub mod detector;
pub mod dispatch;
pub mod error;

pub use button::{Sensor, TouchButton};
pub use classifier::{Classifier, GestureState};
pub use conditioner::{ConditionedState, Conditioner};
pub use dispatch::{CallbackTable, Dispatched, GestureEvent};
pub use error::{CallbackError, CallbackFailure, Error};

/// Fractional weight in (0, 1] used by the smoothing filters
pub type Factor = U1F31;

/// Configuration for a touch channel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchConfig {
    /// Weight of a new raw sample in the smoothed value
    pub ema_factor: Factor,
    /// Counts the smoothed value must exceed the baseline by to register a touch
    pub touch_threshold: u32,
    /// Weight used when the baseline follows the signal upwards
    pub baseline_factor: Factor,
    /// Window, from the start of the first tap, in which a second tap makes a double click
    pub double_click_delay: Duration,
    /// Hold time after which a press becomes a long press
    pub long_press_timeout: Duration,
    /// Repeat period of hold events while a long press continues
    pub long_press_hold_interval: Duration,
    /// Continuous touch time after which the baseline is rebased onto the signal
    pub baseline_reset_timeout: Duration,
    pub double_click_enabled: bool,
    /// Log detector diagnostics and dispatched events
    pub debug: bool,
    /// Sampling period, also the fast classifier cadence while a gesture is in progress
    pub sample_interval: Duration,
    /// Classifier cadence while idle
    pub idle_poll_interval: Duration,
}

impl TouchConfig {
    pub const fn default() -> Self {
        Self {
            ema_factor: Factor::lit("0.1"),
            touch_threshold: 500,
            baseline_factor: Factor::lit("0.0005"),
            double_click_delay: Duration::from_millis(300),
            long_press_timeout: Duration::from_millis(1000),
            long_press_hold_interval: Duration::from_millis(200),
            baseline_reset_timeout: Duration::from_secs(10),
            double_click_enabled: true,
            debug: false,
            sample_interval: Duration::from_millis(10),
            idle_poll_interval: Duration::from_millis(50),
        }
    }
}

impl Default for TouchConfig {
    fn default() -> Self {
        DEFAULT_TOUCH_CONFIG
    }
}

pub const DEFAULT_TOUCH_CONFIG: TouchConfig = TouchConfig::default();

/// Convert a factor given as a float, saturating into the representable range
pub fn factor_from_f32(value: f32) -> Factor {
    Factor::saturating_from_num(value)
}

/// Convert a duration given in seconds. Negative and NaN inputs become zero.
pub fn duration_from_secs_f32(secs: f32) -> Duration {
    // `as` saturates and maps NaN to zero
    Duration::from_micros((secs * 1_000_000.0) as u64)
}
