//! Gesture classification from a polled touch/release timeline.

use embassy_time::{Duration, Instant};

use crate::dispatch::GestureEvent;
use crate::TouchConfig;

/// Events produced by one poll. At most two: a long press and its first hold.
pub type Events = heapless::Vec<GestureEvent, 2>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    /// First tap is down
    Pressed { start: Instant },
    /// Long press reported; hold events repeat until release
    LongPressActive { next_hold: Instant },
    /// First tap released; the double-click window runs from `start`
    AwaitingSecondTap { start: Instant },
    /// Second tap is down. Long-press timing does not apply.
    SecondTap,
}

pub struct Classifier {
    state: GestureState,
}

impl Classifier {
    pub const fn new() -> Self {
        Self {
            state: GestureState::Idle,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }

    /// How long to wait before the next poll
    ///
    /// Idle polling is slow. Once a gesture is in progress the classifier
    /// polls at the sampling rate so short releases and taps are not missed.
    pub fn poll_interval(&self, config: &TouchConfig) -> Duration {
        match self.state {
            GestureState::Idle => config.idle_poll_interval,
            _ => config.sample_interval,
        }
    }

    /// Advance the state machine with the touch state observed at `now`
    pub fn poll(&mut self, now: Instant, touching: bool, config: &TouchConfig) -> Events {
        let mut events = Events::new();

        self.state = match self.state {
            GestureState::Idle => {
                if touching {
                    GestureState::Pressed { start: now }
                } else {
                    GestureState::Idle
                }
            }
            GestureState::Pressed { start } => {
                if touching {
                    if now.saturating_duration_since(start) > config.long_press_timeout {
                        events.push(GestureEvent::LongPress).ok();
                        events.push(GestureEvent::LongPressHold).ok();
                        GestureState::LongPressActive {
                            next_hold: later(now, config.long_press_hold_interval),
                        }
                    } else {
                        GestureState::Pressed { start }
                    }
                } else if config.double_click_enabled
                    && now.saturating_duration_since(start) < config.double_click_delay
                {
                    GestureState::AwaitingSecondTap { start }
                } else {
                    // No double-click window left to wait out
                    events.push(GestureEvent::Click).ok();
                    GestureState::Idle
                }
            }
            GestureState::LongPressActive { next_hold } => {
                if !touching {
                    GestureState::Idle
                } else if now >= next_hold {
                    events.push(GestureEvent::LongPressHold).ok();
                    GestureState::LongPressActive {
                        next_hold: later(next_hold, config.long_press_hold_interval),
                    }
                } else {
                    GestureState::LongPressActive { next_hold }
                }
            }
            GestureState::AwaitingSecondTap { start } => {
                if now.saturating_duration_since(start) >= config.double_click_delay {
                    events.push(GestureEvent::Click).ok();
                    GestureState::Idle
                } else if touching {
                    GestureState::SecondTap
                } else {
                    GestureState::AwaitingSecondTap { start }
                }
            }
            GestureState::SecondTap => {
                if touching {
                    GestureState::SecondTap
                } else {
                    events.push(GestureEvent::DoubleClick).ok();
                    GestureState::Idle
                }
            }
        };

        events
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn later(at: Instant, by: Duration) -> Instant {
    at.checked_add(by).unwrap_or(Instant::MAX)
}
