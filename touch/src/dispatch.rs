//! Mapping of classified gestures to user callbacks.

use core::fmt;
use core::str::FromStr;

use log::{debug, warn};

use crate::error::{CallbackError, CallbackFailure, Error};

/// A zero-argument user callback; returning `Err` reports a failure
///
/// Callbacks are `Send` so a table guarded by a critical-section mutex can be
/// shared with interrupts and other executors.
pub type Callback<'a> = &'a mut (dyn FnMut() -> CallbackResult + Send);

pub type CallbackResult = Result<(), CallbackError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GestureEvent {
    Click = 0,
    DoubleClick = 1,
    LongPress = 2,
    LongPressHold = 3,
}

impl GestureEvent {
    pub const ALL: [GestureEvent; 4] = [
        GestureEvent::Click,
        GestureEvent::DoubleClick,
        GestureEvent::LongPress,
        GestureEvent::LongPressHold,
    ];

    /// Registration name of the event
    pub const fn name(self) -> &'static str {
        match self {
            GestureEvent::Click => "click",
            GestureEvent::DoubleClick => "double_click",
            GestureEvent::LongPress => "long_press",
            GestureEvent::LongPressHold => "long_press_hold",
        }
    }
}

impl fmt::Display for GestureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GestureEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GestureEvent::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or(Error::InvalidEvent)
    }
}

/// Outcome of a single dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Invoked,
    Unregistered,
    Failed(CallbackFailure),
}

/// One optional callback per gesture event
pub struct CallbackTable<'a> {
    slots: [Option<Callback<'a>>; 4],
}

impl<'a> CallbackTable<'a> {
    pub const fn new() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }

    /// Set the callback for `event`, replacing any previous one
    pub fn register(&mut self, event: GestureEvent, callback: Callback<'a>) {
        self.slots[event as usize] = Some(callback);
    }

    /// Set a callback by event name
    pub fn register_named(&mut self, name: &str, callback: Callback<'a>) -> Result<(), Error> {
        let event = name.parse()?;
        self.register(event, callback);
        Ok(())
    }

    pub fn unregister(&mut self, event: GestureEvent) -> Option<Callback<'a>> {
        self.slots[event as usize].take()
    }

    pub fn is_registered(&self, event: GestureEvent) -> bool {
        self.slots[event as usize].is_some()
    }

    /// Invoke the callback for `event`, if any
    ///
    /// A failing callback is logged and reported in the return value; it is
    /// never propagated further.
    pub fn dispatch(&mut self, event: GestureEvent, debug: bool) -> Dispatched {
        if debug {
            debug!("event: {}", event);
        }

        let Some(callback) = self.slots[event as usize].as_mut() else {
            return Dispatched::Unregistered;
        };

        match callback() {
            Ok(()) => Dispatched::Invoked,
            Err(source) => {
                let failure = CallbackFailure { event, source };
                warn!("{}", failure);
                Dispatched::Failed(failure)
            }
        }
    }
}

impl Default for CallbackTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}
