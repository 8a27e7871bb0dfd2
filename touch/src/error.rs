use thiserror::Error;

use crate::dispatch::GestureEvent;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A callback was registered under a name outside the known gesture set
    #[error("unknown gesture event name")]
    InvalidEvent,
    /// The callback table is in use by a running callback
    #[error("callback table busy")]
    Busy,
}

/// Failure reported by a user callback
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CallbackError(pub &'static str);

/// A callback failure caught at the dispatch boundary
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("callback for {event} failed: {source}")]
pub struct CallbackFailure {
    pub event: GestureEvent,
    pub source: CallbackError,
}
