//! Error taxonomy for the synchronization layer.
//!
//! None of these abort a tick: they are logged and reported in outcomes,
//! and the simulation carries on with the last known state.

use arena_core::SimTick;
use thiserror::Error;

/// Recoverable synchronization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The message is not newer than what was already processed.
    #[error("stale message for tick {tick} (last processed {last})")]
    StaleMessage {
        /// Tick carried by the message.
        tick: SimTick,
        /// Last tick already processed.
        last: SimTick,
    },

    /// A catch-up replay index fell outside the received sample window.
    #[error("replay index {index} outside received window of {len} samples")]
    BufferIndexOutOfRange {
        /// Computed index (may be negative).
        index: i64,
        /// Number of samples in the window.
        len: usize,
    },

    /// A ring-buffer slot holds a different tick than expected.
    #[error("buffer slot for tick {expected} holds {found:?}")]
    StaleBufferSlot {
        /// Tick that was looked up.
        expected: SimTick,
        /// Tick actually stored in the slot, if any.
        found: Option<SimTick>,
    },

    /// Authoritative state for a tick this peer has not simulated yet.
    #[error("state for tick {tick} is ahead of local tick {current}")]
    FutureTick {
        /// Tick carried by the message.
        tick: SimTick,
        /// Local tick.
        current: SimTick,
    },

    /// A decoded message violates protocol limits.
    #[error("protocol limit violated: {0}")]
    Limit(&'static str),
}
