#![warn(missing_docs)]
//! Core primitives shared across the netcode workspace.

pub mod config;
pub mod events;
pub mod input;
pub mod state;
pub mod time;

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use config::{NetConfig, RedundancyPolicy};
pub use events::{StateEvent, StateEventBus, StateEventReceiver};
pub use input::{Action, InputSample, KeyState};
pub use state::{ConditionState, MovementState, StateMachine, Transition};
pub use time::{FixedTimestep, TickClock};

/// Entity identifier assigned by the server.
pub type EntityId = u64;

/// Fixed simulation tick.
///
/// Ticks start at [`SimTick::FIRST`] so that `tick - window_len` never
/// underflows for any window the sampler keeps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SimTick(pub u32);

impl SimTick {
    /// Sentinel meaning "nothing processed yet".
    pub const ZERO: Self = Self(0);

    /// First tick of every timeline.
    pub const FIRST: Self = Self(1);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u32) -> Self {
        Self(self.0.wrapping_add(delta))
    }

    /// The following tick.
    pub fn next(self) -> Self {
        self.advance(1)
    }

    /// Number of ticks from `earlier` to `self`, zero when `earlier` is not older.
    pub fn since(self, earlier: SimTick) -> u32 {
        self.0.saturating_sub(earlier.0)
    }

    /// Slot index of this tick in a ring of `capacity` entries.
    pub fn slot(self, capacity: usize) -> usize {
        self.0 as usize % capacity
    }

    /// Whether this tick lands on a send boundary for `divisor`.
    pub fn is_multiple_of(self, divisor: u32) -> bool {
        divisor <= 1 || self.0 % divisor == 0
    }
}

impl fmt::Display for SimTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_saturates() {
        assert_eq!(SimTick(105).since(SimTick(100)), 5);
        assert_eq!(SimTick(40).since(SimTick(50)), 0);
    }

    #[test]
    fn slot_wraps_capacity() {
        assert_eq!(SimTick(1).slot(1024), 1);
        assert_eq!(SimTick(1024).slot(1024), 0);
        assert_eq!(SimTick(2049).slot(1024), 1);
    }

    #[test]
    fn send_boundary() {
        assert!(SimTick(104).is_multiple_of(2));
        assert!(!SimTick(105).is_multiple_of(2));
        assert!(SimTick(105).is_multiple_of(1));
    }
}
