//! Movement and condition state machines.
//!
//! An entity carries two independent axes: what it is doing
//! ([`MovementState`]) and what is being done to it ([`ConditionState`]).
//! Both are byte-sized for the wire.

use serde::{Deserialize, Serialize};

/// What the entity is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MovementState {
    /// No movement state, e.g. while stunned.
    None = 0,
    /// Standing still.
    #[default]
    Idle = 1,
    /// Moving under stick control.
    Running = 2,
    /// Travelling along a dash.
    Dashing = 3,
    /// Locked in place by an ability cast.
    Casting = 4,
}

impl MovementState {
    /// Convert to a stable numeric representation.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert from the stable numeric representation.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Idle),
            2 => Some(Self::Running),
            3 => Some(Self::Dashing),
            4 => Some(Self::Casting),
            _ => None,
        }
    }

    /// Canonical string key used in configs/logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Dashing => "dashing",
            Self::Casting => "casting",
        }
    }

    /// Whether the entity is under free stick control (idle or running).
    pub const fn is_controllable(self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }
}

/// What is being done to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConditionState {
    /// Unaffected.
    #[default]
    Normal = 0,
    /// Moved by an external force; keeps its current velocity.
    ForcedMovement = 1,
    /// Cannot move, velocity zeroed.
    Frozen = 2,
    /// Simulation suspended for this entity.
    Paused = 3,
    /// Dead.
    Dead = 4,
    /// Cannot act, velocity zeroed, movement state cleared.
    Stunned = 5,
}

impl ConditionState {
    /// Convert to a stable numeric representation.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert from the stable numeric representation.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::ForcedMovement),
            2 => Some(Self::Frozen),
            3 => Some(Self::Paused),
            4 => Some(Self::Dead),
            5 => Some(Self::Stunned),
            _ => None,
        }
    }

    /// Canonical string key used in configs/logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ForcedMovement => "forced_movement",
            Self::Frozen => "frozen",
            Self::Paused => "paused",
            Self::Dead => "dead",
            Self::Stunned => "stunned",
        }
    }
}

/// A change from one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    /// State before the change.
    pub old: S,
    /// State after the change.
    pub new: S,
}

/// Holds a current state and reports transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateMachine<S> {
    current: S,
}

impl<S: Copy + PartialEq> StateMachine<S> {
    /// Start in `initial`.
    pub fn new(initial: S) -> Self {
        Self { current: initial }
    }

    /// Current state.
    pub fn current(&self) -> S {
        self.current
    }

    /// Move to `next`; returns the transition when the state actually changed.
    pub fn change_state(&mut self, next: S) -> Option<Transition<S>> {
        if next == self.current {
            return None;
        }
        let old = std::mem::replace(&mut self.current, next);
        Some(Transition { old, new: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_state_is_stable() {
        for value in 0..=4 {
            let state = MovementState::from_u8(value).expect("valid movement byte");
            assert_eq!(state.as_u8(), value);
        }
        assert_eq!(MovementState::from_u8(5), None);
    }

    #[test]
    fn condition_state_is_stable() {
        for value in 0..=5 {
            let state = ConditionState::from_u8(value).expect("valid condition byte");
            assert_eq!(state.as_u8(), value);
        }
        assert_eq!(ConditionState::from_u8(6), None);
    }

    #[test]
    fn change_state_reports_only_real_changes() {
        let mut machine = StateMachine::new(MovementState::Idle);
        assert_eq!(machine.change_state(MovementState::Idle), None);
        assert_eq!(
            machine.change_state(MovementState::Running),
            Some(Transition {
                old: MovementState::Idle,
                new: MovementState::Running
            })
        );
        assert_eq!(machine.current(), MovementState::Running);
    }

    #[test]
    fn locomotion_states() {
        assert!(MovementState::Idle.is_controllable());
        assert!(MovementState::Running.is_controllable());
        assert!(!MovementState::Dashing.is_controllable());
        assert!(!MovementState::None.is_controllable());
    }
}
