//! Remote entity smoothing.
//!
//! Remote entities are never simulated locally: authoritative states are
//! applied as they arrive and the jump is hidden by a decaying offset.

use arena_core::{ConditionState, MovementState, NetConfig, SimTick};
use glam::{Quat, Vec3};
use tracing::debug;

use crate::protocol::StateMessage;
use crate::smoothing::VisualErrorOffset;
use crate::SyncError;

/// What applying a state message did.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// Message was not applied.
    Rejected(SyncError),
    /// Transform was within epsilon; only the state axes were taken.
    Unchanged,
    /// Transform was replaced.
    Corrected {
        /// The jump was large enough to skip smoothing.
        snapped: bool,
    },
}

/// Authoritative transform of a remote entity plus its visual offset.
#[derive(Debug, Clone)]
pub struct RemoteInterpolator {
    position: Vec3,
    rotation: Quat,
    movement: MovementState,
    condition: ConditionState,
    offset: VisualErrorOffset,
    last_applied: SimTick,
}

impl RemoteInterpolator {
    /// Start at a spawn transform.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            movement: MovementState::Idle,
            condition: ConditionState::Normal,
            offset: VisualErrorOffset::ZERO,
            last_applied: SimTick::ZERO,
        }
    }

    /// Apply an authoritative state.
    pub fn apply(&mut self, msg: &StateMessage, config: &NetConfig) -> RemoteOutcome {
        if msg.tick <= self.last_applied {
            let err = SyncError::StaleMessage {
                tick: msg.tick,
                last: self.last_applied,
            };
            debug!(%err, "remote state dropped");
            return RemoteOutcome::Rejected(err);
        }
        self.last_applied = msg.tick;
        self.movement = msg.movement_state;
        self.condition = msg.condition_state;

        let position_error = (msg.position - self.position).length_squared();
        let rotation_error = 1.0 - msg.rotation.dot(self.rotation);
        if position_error <= config.remote_epsilon && rotation_error <= config.remote_epsilon {
            return RemoteOutcome::Unchanged;
        }

        let previous = self.offset.apply(self.position, self.rotation);
        self.position = msg.position;
        self.rotation = msg.rotation;
        let (offset, snapped) = VisualErrorOffset::between(
            previous,
            (self.position, self.rotation),
            config.snap_distance_sq,
        );
        self.offset = offset;
        RemoteOutcome::Corrected { snapped }
    }

    /// Per-tick offset decay.
    pub fn smooth(&mut self, config: &NetConfig) {
        self.offset.decay(config.position_decay, config.rotation_slerp);
    }

    /// Transform to draw this tick.
    pub fn rendered(&self, config: &NetConfig) -> (Vec3, Quat) {
        if config.smoothing_enabled {
            self.offset.apply(self.position, self.rotation)
        } else {
            (self.position, self.rotation)
        }
    }

    /// Authoritative position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Authoritative rotation.
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Movement axis from the last applied message.
    pub fn movement(&self) -> MovementState {
        self.movement
    }

    /// Condition axis from the last applied message.
    pub fn condition(&self) -> ConditionState {
        self.condition
    }

    /// Current visual offset.
    pub fn offset(&self) -> &VisualErrorOffset {
        &self.offset
    }

    /// Tick of the last applied message.
    pub fn last_applied(&self) -> SimTick {
        self.last_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(tick: u32, position: Vec3) -> StateMessage {
        StateMessage {
            delta_time: 0.02,
            tick: SimTick(tick),
            movement_state: MovementState::Running,
            condition_state: ConditionState::Normal,
            position,
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn test_small_error_keeps_transform() {
        let config = NetConfig::default();
        let mut remote = RemoteInterpolator::new(Vec3::ZERO, Quat::IDENTITY);
        let outcome = remote.apply(&state(2, Vec3::new(0.005, 0.0, 0.0)), &config);
        assert_eq!(outcome, RemoteOutcome::Unchanged);
        assert_eq!(remote.position(), Vec3::ZERO);
        assert_eq!(remote.movement(), MovementState::Running);
    }

    #[test]
    fn test_correction_smooths_then_settles() {
        let config = NetConfig::default();
        let mut remote = RemoteInterpolator::new(Vec3::ZERO, Quat::IDENTITY);
        let target = Vec3::new(1.0, 0.0, 0.0);
        let outcome = remote.apply(&state(2, target), &config);
        assert_eq!(outcome, RemoteOutcome::Corrected { snapped: false });
        assert_eq!(remote.position(), target);
        assert_eq!(remote.rendered(&config).0, Vec3::ZERO);

        for _ in 0..200 {
            remote.smooth(&config);
        }
        assert!((remote.rendered(&config).0 - target).length() < 1e-3);
    }

    #[test]
    fn test_far_correction_snaps() {
        let config = NetConfig::default();
        let mut remote = RemoteInterpolator::new(Vec3::ZERO, Quat::IDENTITY);
        let outcome = remote.apply(&state(2, Vec3::new(5.0, 0.0, 0.0)), &config);
        assert_eq!(outcome, RemoteOutcome::Corrected { snapped: true });
        assert_eq!(remote.rendered(&config).0, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_stale_state_dropped() {
        let config = NetConfig::default();
        let mut remote = RemoteInterpolator::new(Vec3::ZERO, Quat::IDENTITY);
        remote.apply(&state(10, Vec3::X), &config);
        let outcome = remote.apply(&state(8, Vec3::Z), &config);
        assert!(matches!(
            outcome,
            RemoteOutcome::Rejected(SyncError::StaleMessage { .. })
        ));
        assert_eq!(remote.position(), Vec3::X);
        assert_eq!(remote.last_applied(), SimTick(10));
    }

    #[test]
    fn test_smoothing_disabled_renders_simulation() {
        let config = NetConfig {
            smoothing_enabled: false,
            ..NetConfig::default()
        };
        let mut remote = RemoteInterpolator::new(Vec3::ZERO, Quat::IDENTITY);
        remote.apply(&state(1, Vec3::X), &config);
        assert_eq!(remote.rendered(&config).0, Vec3::X);
    }
}
