//! Synchronization tuning shared by client and server.

use serde::{Deserialize, Serialize};

use crate::SimTick;

/// How many redundant input samples a sender keeps in each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedundancyPolicy {
    /// Everything the peer has not acknowledged yet: `clamp(tick - last_acked, 1, cap)`.
    AckWindow,
    /// Always the full cap.
    FixedCap,
}

impl RedundancyPolicy {
    /// Number of samples to keep at `current`, given the last tick the peer confirmed.
    pub fn window_len(self, current: SimTick, last_acked: SimTick, cap: usize) -> usize {
        let cap = cap.max(1);
        match self {
            Self::FixedCap => cap,
            Self::AckWindow => (current.since(last_acked) as usize).clamp(1, cap),
        }
    }
}

/// Netcode constants and debug switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Ring-buffer slots per predicted entity.
    pub buffer_size: usize,
    /// Maximum number of samples in one input message.
    pub max_redundant_inputs: usize,
    /// Squared position error below which a prediction is confirmed.
    pub position_epsilon_sq: f32,
    /// `1 - dot(q_a, q_b)` below which a rotation is confirmed.
    pub rotation_epsilon: f32,
    /// Error threshold (both axes) for snapping remote entities.
    pub remote_epsilon: f32,
    /// Squared correction distance at or above which the visual offset is discarded.
    pub snap_distance_sq: f32,
    /// Per-tick multiplier for the position offset.
    pub position_decay: f32,
    /// Per-tick slerp factor of the rotation offset toward identity.
    pub rotation_slerp: f32,
    /// Server sends state on ticks that are multiples of this.
    pub state_send_divisor: u32,
    /// Fixed simulation rate.
    pub tick_rate_hz: u32,
    /// Cap on ticks run for one frame.
    pub max_ticks_per_frame: u32,
    /// Redundancy for host-owned entities.
    pub host_redundancy: RedundancyPolicy,
    /// Redundancy for remote clients.
    pub client_redundancy: RedundancyPolicy,
    /// Apply the decaying visual offset when rendering.
    pub smoothing_enabled: bool,
    /// Actually reset and replay on a misprediction.
    pub correction_enabled: bool,
    /// Rewind and replay on every state message, even when it matches.
    pub force_reconcile: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            max_redundant_inputs: 16,
            position_epsilon_sq: 1e-7,
            rotation_epsilon: 1e-5,
            remote_epsilon: 1e-4,
            snap_distance_sq: 8.0,
            position_decay: 0.95,
            rotation_slerp: 0.1,
            state_send_divisor: 2,
            tick_rate_hz: 50,
            max_ticks_per_frame: 8,
            host_redundancy: RedundancyPolicy::FixedCap,
            client_redundancy: RedundancyPolicy::AckWindow,
            smoothing_enabled: true,
            correction_enabled: true,
            force_reconcile: false,
        }
    }
}

impl NetConfig {
    /// Seconds per tick.
    pub fn fixed_delta(&self) -> f32 {
        1.0 / self.tick_rate_hz.max(1) as f32
    }

    /// Redundancy policy for a peer in the given role.
    pub fn redundancy_for(&self, is_host: bool) -> RedundancyPolicy {
        if is_host {
            self.host_redundancy
        } else {
            self.client_redundancy
        }
    }

    /// Check values a hand-edited config could get wrong.
    pub fn verify(&self) -> Result<(), &'static str> {
        if self.buffer_size == 0 {
            return Err("buffer_size must be positive");
        }
        if self.max_redundant_inputs == 0 || self.max_redundant_inputs > self.buffer_size {
            return Err("max_redundant_inputs must be in 1..=buffer_size");
        }
        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be positive");
        }
        if !(0.0..=1.0).contains(&self.position_decay) {
            return Err("position_decay must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.rotation_slerp) {
            return Err("rotation_slerp must be in [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(NetConfig::default().verify(), Ok(()));
    }

    #[test]
    fn verify_rejects_empty_buffer() {
        let config = NetConfig {
            buffer_size: 0,
            ..NetConfig::default()
        };
        assert!(config.verify().is_err());
    }

    #[test]
    fn fixed_cap_ignores_ack() {
        let len = RedundancyPolicy::FixedCap.window_len(SimTick(3), SimTick(2), 16);
        assert_eq!(len, 16);
    }

    proptest! {
        #[test]
        fn ack_window_stays_clamped(current in 1u32..100_000, lag in 0u32..5_000) {
            let last_acked = SimTick(current.saturating_sub(lag));
            let len = RedundancyPolicy::AckWindow.window_len(SimTick(current), last_acked, 16);
            let expected = (lag.min(current) as usize).clamp(1, 16);
            prop_assert_eq!(len, expected);
        }
    }
}
