//! Cosmetic correction smoothing.

use glam::{Quat, Vec3};

/// Offset between what was rendered before a correction and the corrected
/// simulation, decayed a little every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualErrorOffset {
    /// Added to the simulated position.
    pub position_delta: Vec3,
    /// Applied after the simulated rotation.
    pub rotation_delta: Quat,
}

impl Default for VisualErrorOffset {
    fn default() -> Self {
        Self::ZERO
    }
}

impl VisualErrorOffset {
    /// No offset.
    pub const ZERO: Self = Self {
        position_delta: Vec3::ZERO,
        rotation_delta: Quat::IDENTITY,
    };

    /// Offset that keeps rendering `previous` while simulating `corrected`.
    ///
    /// Returns [`VisualErrorOffset::ZERO`] and `true` when the jump is at
    /// least `snap_distance_sq` (squared), which hard-snaps the model.
    pub fn between(
        previous: (Vec3, Quat),
        corrected: (Vec3, Quat),
        snap_distance_sq: f32,
    ) -> (Self, bool) {
        let (previous_position, previous_rotation) = previous;
        let (position, rotation) = corrected;
        let position_delta = previous_position - position;
        if position_delta.length_squared() >= snap_distance_sq {
            return (Self::ZERO, true);
        }
        let offset = Self {
            position_delta,
            rotation_delta: (rotation.inverse() * previous_rotation).normalize(),
        };
        (offset, false)
    }

    /// One tick of decay toward zero.
    pub fn decay(&mut self, position_decay: f32, rotation_slerp: f32) {
        self.position_delta *= position_decay;
        self.rotation_delta = self
            .rotation_delta
            .slerp(Quat::IDENTITY, rotation_slerp)
            .normalize();
    }

    /// Rendered transform for a simulated one.
    pub fn apply(&self, position: Vec3, rotation: Quat) -> (Vec3, Quat) {
        (
            position + self.position_delta,
            (rotation * self.rotation_delta).normalize(),
        )
    }

    /// Whether the offset is visually negligible.
    pub fn is_settled(&self, epsilon: f32) -> bool {
        self.position_delta.length_squared() < epsilon * epsilon
            && 1.0 - self.rotation_delta.dot(Quat::IDENTITY).abs() < epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_snap_threshold() {
        let rotation = Quat::IDENTITY;
        let far = Vec3::new(1.0, 0.0, 3.0); // |d|^2 = 10
        let (offset, snapped) = VisualErrorOffset::between((far, rotation), (Vec3::ZERO, rotation), 8.0);
        assert!(snapped);
        assert_eq!(offset, VisualErrorOffset::ZERO);

        let near = Vec3::new(1.0, 0.0, 1.0); // |d|^2 = 2
        let (offset, snapped) = VisualErrorOffset::between((near, rotation), (Vec3::ZERO, rotation), 8.0);
        assert!(!snapped);
        assert_eq!(offset.position_delta, near);
    }

    #[test]
    fn test_offset_preserves_rendered_transform() {
        let previous = (Vec3::new(0.5, 0.0, 0.5), Quat::from_rotation_y(0.4));
        let corrected = (Vec3::new(0.2, 0.0, 0.1), Quat::from_rotation_y(0.1));
        let (offset, _) = VisualErrorOffset::between(previous, corrected, 8.0);
        let (position, rotation) = offset.apply(corrected.0, corrected.1);
        assert!((position - previous.0).length() < 1e-6);
        assert!(rotation.angle_between(previous.1) < 1e-4);
    }

    #[test]
    fn test_decay_converges() {
        let mut offset = VisualErrorOffset {
            position_delta: Vec3::new(2.0, 0.0, 0.0),
            rotation_delta: Quat::from_rotation_y(1.0),
        };
        for _ in 0..200 {
            offset.decay(0.95, 0.1);
        }
        assert!(offset.position_delta.length() < 2.0 * 1e-4);
        assert!(offset.is_settled(1e-4));
    }
}
