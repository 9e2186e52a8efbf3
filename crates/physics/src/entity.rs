use arena_core::{ConditionState, MovementState};
use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// An in-flight dash, from `origin` to `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DashProgress {
    /// Position the dash started from.
    pub origin: Vec3,
    /// Position the dash ends at (before bounds clamping).
    pub destination: Vec3,
    /// Seconds spent dashing so far.
    pub elapsed: f32,
}

/// Complete simulated state of one entity.
///
/// The transform plus both state axes are what goes over the wire; the
/// remaining fields are kinematic memory that only the stepper reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// World position.
    pub position: Vec3,
    /// Facing.
    pub rotation: Quat,
    /// Planar velocity from the last step.
    pub velocity: Vec3,
    /// Smoothed stick input.
    pub lerped_input: Vec2,
    /// Acceleration ramp in `[0, 1]`.
    pub acceleration: f32,
    /// Movement axis.
    pub movement: MovementState,
    /// Condition axis.
    pub condition: ConditionState,
    /// Active dash, if any.
    pub dash: Option<DashProgress>,
    /// Seconds left in the current cast lock.
    pub cast_remaining: f32,
    /// Seconds until a dash may start again.
    pub dash_cooldown: f32,
}

impl Default for EntityState {
    fn default() -> Self {
        Self::spawned(Vec3::ZERO, Quat::IDENTITY)
    }
}

impl EntityState {
    /// Fresh `Normal`/`Idle` entity at rest.
    pub fn spawned(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            velocity: Vec3::ZERO,
            lerped_input: Vec2::ZERO,
            acceleration: 0.0,
            movement: MovementState::Idle,
            condition: ConditionState::Normal,
            dash: None,
            cast_remaining: 0.0,
            dash_cooldown: 0.0,
        }
    }

    /// Unit facing direction on the ground plane.
    pub fn forward(&self) -> Vec3 {
        let forward = self.rotation * Vec3::Z;
        Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero()
    }

    /// Drop any ability progress and come to rest, keeping the transform.
    pub fn reset_motion(&mut self) {
        self.velocity = Vec3::ZERO;
        self.lerped_input = Vec2::ZERO;
        self.acceleration = 0.0;
        self.dash = None;
        self.cast_remaining = 0.0;
    }

    /// Let `dt` of the dash cooldown elapse.
    pub fn cool_down(&mut self, dt: f32) {
        self.dash_cooldown = (self.dash_cooldown - dt).max(0.0);
    }
}
