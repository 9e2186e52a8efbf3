use serde::{Deserialize, Serialize};

use crate::Aabb;

/// Stick-driven locomotion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Top speed in units per second.
    pub movement_speed: f32,
    /// Ramp-up rate toward full stick; `0` means instant.
    pub acceleration: f32,
    /// Ramp-down rate once the stick is released; `0` means instant.
    pub deceleration: f32,
    /// Speed at or below which the entity counts as idle.
    pub idle_threshold: f32,
    /// Turn rate toward the movement direction.
    pub rotation_speed: f32,
    /// Snap to the movement direction instead of turning.
    pub instant_rotation: bool,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            movement_speed: 10.0,
            acceleration: 10.0,
            deceleration: 10.0,
            idle_threshold: 0.05,
            rotation_speed: 10.0,
            instant_rotation: false,
        }
    }
}

/// Dash parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    /// Distance covered along the facing direction.
    pub distance: f32,
    /// Seconds to cover `distance`.
    pub duration: f32,
    /// Seconds before another dash may start.
    pub cooldown: f32,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            distance: 10.0,
            duration: 0.5,
            cooldown: 1.0,
        }
    }
}

/// Cast lock durations, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Basic attack.
    pub basic_attack: f32,
    /// Heal potion.
    pub heal: f32,
    /// Any of the four cast slots.
    pub cast: f32,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            basic_attack: 1.3,
            heal: 1.0,
            cast: 1.0,
        }
    }
}

/// Everything a stepper needs to know about the world, passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimContext {
    /// Locomotion tuning.
    pub movement: MovementConfig,
    /// Dash tuning.
    pub dash: DashConfig,
    /// Cast lock tuning.
    pub cast: CastConfig,
    /// Playable area; unbounded when `None`.
    pub bounds: Option<Aabb>,
}

impl SimContext {
    /// Default tuning confined to `bounds`.
    pub fn bounded(bounds: Aabb) -> Self {
        Self {
            bounds: Some(bounds),
            ..Self::default()
        }
    }
}
