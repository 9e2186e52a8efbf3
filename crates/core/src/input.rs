//! Per-tick input model.
//!
//! Buttons use an edge-aware [`KeyState`] so a single physical press or
//! release is seen by the simulation exactly once, no matter how many
//! redundant messages carry it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Edge-aware button state, advanced once per tick after being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyState {
    /// Not pressed.
    #[default]
    Off = 0,
    /// Pressed this tick.
    Press = 1,
    /// Pressed on an earlier tick and still down.
    Held = 2,
    /// Released this tick.
    Release = 3,
}

impl KeyState {
    /// State for the following tick (`press`/`held` -> `held`, `release` -> `off`).
    pub const fn step(self) -> Self {
        match self {
            Self::Press | Self::Held => Self::Held,
            Self::Release | Self::Off => Self::Off,
        }
    }

    /// Whether the button is anything but `off`.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Whether the button went down on this tick.
    pub const fn is_pressed(self) -> bool {
        matches!(self, Self::Press)
    }

    /// Stable numeric representation.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert from the stable numeric representation.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Press),
            2 => Some(Self::Held),
            3 => Some(Self::Release),
            _ => None,
        }
    }
}

/// Discrete actions carried by every [`InputSample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Basic melee attack.
    BasicAttack,
    /// Dash along the facing direction.
    Dash,
    /// Heal potion.
    Heal,
    /// First cast slot.
    Cast1,
    /// Second cast slot.
    Cast2,
    /// Third cast slot.
    Cast3,
    /// Fourth cast slot.
    Cast4,
}

impl Action {
    /// Every action, in wire order of their key states.
    pub const ALL: [Action; 7] = [
        Action::Dash,
        Action::Heal,
        Action::BasicAttack,
        Action::Cast1,
        Action::Cast2,
        Action::Cast3,
        Action::Cast4,
    ];

    /// Canonical string key used in configs/logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BasicAttack => "basic_attack",
            Self::Dash => "dash",
            Self::Heal => "heal",
            Self::Cast1 => "cast_1",
            Self::Cast2 => "cast_2",
            Self::Cast3 => "cast_3",
            Self::Cast4 => "cast_4",
        }
    }
}

/// Control state captured for a single tick.
///
/// Field order is the wire order: stick, dash, heal, basic attack, casts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSample {
    /// Left stick, each axis in `[-1, 1]`.
    pub movement: Vec2,
    /// Dash button.
    pub dash: KeyState,
    /// Heal button.
    pub heal: KeyState,
    /// Basic attack button.
    pub basic_attack: KeyState,
    /// Cast slots 1-4.
    pub casts: [KeyState; 4],
}

impl InputSample {
    /// Sample with no movement and every button off.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Sample that only moves along `movement`.
    pub fn moving(movement: Vec2) -> Self {
        Self {
            movement,
            ..Self::default()
        }
    }

    /// Key state of `action`.
    pub fn key(&self, action: Action) -> KeyState {
        match action {
            Action::BasicAttack => self.basic_attack,
            Action::Dash => self.dash,
            Action::Heal => self.heal,
            Action::Cast1 => self.casts[0],
            Action::Cast2 => self.casts[1],
            Action::Cast3 => self.casts[2],
            Action::Cast4 => self.casts[3],
        }
    }

    /// Mutable key state of `action`.
    pub fn key_mut(&mut self, action: Action) -> &mut KeyState {
        match action {
            Action::BasicAttack => &mut self.basic_attack,
            Action::Dash => &mut self.dash,
            Action::Heal => &mut self.heal,
            Action::Cast1 => &mut self.casts[0],
            Action::Cast2 => &mut self.casts[1],
            Action::Cast3 => &mut self.casts[2],
            Action::Cast4 => &mut self.casts[3],
        }
    }

    /// Whether the sample carries anything worth simulating.
    pub fn is_idle(&self) -> bool {
        self.movement == Vec2::ZERO && Action::ALL.iter().all(|&a| !self.key(a).is_active())
    }
}
