//! Protocol message definitions for client-server communication.
//!
//! All messages use postcard serialization for compact binary encoding.
//! Field order of every struct is its wire order.

use arena_core::{ConditionState, EntityId, InputSample, MovementState, SimTick};
use arena_physics::EntityState;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::ChannelType;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum number of samples carried by one input message.
pub const MAX_REDUNDANT_INPUTS: usize = 16;

/// Largest frame that may travel on an unreliable channel.
pub const MAX_DATAGRAM_LEN: usize = 508;

/// Client input for one tick, plus the redundant history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    /// Client tick the newest sample belongs to.
    pub tick: SimTick,
    /// Client fixed delta time.
    pub delta_time: f32,
    /// Most recent samples, oldest first, newest last.
    pub samples: Vec<InputSample>,
}

impl InputMessage {
    /// Sample for [`InputMessage::tick`].
    pub fn newest(&self) -> Option<&InputSample> {
        self.samples.last()
    }

    /// Verify message limits and validity.
    pub fn verify(&self) -> Result<(), &'static str> {
        if self.samples.is_empty() {
            return Err("Input message without samples");
        }
        if self.samples.len() > MAX_REDUNDANT_INPUTS {
            return Err("Too many redundant input samples");
        }
        if !self.delta_time.is_finite() || self.delta_time <= 0.0 {
            return Err("Invalid delta time");
        }
        for sample in &self.samples {
            let stick = sample.movement;
            if !stick.is_finite() || stick.x.abs() > 1.0 || stick.y.abs() > 1.0 {
                return Err("Stick input out of range");
            }
        }
        Ok(())
    }
}

/// Authoritative result of one server tick for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    /// Server fixed delta time.
    pub delta_time: f32,
    /// Input tick this state is the result of.
    pub tick: SimTick,
    /// Movement axis after the tick.
    pub movement_state: MovementState,
    /// Condition axis after the tick.
    pub condition_state: ConditionState,
    /// Position after the tick.
    pub position: Vec3,
    /// Rotation after the tick.
    pub rotation: Quat,
}

impl StateMessage {
    /// Describe `state` as the result of `tick`.
    pub fn from_state(tick: SimTick, delta_time: f32, state: &EntityState) -> Self {
        Self {
            delta_time,
            tick,
            movement_state: state.movement,
            condition_state: state.condition,
            position: state.position,
            rotation: state.rotation,
        }
    }

    /// Transform and state axes without tick metadata.
    pub fn snapshot(&self) -> ClientStateSnapshot {
        ClientStateSnapshot {
            position: self.position,
            rotation: self.rotation,
            movement_state: self.movement_state,
            condition_state: self.condition_state,
        }
    }

    /// Verify message limits and validity.
    pub fn verify(&self) -> Result<(), &'static str> {
        if !self.delta_time.is_finite() {
            return Err("Invalid delta time");
        }
        if !self.position.is_finite() {
            return Err("Non-finite position");
        }
        if !self.rotation.is_finite() || self.rotation.length_squared() < 1e-6 {
            return Err("Invalid rotation");
        }
        Ok(())
    }
}

/// The comparable part of an entity's state at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientStateSnapshot {
    /// Position.
    pub position: Vec3,
    /// Rotation.
    pub rotation: Quat,
    /// Movement axis.
    pub movement_state: MovementState,
    /// Condition axis.
    pub condition_state: ConditionState,
}

impl ClientStateSnapshot {
    /// Squared distance between the two positions.
    pub fn position_error_sq(&self, other: &Self) -> f32 {
        (self.position - other.position).length_squared()
    }

    /// `1 - dot` of the two rotations.
    pub fn rotation_error(&self, other: &Self) -> f32 {
        1.0 - self.rotation.dot(other.rotation)
    }

    /// Whether both snapshots agree within the given tolerances.
    pub fn matches(&self, other: &Self, position_epsilon_sq: f32, rotation_epsilon: f32) -> bool {
        self.position_error_sq(other) < position_epsilon_sq
            && self.rotation_error(other) < rotation_epsilon
            && self.movement_state == other.movement_state
            && self.condition_state == other.condition_state
    }
}

impl From<&EntityState> for ClientStateSnapshot {
    fn from(state: &EntityState) -> Self {
        Self {
            position: state.position,
            rotation: state.rotation,
            movement_state: state.movement,
            condition_state: state.condition,
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Per-tick input with redundancy.
    Input(InputMessage),
}

impl ClientMessage {
    /// Channel this message travels on.
    pub fn channel(&self) -> ChannelType {
        match self {
            ClientMessage::Input(_) => ChannelType::Input,
        }
    }

    /// Verify message limits and validity.
    ///
    /// This should be called on all received messages.
    pub fn verify(&self) -> Result<(), &'static str> {
        match self {
            ClientMessage::Input(input) => input.verify(),
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Authoritative state of one entity.
    State {
        /// Entity the state describes.
        entity_id: EntityId,
        /// State payload.
        state: StateMessage,
    },

    /// An entity entered the session.
    Spawn {
        /// New entity.
        entity_id: EntityId,
        /// Whether the receiving client controls it.
        owned: bool,
        /// Spawn position.
        position: Vec3,
        /// Spawn rotation.
        rotation: Quat,
    },

    /// An entity left the session.
    Despawn {
        /// Removed entity.
        entity_id: EntityId,
    },
}

impl ServerMessage {
    /// Channel this message travels on.
    pub fn channel(&self) -> ChannelType {
        match self {
            ServerMessage::State { .. } => ChannelType::State,
            ServerMessage::Spawn { .. } | ServerMessage::Despawn { .. } => ChannelType::Lifecycle,
        }
    }

    /// Entity this message is about.
    pub fn entity_id(&self) -> EntityId {
        match self {
            ServerMessage::State { entity_id, .. }
            | ServerMessage::Spawn { entity_id, .. }
            | ServerMessage::Despawn { entity_id } => *entity_id,
        }
    }

    /// Verify message limits and validity.
    pub fn verify(&self) -> Result<(), &'static str> {
        match self {
            ServerMessage::State { state, .. } => state.verify(),
            ServerMessage::Spawn {
                position, rotation, ..
            } => {
                if !position.is_finite() || !rotation.is_finite() {
                    return Err("Non-finite spawn transform");
                }
                Ok(())
            }
            ServerMessage::Despawn { .. } => Ok(()),
        }
    }
}
