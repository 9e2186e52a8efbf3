//! Server session: every connected entity, ticked together.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use arena_core::{
    ConditionState, EntityId, NetConfig, SimTick, StateEventBus, StateEventReceiver, TickClock,
};
use arena_net::{decode_client_message, ClientMessage, InputMessage, ServerMessage};
use arena_physics::{EntityState, SimContext, TopDownStepper};
use glam::{Quat, Vec3};
use tracing::{debug, info, instrument, warn};

use crate::character::{ServerCharacter, TickReport};

/// Authoritative simulation of all entities in one match.
pub struct ServerSession {
    config: NetConfig,
    ctx: SimContext,
    clock: TickClock,
    characters: BTreeMap<EntityId, ServerCharacter<TopDownStepper>>,
    next_entity_id: EntityId,
    events: StateEventBus,
}

impl ServerSession {
    /// Create an empty session.
    pub fn new(config: NetConfig, ctx: SimContext) -> Self {
        Self {
            clock: TickClock::new(config.tick_rate_hz),
            config,
            ctx,
            characters: BTreeMap::new(),
            next_entity_id: 1,
            events: StateEventBus::new(),
        }
    }

    /// Add an entity and return its id.
    pub fn spawn(&mut self, position: Vec3, rotation: Quat) -> EntityId {
        let entity_id = self.next_entity_id;
        self.next_entity_id += 1;

        let character = ServerCharacter::new(
            entity_id,
            TopDownStepper::authoritative(self.ctx),
            self.config.clone(),
            EntityState::spawned(position, rotation),
        );
        self.characters.insert(entity_id, character);
        info!(entity_id, ?position, "entity spawned");
        entity_id
    }

    /// Lifecycle message announcing `entity_id` to a client.
    pub fn spawn_message(&self, entity_id: EntityId, owned: bool) -> Option<ServerMessage> {
        let state = self.characters.get(&entity_id)?.state();
        Some(ServerMessage::Spawn {
            entity_id,
            owned,
            position: state.position,
            rotation: state.rotation,
        })
    }

    /// Remove an entity; returns the lifecycle message to broadcast.
    pub fn despawn(&mut self, entity_id: EntityId) -> Option<ServerMessage> {
        self.characters.remove(&entity_id)?;
        info!(entity_id, "entity despawned");
        Some(ServerMessage::Despawn { entity_id })
    }

    /// Queue an input message for `entity_id`.
    pub fn enqueue_input(&mut self, entity_id: EntityId, msg: InputMessage) {
        match self.characters.get_mut(&entity_id) {
            Some(character) => character.enqueue(msg),
            None => debug!(entity_id, "input for unknown entity dropped"),
        }
    }

    /// Decode a frame received from the client controlling `entity_id` and queue it.
    pub fn receive_frame(&mut self, entity_id: EntityId, frame: &[u8]) -> Result<()> {
        let msg = decode_client_message(frame)
            .with_context(|| format!("Bad frame from entity {entity_id}"))?;
        match msg {
            ClientMessage::Input(input) => self.enqueue_input(entity_id, input),
        }
        Ok(())
    }

    /// Run one server tick for every entity; returns the state envelopes to broadcast.
    #[instrument(skip(self), fields(tick = self.clock.current().0, entities = self.characters.len()))]
    pub fn tick(&mut self) -> Vec<ServerMessage> {
        let mut outgoing = Vec::new();
        for (&entity_id, character) in self.characters.iter_mut() {
            let TickReport {
                outgoing: state,
                skipped,
                ..
            } = character.tick(&mut self.events);
            if skipped > 0 {
                warn!(entity_id, skipped, "input window did not cover the gap");
            }
            if let Some(state) = state {
                outgoing.push(ServerMessage::State { entity_id, state });
            }
        }
        self.clock.advance();
        outgoing
    }

    /// Put `entity_id` under a condition, optionally for a number of server ticks.
    pub fn apply_condition(
        &mut self,
        entity_id: EntityId,
        condition: ConditionState,
        duration_ticks: Option<u32>,
    ) -> bool {
        let Some(character) = self.characters.get_mut(&entity_id) else {
            return false;
        };
        character.apply_condition(condition, duration_ticks, &mut self.events);
        true
    }

    /// Subscribe to state transitions of every entity.
    pub fn subscribe(&mut self) -> StateEventReceiver {
        self.events.subscribe()
    }

    /// Authoritative entity.
    pub fn character(&self, entity_id: EntityId) -> Option<&ServerCharacter<TopDownStepper>> {
        self.characters.get(&entity_id)
    }

    /// Ids of every entity, ascending.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.characters.keys().copied()
    }

    /// Server tick about to run.
    pub fn current_tick(&self) -> SimTick {
        self.clock.current()
    }

    /// Tuning in use.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }
}
