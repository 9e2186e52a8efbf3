//! Client session: routes server messages and ticks every known entity.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use arena_core::{
    Action, EntityId, NetConfig, SimTick, StateEventBus, StateEventReceiver, TickClock,
};
use arena_net::{
    decode_server_message, encode_client_message, ClientMessage, InboundQueue,
    PredictionMetrics, ReconcileOutcome, ServerMessage, StateMessage,
};
use arena_physics::SimContext;
use glam::{Quat, Vec2, Vec3};
use tracing::{debug, info, instrument, trace};

use crate::character::{LocalCharacter, LocalTick, RemoteCharacter};

/// One peer's view of a match.
pub struct ClientSession {
    config: NetConfig,
    ctx: SimContext,
    is_host: bool,
    clock: TickClock,
    /// Entity this peer controls, once spawned.
    local: Option<LocalCharacter>,
    /// Everyone else, keyed by entity id.
    remotes: BTreeMap<EntityId, RemoteCharacter>,
    /// Unreliable state messages, one latest-wins queue per entity.
    inbound: BTreeMap<EntityId, InboundQueue<StateMessage>>,
    /// Reliable spawn/despawn messages, applied in order.
    lifecycle: InboundQueue<ServerMessage>,
    events: StateEventBus,
}

impl ClientSession {
    /// Create a session with no entities yet.
    ///
    /// A host shares its process with the server and skips prediction.
    pub fn new(config: NetConfig, ctx: SimContext, is_host: bool) -> Self {
        Self {
            clock: TickClock::new(config.tick_rate_hz),
            config,
            ctx,
            is_host,
            local: None,
            remotes: BTreeMap::new(),
            inbound: BTreeMap::new(),
            lifecycle: InboundQueue::new(),
            events: StateEventBus::new(),
        }
    }

    /// Queue a server message; nothing is applied until the next tick.
    pub fn receive(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::State { entity_id, state } => {
                self.inbound.entry(entity_id).or_default().push(state);
            }
            lifecycle => self.lifecycle.push(lifecycle),
        }
    }

    /// Decode a datagram from the server and queue it.
    pub fn receive_frame(&mut self, frame: &[u8]) -> Result<()> {
        let msg = decode_server_message(frame).context("Bad frame from server")?;
        self.receive(msg);
        Ok(())
    }

    /// Set the stick of the local entity.
    pub fn set_movement(&mut self, movement: Vec2) {
        match &mut self.local {
            Some(local) => local.set_movement(movement),
            None => trace!("movement before spawn ignored"),
        }
    }

    /// Press a button on the local entity.
    pub fn press(&mut self, action: Action) {
        if let Some(local) = &mut self.local {
            local.press(action);
        }
    }

    /// Release a button on the local entity.
    pub fn release(&mut self, action: Action) {
        if let Some(local) = &mut self.local {
            local.release(action);
        }
    }

    /// Run one client tick.
    ///
    /// Lifecycle messages are applied first, then the local entity samples,
    /// predicts and reconciles, then remote entities take their newest
    /// state. Returns the input message to send, if an entity is owned.
    #[instrument(skip(self), fields(tick = self.clock.current().0, remotes = self.remotes.len()))]
    pub fn tick(&mut self) -> Option<ClientMessage> {
        let tick = self.clock.current();
        let pending: Vec<ServerMessage> = self.lifecycle.drain_all().collect();
        for msg in pending {
            self.apply_lifecycle(msg);
        }

        let mut outgoing = None;
        if let Some(local) = &mut self.local {
            let latest = self
                .inbound
                .get_mut(&local.id())
                .and_then(InboundQueue::drain_latest);
            let LocalTick { input, reconcile } = local.tick(tick, latest, &mut self.events);
            if let Some(ReconcileOutcome::Corrected {
                tick: corrected,
                replayed,
                snapped,
                ..
            }) = reconcile
            {
                debug!(corrected = corrected.0, replayed, snapped, "local entity corrected");
            }
            outgoing = Some(ClientMessage::Input(input));
        }

        for (entity_id, remote) in self.remotes.iter_mut() {
            let latest = self
                .inbound
                .get_mut(entity_id)
                .and_then(InboundQueue::drain_latest);
            remote.tick(latest, &self.config, &mut self.events);
        }

        // States that outlived their entity.
        let local_id = self.local.as_ref().map(LocalCharacter::id);
        self.inbound
            .retain(|id, _| Some(*id) == local_id || self.remotes.contains_key(id));

        self.clock.advance();
        outgoing
    }

    /// [`tick`](Self::tick), with the outgoing message already framed.
    pub fn tick_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.tick()
            .map(|msg| encode_client_message(&msg))
            .transpose()
    }

    fn apply_lifecycle(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Spawn {
                entity_id,
                owned,
                position,
                rotation,
            } => {
                if owned {
                    info!(entity_id, host = self.is_host, "local entity spawned");
                    self.local = Some(LocalCharacter::new(
                        entity_id,
                        self.config.clone(),
                        self.ctx,
                        self.is_host,
                        position,
                        rotation,
                    ));
                } else {
                    debug!(entity_id, "remote entity spawned");
                    self.remotes
                        .insert(entity_id, RemoteCharacter::new(entity_id, position, rotation));
                }
            }
            ServerMessage::Despawn { entity_id } => {
                self.inbound.remove(&entity_id);
                if self.local.as_ref().is_some_and(|local| local.id() == entity_id) {
                    info!(entity_id, "local entity despawned");
                    self.local = None;
                } else if self.remotes.remove(&entity_id).is_some() {
                    debug!(entity_id, "remote entity despawned");
                }
            }
            ServerMessage::State { entity_id, state } => {
                self.inbound.entry(entity_id).or_default().push(state);
            }
        }
    }

    /// Rendered transform of every entity, local first then remotes by id.
    pub fn rendered(&self) -> Vec<(EntityId, Vec3, Quat)> {
        let local = self.local.as_ref().map(|local| {
            let (position, rotation) = local.rendered();
            (local.id(), position, rotation)
        });
        local
            .into_iter()
            .chain(self.remotes.values().map(|remote| {
                let (position, rotation) = remote.rendered(&self.config);
                (remote.id(), position, rotation)
            }))
            .collect()
    }

    /// Subscribe to state transitions of every entity this peer knows.
    pub fn subscribe(&mut self) -> StateEventReceiver {
        self.events.subscribe()
    }

    /// Locally controlled entity.
    pub fn local(&self) -> Option<&LocalCharacter> {
        self.local.as_ref()
    }

    /// A remote entity.
    pub fn remote(&self, entity_id: EntityId) -> Option<&RemoteCharacter> {
        self.remotes.get(&entity_id)
    }

    /// Ids of remote entities, ascending.
    pub fn remote_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.remotes.keys().copied()
    }

    /// Prediction metrics of the local entity.
    pub fn prediction_metrics(&self) -> Option<&PredictionMetrics> {
        self.local.as_ref().and_then(LocalCharacter::metrics)
    }

    /// Client tick about to run.
    pub fn current_tick(&self) -> SimTick {
        self.clock.current()
    }

    /// Whether this peer hosts the server.
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Tuning in use.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{MovementState, StateEvent};
    use arena_net::encode_server_message;
    use arena_physics::EntityState;

    fn session(is_host: bool) -> ClientSession {
        ClientSession::new(NetConfig::default(), SimContext::default(), is_host)
    }

    fn spawn(entity_id: EntityId, owned: bool) -> ServerMessage {
        ServerMessage::Spawn {
            entity_id,
            owned,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn no_input_before_spawn() {
        let mut client = session(false);
        client.set_movement(Vec2::X);
        assert!(client.tick().is_none());
        assert_eq!(client.current_tick(), SimTick(2));
    }

    #[test]
    fn owned_spawn_starts_sending_input() {
        let mut client = session(false);
        client.receive(spawn(3, true));
        client.receive(spawn(4, false));
        client.set_movement(Vec2::X);
        // Controls set before the spawn was applied are dropped.
        let Some(ClientMessage::Input(first)) = client.tick() else {
            panic!("expected input");
        };
        assert_eq!(first.tick, SimTick(1));
        assert!(first.samples[0].is_idle());

        client.set_movement(Vec2::X);
        let Some(ClientMessage::Input(second)) = client.tick() else {
            panic!("expected input");
        };
        assert_eq!(second.samples.len(), 2);
        assert_eq!(second.newest().map(|s| s.movement), Some(Vec2::X));
        assert_eq!(client.remote_ids().collect::<Vec<_>>(), vec![4]);
        assert_eq!(client.rendered().len(), 2);
        assert_eq!(client.rendered()[0].0, 3);
    }

    #[test]
    fn remote_state_routed_through_frames() {
        let mut client = session(false);
        let events = client.subscribe();
        client.receive(spawn(7, false));
        client.tick();

        let mut state = EntityState::default();
        state.position = Vec3::new(0.0, 0.0, 20.0);
        state.movement = MovementState::Running;
        let older = ServerMessage::State {
            entity_id: 7,
            state: StateMessage::from_state(SimTick(2), 0.02, &EntityState::default()),
        };
        let newer = ServerMessage::State {
            entity_id: 7,
            state: StateMessage::from_state(SimTick(4), 0.02, &state),
        };
        client
            .receive_frame(&encode_server_message(&older).unwrap())
            .unwrap();
        client
            .receive_frame(&encode_server_message(&newer).unwrap())
            .unwrap();
        client.tick();

        let remote = client.remote(7).unwrap();
        assert_eq!(remote.interpolator().last_applied(), SimTick(4));
        // 20 units is past the snap distance.
        assert_eq!(client.rendered()[0].1, state.position);
        assert!(matches!(
            events.drain().as_slice(),
            [StateEvent::MovementChanged {
                entity: 7,
                new: MovementState::Running,
                ..
            }]
        ));
        assert!(client.receive_frame(&[1, 2, 3]).is_err());
    }

    #[test]
    fn despawn_removes_entity_and_queue() {
        let mut client = session(false);
        client.receive(spawn(1, true));
        client.receive(spawn(2, false));
        client.tick();
        client.receive(ServerMessage::Despawn { entity_id: 1 });
        client.receive(ServerMessage::Despawn { entity_id: 2 });
        assert!(client.tick().is_none());
        assert!(client.local().is_none());
        assert!(client.remote(2).is_none());
        assert!(client.rendered().is_empty());
    }

    #[test]
    fn host_session_has_no_prediction() {
        let mut client = session(true);
        client.receive(spawn(1, true));
        let frame = client.tick_frame().unwrap();
        assert!(frame.is_some());
        assert!(client.prediction_metrics().is_none());
        assert!(client.local().is_some_and(LocalCharacter::is_host));
    }
}
