//! Deterministic loopback: one server session and several client sessions
//! joined by simulated links, stepped in lockstep from a single thread.

use anyhow::{anyhow, Context, Result};
use arena_client::ClientSession;
use arena_core::{Action, EntityId, NetConfig, SimTick};
use arena_net::encode_server_message;
use arena_physics::SimContext;
use arena_server::ServerSession;
use glam::{Quat, Vec2, Vec3};
use tracing::{debug, info, instrument, warn};

use crate::link::{LinkConfig, LinkStats, LossyLink};
use crate::metrics::{ConvergenceMetrics, NetworkMetrics, PredictionReport};
use crate::trace::{JsonlSink, Peer, TraceDigest, TraceRecord};

/// Distance under which a client counts as agreeing with the server.
pub const CONVERGENCE_EPSILON: f32 = 1e-3;

/// Visual offset under which smoothing counts as settled.
pub const SETTLED_OFFSET: f32 = 0.05;

struct ClientPeer {
    session: ClientSession,
    entity: EntityId,
    uplink: LossyLink,
    downlink: LossyLink,
}

/// Server plus clients over lossy links.
pub struct LoopbackHarness {
    config: NetConfig,
    ctx: SimContext,
    link: LinkConfig,
    server: ServerSession,
    clients: Vec<ClientPeer>,
    tick: SimTick,
    digest: TraceDigest,
    sink: Option<JsonlSink>,
    rejected_frames: u64,
}

impl LoopbackHarness {
    /// Empty harness; every client added later uses `link` in both directions.
    pub fn new(config: NetConfig, ctx: SimContext, link: LinkConfig) -> Result<Self> {
        config
            .verify()
            .map_err(|err| anyhow!("Invalid net config: {err}"))?;
        link.verify()
            .map_err(|err| anyhow!("Invalid link config: {err}"))?;
        Ok(Self {
            server: ServerSession::new(config.clone(), ctx),
            config,
            ctx,
            link,
            clients: Vec::new(),
            tick: SimTick::FIRST,
            digest: TraceDigest::new(),
            sink: None,
            rejected_frames: 0,
        })
    }

    /// Also write every trace record to `sink`.
    pub fn with_trace_sink(mut self, sink: JsonlSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Spawn an entity for a new client and announce it; returns the client index.
    ///
    /// A host client talks to the server over a perfect link.
    pub fn add_client(&mut self, position: Vec3, is_host: bool) -> Result<usize> {
        let index = self.clients.len();
        let entity = self.server.spawn(position, Quat::IDENTITY);
        let link = if is_host {
            LinkConfig::perfect()
        } else {
            self.link
        };
        let salt = index as u64 * 2;
        let mut peer = ClientPeer {
            session: ClientSession::new(self.config.clone(), self.ctx, is_host),
            entity,
            uplink: LossyLink::new(link, salt + 1),
            downlink: LossyLink::new(link, salt + 2),
        };

        let ids: Vec<EntityId> = self.server.entity_ids().collect();
        for id in ids {
            let spawn = self
                .server
                .spawn_message(id, id == entity)
                .with_context(|| format!("Entity {id} vanished while announcing"))?;
            peer.downlink
                .send_reliable(self.tick, encode_server_message(&spawn)?);
        }
        let announce = self
            .server
            .spawn_message(entity, false)
            .with_context(|| format!("Entity {entity} vanished while announcing"))?;
        let frame = encode_server_message(&announce)?;
        for other in &mut self.clients {
            other.downlink.send_reliable(self.tick, frame.clone());
        }

        info!(index, entity, is_host, "client joined");
        self.clients.push(peer);
        Ok(index)
    }

    /// Despawn a client's entity and drop the client.
    pub fn remove_client(&mut self, index: usize) -> Result<()> {
        if index >= self.clients.len() {
            return Err(anyhow!("No client at index {index}"));
        }
        let peer = self.clients.remove(index);
        if let Some(despawn) = self.server.despawn(peer.entity) {
            let frame = encode_server_message(&despawn)?;
            for other in &mut self.clients {
                other.downlink.send_reliable(self.tick, frame.clone());
            }
        }
        info!(index, entity = peer.entity, "client left");
        Ok(())
    }

    /// Set the stick of a client.
    pub fn set_movement(&mut self, index: usize, movement: Vec2) {
        if let Some(peer) = self.clients.get_mut(index) {
            peer.session.set_movement(movement);
        }
    }

    /// Press a button on a client.
    pub fn press(&mut self, index: usize, action: Action) {
        if let Some(peer) = self.clients.get_mut(index) {
            peer.session.press(action);
        }
    }

    /// Release a button on a client.
    pub fn release(&mut self, index: usize, action: Action) {
        if let Some(peer) = self.clients.get_mut(index) {
            peer.session.release(action);
        }
    }

    /// Run one tick everywhere: clients receive and tick and send, then the
    /// server receives and ticks and broadcasts, then the tick is traced.
    #[instrument(skip(self), fields(tick = self.tick.0))]
    pub fn step(&mut self) -> Result<()> {
        let now = self.tick;

        for peer in &mut self.clients {
            for frame in peer.downlink.deliver(now) {
                if let Err(err) = peer.session.receive_frame(&frame) {
                    warn!(entity = peer.entity, "client dropped frame: {err:#}");
                    self.rejected_frames += 1;
                }
            }
            if let Some(frame) = peer.session.tick_frame()? {
                peer.uplink.send_unreliable(now, frame);
            }
        }

        for peer in &mut self.clients {
            for frame in peer.uplink.deliver(now) {
                if let Err(err) = self.server.receive_frame(peer.entity, &frame) {
                    warn!(entity = peer.entity, "server dropped frame: {err:#}");
                    self.rejected_frames += 1;
                }
            }
        }

        let outgoing = self.server.tick();
        for msg in &outgoing {
            let frame = encode_server_message(msg)?;
            for peer in &mut self.clients {
                peer.downlink.send_unreliable(now, frame.clone());
            }
        }
        debug!(states = outgoing.len(), "server broadcast");

        self.record(now)?;
        self.tick = now.next();
        Ok(())
    }

    /// Run `ticks` steps.
    pub fn run(&mut self, ticks: u32) -> Result<()> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    fn record(&mut self, now: SimTick) -> Result<()> {
        let mut records = Vec::new();
        for id in self.server.entity_ids() {
            if let Some(character) = self.server.character(id) {
                let state = character.state();
                records.push(TraceRecord::new(
                    now,
                    Peer::Server,
                    id,
                    state.position,
                    state.rotation,
                    state.movement,
                    state.condition,
                    0.0,
                ));
            }
        }
        for (index, peer) in self.clients.iter().enumerate() {
            let session = &peer.session;
            if let Some(local) = session.local() {
                let (position, rotation) = local.rendered();
                let state = local.state();
                records.push(TraceRecord::new(
                    now,
                    Peer::Client(index),
                    local.id(),
                    position,
                    rotation,
                    state.movement,
                    state.condition,
                    local.offset_distance(),
                ));
            }
            for id in session.remote_ids() {
                if let Some(remote) = session.remote(id) {
                    let (position, rotation) = remote.rendered(session.config());
                    let interpolator = remote.interpolator();
                    records.push(TraceRecord::new(
                        now,
                        Peer::Client(index),
                        id,
                        position,
                        rotation,
                        interpolator.movement(),
                        interpolator.condition(),
                        interpolator.offset().position_delta.length(),
                    ));
                }
            }
        }

        for record in &records {
            self.digest.update(record)?;
            if let Some(sink) = &mut self.sink {
                sink.write(record)?;
            }
        }
        Ok(())
    }

    /// Distance between a client's simulated entity and the server's.
    pub fn divergence(&self, index: usize) -> Option<f32> {
        let peer = self.clients.get(index)?;
        let local = peer.session.local()?;
        let server = self.server.character(peer.entity)?;
        Some(local.state().position.distance(server.state().position))
    }

    /// Whether every client agrees with the server and has settled visually.
    pub fn convergence(&self) -> ConvergenceMetrics {
        let mut final_position_error = 0.0f32;
        let mut final_offset = 0.0f32;
        for (index, peer) in self.clients.iter().enumerate() {
            if let Some(error) = self.divergence(index) {
                final_position_error = final_position_error.max(error);
            }
            if let Some(local) = peer.session.local() {
                final_offset = final_offset.max(local.offset_distance());
            }
        }
        ConvergenceMetrics {
            final_position_error: f64::from(final_position_error),
            final_offset: f64::from(final_offset),
            converged: final_position_error < CONVERGENCE_EPSILON
                && final_offset < SETTLED_OFFSET,
        }
    }

    /// Link traffic summed over every client link.
    pub fn network_metrics(&self) -> NetworkMetrics {
        let mut metrics = NetworkMetrics {
            rejected_frames: self.rejected_frames,
            ..NetworkMetrics::default()
        };
        for peer in &self.clients {
            for stats in [peer.uplink.stats(), peer.downlink.stats()] {
                let LinkStats {
                    sent,
                    dropped,
                    delivered,
                    bytes_sent,
                } = stats;
                metrics.messages_sent += sent;
                metrics.messages_dropped += dropped;
                metrics.messages_received += delivered;
                metrics.bytes_sent += bytes_sent;
            }
        }
        metrics
    }

    /// Prediction counters summed over predicting clients.
    pub fn prediction_report(&self) -> PredictionReport {
        let mut report = PredictionReport::default();
        for peer in &self.clients {
            if let Some(metrics) = peer.session.prediction_metrics() {
                report.absorb(metrics);
            }
        }
        report
    }

    /// Authoritative session.
    pub fn server(&self) -> &ServerSession {
        &self.server
    }

    /// Client session by index.
    pub fn client(&self, index: usize) -> Option<&ClientSession> {
        self.clients.get(index).map(|peer| &peer.session)
    }

    /// Entity owned by a client.
    pub fn client_entity(&self, index: usize) -> Option<EntityId> {
        self.clients.get(index).map(|peer| peer.entity)
    }

    /// Number of clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Next tick to run.
    pub fn current_tick(&self) -> SimTick {
        self.tick
    }

    /// Trace digest so far.
    pub fn digest(&self) -> &TraceDigest {
        &self.digest
    }

    /// Peek at the messages still waiting on a client's downlink.
    pub fn pending_downlink(&self, index: usize) -> Option<usize> {
        self.clients.get(index).map(|peer| peer.downlink.in_flight())
    }
}
