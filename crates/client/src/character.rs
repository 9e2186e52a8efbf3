//! Client-side entities: the locally controlled one and remote ones.

use arena_core::{
    Action, ConditionState, EntityId, MovementState, NetConfig, SimTick, StateEvent,
    StateEventBus, StateMachine,
};
use arena_net::{
    ClientPredictor, InputMessage, InputSampler, PredictionMetrics, ReconcileOutcome,
    RemoteInterpolator, RemoteOutcome, StateMessage, SyncError,
};
use arena_physics::{EntityState, SimContext, TopDownStepper};
use glam::{Quat, Vec2, Vec3};
use tracing::debug;

/// Publishes state-axis changes of one entity.
#[derive(Debug, Clone)]
struct TransitionTracker {
    entity: EntityId,
    movement: StateMachine<MovementState>,
    condition: StateMachine<ConditionState>,
}

impl TransitionTracker {
    fn new(entity: EntityId, movement: MovementState, condition: ConditionState) -> Self {
        Self {
            entity,
            movement: StateMachine::new(movement),
            condition: StateMachine::new(condition),
        }
    }

    fn observe(
        &mut self,
        movement: MovementState,
        condition: ConditionState,
        events: &mut StateEventBus,
    ) {
        if let Some(transition) = self.movement.change_state(movement) {
            events.publish(StateEvent::movement(self.entity, transition));
        }
        if let Some(transition) = self.condition.change_state(condition) {
            events.publish(StateEvent::condition(self.entity, transition));
        }
    }
}

enum Simulation {
    /// Remote client: predict ahead and reconcile.
    Predicted(Box<ClientPredictor<TopDownStepper>>),
    /// Host: the server is local, its states are applied as they come.
    Direct {
        state: EntityState,
        last_applied: SimTick,
    },
}

/// What one tick of the local entity produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTick {
    /// Input message to send this tick.
    pub input: InputMessage,
    /// Result of handling the newest state message, if one arrived.
    pub reconcile: Option<ReconcileOutcome>,
}

/// The entity this peer controls.
pub struct LocalCharacter {
    id: EntityId,
    config: NetConfig,
    sampler: InputSampler,
    simulation: Simulation,
    tracker: TransitionTracker,
}

impl LocalCharacter {
    /// Controlled entity spawned at `position`/`rotation`.
    ///
    /// A host does not predict: it renders the authoritative state directly.
    pub fn new(
        id: EntityId,
        config: NetConfig,
        ctx: SimContext,
        is_host: bool,
        position: Vec3,
        rotation: Quat,
    ) -> Self {
        let initial = EntityState::spawned(position, rotation);
        let sampler = InputSampler::new(
            config.redundancy_for(is_host),
            config.max_redundant_inputs,
        );
        let simulation = if is_host {
            Simulation::Direct {
                state: initial,
                last_applied: SimTick::ZERO,
            }
        } else {
            Simulation::Predicted(Box::new(ClientPredictor::new(
                TopDownStepper::predictive(ctx),
                config.clone(),
                initial,
            )))
        };
        Self {
            id,
            sampler,
            simulation,
            tracker: TransitionTracker::new(id, initial.movement, initial.condition),
            config,
        }
    }

    /// Set the stick.
    pub fn set_movement(&mut self, movement: Vec2) {
        self.sampler.set_movement(movement);
    }

    /// A button went down.
    pub fn press(&mut self, action: Action) {
        self.sampler.press(action);
    }

    /// A button went up.
    pub fn release(&mut self, action: Action) {
        self.sampler.release(action);
    }

    /// Run client tick `tick`: sample and build the input message, predict,
    /// then reconcile against `latest` (the newest state received) and decay
    /// the visual offset.
    pub fn tick(
        &mut self,
        tick: SimTick,
        latest: Option<StateMessage>,
        events: &mut StateEventBus,
    ) -> LocalTick {
        let sample = self.sampler.sample(tick);
        let input = self.sampler.message(tick, self.config.fixed_delta());
        self.sampler.step_keys();

        let reconcile = match &mut self.simulation {
            Simulation::Predicted(predictor) => {
                predictor.predict(tick, sample);
                let outcome = latest.map(|msg| predictor.reconcile(&msg, tick));
                predictor.smooth();
                outcome
            }
            Simulation::Direct {
                state,
                last_applied,
            } => latest.map(|msg| apply_direct(state, last_applied, &msg)),
        };

        if let Some(outcome) = &reconcile {
            if let Some(tick) = accepted_tick(outcome) {
                self.sampler.acknowledge(tick);
            }
        }

        let state = *self.state();
        self.tracker.observe(state.movement, state.condition, events);
        LocalTick { input, reconcile }
    }

    /// Current simulated (or, for a host, authoritative) state.
    pub fn state(&self) -> &EntityState {
        match &self.simulation {
            Simulation::Predicted(predictor) => predictor.state(),
            Simulation::Direct { state, .. } => state,
        }
    }

    /// Transform to draw this tick.
    pub fn rendered(&self) -> (Vec3, Quat) {
        match &self.simulation {
            Simulation::Predicted(predictor) => predictor.rendered(),
            Simulation::Direct { state, .. } => (state.position, state.rotation),
        }
    }

    /// Prediction metrics; `None` for a host.
    pub fn metrics(&self) -> Option<&PredictionMetrics> {
        match &self.simulation {
            Simulation::Predicted(predictor) => Some(predictor.metrics()),
            Simulation::Direct { .. } => None,
        }
    }

    /// Length of the visual offset still being smoothed out.
    pub fn offset_distance(&self) -> f32 {
        match &self.simulation {
            Simulation::Predicted(predictor) => predictor.offset().position_delta.length(),
            Simulation::Direct { .. } => 0.0,
        }
    }

    /// Whether this entity is driven directly by a local server.
    pub fn is_host(&self) -> bool {
        matches!(self.simulation, Simulation::Direct { .. })
    }

    /// Entity id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Newest state tick acknowledged to the sampler.
    pub fn last_acked(&self) -> SimTick {
        self.sampler.last_acked()
    }
}

fn apply_direct(
    state: &mut EntityState,
    last_applied: &mut SimTick,
    msg: &StateMessage,
) -> ReconcileOutcome {
    if msg.tick <= *last_applied {
        return ReconcileOutcome::Rejected(SyncError::StaleMessage {
            tick: msg.tick,
            last: *last_applied,
        });
    }
    *last_applied = msg.tick;
    state.position = msg.position;
    state.rotation = msg.rotation;
    state.movement = msg.movement_state;
    state.condition = msg.condition_state;
    ReconcileOutcome::Confirmed { tick: msg.tick }
}

fn accepted_tick(outcome: &ReconcileOutcome) -> Option<SimTick> {
    match outcome {
        ReconcileOutcome::Rejected(_) => None,
        ReconcileOutcome::Confirmed { tick }
        | ReconcileOutcome::Detected { tick, .. }
        | ReconcileOutcome::Corrected { tick, .. } => Some(*tick),
    }
}

/// An entity controlled by another peer.
#[derive(Debug, Clone)]
pub struct RemoteCharacter {
    id: EntityId,
    interpolator: RemoteInterpolator,
    tracker: TransitionTracker,
}

impl RemoteCharacter {
    /// Remote entity spawned at `position`/`rotation`.
    pub fn new(id: EntityId, position: Vec3, rotation: Quat) -> Self {
        Self {
            id,
            interpolator: RemoteInterpolator::new(position, rotation),
            tracker: TransitionTracker::new(id, MovementState::Idle, ConditionState::Normal),
        }
    }

    /// Apply the newest state (if any) and decay the visual offset.
    pub fn tick(
        &mut self,
        latest: Option<StateMessage>,
        config: &NetConfig,
        events: &mut StateEventBus,
    ) -> Option<RemoteOutcome> {
        let outcome = latest.map(|msg| self.interpolator.apply(&msg, config));
        if let Some(RemoteOutcome::Corrected { snapped: true }) = outcome {
            debug!(entity = self.id, "remote entity snapped");
        }
        self.interpolator.smooth(config);
        self.tracker.observe(
            self.interpolator.movement(),
            self.interpolator.condition(),
            events,
        );
        outcome
    }

    /// Transform to draw this tick.
    pub fn rendered(&self, config: &NetConfig) -> (Vec3, Quat) {
        self.interpolator.rendered(config)
    }

    /// Underlying interpolator.
    pub fn interpolator(&self) -> &RemoteInterpolator {
        &self.interpolator
    }

    /// Entity id.
    pub fn id(&self) -> EntityId {
        self.id
    }
}
