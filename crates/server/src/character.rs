//! Authoritative per-entity simulation.

use arena_core::{
    ConditionState, EntityId, MovementState, NetConfig, SimTick, StateEvent, StateEventBus,
    StateMachine,
};
use arena_net::{InboundQueue, InputMessage, StateMessage, SyncError};
use arena_physics::{EntityState, Stepper};
use tracing::{debug, warn};

/// What one server tick did for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// State produced for every processed input tick, oldest first.
    pub produced: Vec<StateMessage>,
    /// State to transmit this tick, if any.
    pub outgoing: Option<StateMessage>,
    /// Ticks skipped because the window did not reach back far enough.
    pub skipped: u32,
    /// Set when the drained message was not newer than the last processed tick.
    pub rejected: Option<SyncError>,
}

#[derive(Debug, Clone, Copy)]
struct TimedCondition {
    remaining_ticks: u32,
}

/// Server-side state of one connected entity.
#[derive(Debug)]
pub struct ServerCharacter<S> {
    id: EntityId,
    stepper: S,
    config: NetConfig,
    state: EntityState,
    inbound: InboundQueue<InputMessage>,
    last_processed: SimTick,
    movement: StateMachine<MovementState>,
    condition: StateMachine<ConditionState>,
    timed_condition: Option<TimedCondition>,
}

impl<S: Stepper> ServerCharacter<S> {
    /// Entity `id` starting in `initial`.
    pub fn new(id: EntityId, stepper: S, config: NetConfig, initial: EntityState) -> Self {
        Self {
            id,
            stepper,
            config,
            movement: StateMachine::new(initial.movement),
            condition: StateMachine::new(initial.condition),
            state: initial,
            inbound: InboundQueue::new(),
            last_processed: SimTick::ZERO,
            timed_condition: None,
        }
    }

    /// Network receipt: queue only, processed on the next tick.
    pub fn enqueue(&mut self, msg: InputMessage) {
        self.inbound.push(msg);
    }

    /// Run one server tick.
    ///
    /// Only the most recently received input message is used. Every input
    /// tick between the last processed one and the message's tick is
    /// simulated from the message's redundant window.
    pub fn tick(&mut self, events: &mut StateEventBus) -> TickReport {
        self.tick_condition(events);

        let mut report = TickReport::default();
        let Some(msg) = self.inbound.drain_latest() else {
            return report;
        };
        if msg.tick <= self.last_processed {
            let err = SyncError::StaleMessage {
                tick: msg.tick,
                last: self.last_processed,
            };
            debug!(entity = self.id, %err, "input ignored");
            report.rejected = Some(err);
            return report;
        }

        let dt = self.config.fixed_delta();
        let ticks = msg.tick.since(self.last_processed);
        let len = msg.samples.len();
        let reachable = ticks.min(u32::try_from(len).unwrap_or(u32::MAX));
        report.skipped = ticks - reachable;
        if report.skipped > 0 {
            let err = SyncError::BufferIndexOutOfRange {
                index: len as i64 - i64::from(ticks),
                len,
            };
            warn!(entity = self.id, skipped = report.skipped, %err, "ticks skipped");
        }
        let first = len - reachable as usize;
        for (offset, sample) in msg.samples[first..].iter().enumerate() {
            let state_tick = SimTick(msg.tick.0 - (reachable - 1 - offset as u32));
            self.state = self.stepper.step(&self.state, sample, dt);
            self.publish_transitions(events);
            report
                .produced
                .push(StateMessage::from_state(state_tick, dt, &self.state));
        }
        self.last_processed = msg.tick;

        report.outgoing = report
            .produced
            .last()
            .filter(|state| state.tick.is_multiple_of(self.config.state_send_divisor))
            .copied();
        report
    }

    /// Put the entity under `condition`.
    ///
    /// With `duration_ticks` the entity returns to `Normal`/`Idle` after that
    /// many server ticks; without, it stays until [`Self::clear_condition`].
    pub fn apply_condition(
        &mut self,
        condition: ConditionState,
        duration_ticks: Option<u32>,
        events: &mut StateEventBus,
    ) {
        self.state.condition = condition;
        if condition == ConditionState::Stunned {
            self.state.movement = MovementState::None;
            self.state.reset_motion();
        }
        self.timed_condition = duration_ticks.map(|remaining_ticks| TimedCondition {
            remaining_ticks: remaining_ticks.max(1),
        });
        self.publish_transitions(events);
    }

    /// Return to `Normal`/`Idle`.
    pub fn clear_condition(&mut self, events: &mut StateEventBus) {
        self.timed_condition = None;
        self.state.condition = ConditionState::Normal;
        self.state.movement = MovementState::Idle;
        self.state.reset_motion();
        self.publish_transitions(events);
    }

    fn tick_condition(&mut self, events: &mut StateEventBus) {
        let Some(timer) = self.timed_condition.as_mut() else {
            return;
        };
        timer.remaining_ticks -= 1;
        if timer.remaining_ticks == 0 {
            self.clear_condition(events);
        }
    }

    fn publish_transitions(&mut self, events: &mut StateEventBus) {
        if let Some(transition) = self.movement.change_state(self.state.movement) {
            events.publish(StateEvent::movement(self.id, transition));
        }
        if let Some(transition) = self.condition.change_state(self.state.condition) {
            events.publish(StateEvent::condition(self.id, transition));
        }
    }

    /// Entity id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Authoritative state.
    pub fn state(&self) -> &EntityState {
        &self.state
    }

    /// Last input tick simulated.
    pub fn last_processed(&self) -> SimTick {
        self.last_processed
    }

    /// Number of input messages waiting for the next tick.
    pub fn pending_inputs(&self) -> usize {
        self.inbound.len()
    }
}
