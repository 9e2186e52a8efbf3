//! Typed state-change event bus.
//!
//! Presentation layers (animation, effects, audio) subscribe here instead of
//! hooking into the simulation. Publishing never blocks.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::state::{ConditionState, MovementState, Transition};
use crate::EntityId;

/// A state transition observed on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Movement axis changed.
    MovementChanged {
        /// Entity the change applies to.
        entity: EntityId,
        /// Previous state.
        old: MovementState,
        /// New state.
        new: MovementState,
    },
    /// Condition axis changed.
    ConditionChanged {
        /// Entity the change applies to.
        entity: EntityId,
        /// Previous state.
        old: ConditionState,
        /// New state.
        new: ConditionState,
    },
}

impl StateEvent {
    /// Build a movement event from a transition.
    pub fn movement(entity: EntityId, transition: Transition<MovementState>) -> Self {
        Self::MovementChanged {
            entity,
            old: transition.old,
            new: transition.new,
        }
    }

    /// Build a condition event from a transition.
    pub fn condition(entity: EntityId, transition: Transition<ConditionState>) -> Self {
        Self::ConditionChanged {
            entity,
            old: transition.old,
            new: transition.new,
        }
    }

    /// Entity the event refers to.
    pub fn entity(&self) -> EntityId {
        match *self {
            Self::MovementChanged { entity, .. } | Self::ConditionChanged { entity, .. } => entity,
        }
    }
}

/// Receiving end handed out by [`StateEventBus::subscribe`].
#[derive(Debug)]
pub struct StateEventReceiver {
    rx: Receiver<StateEvent>,
}

impl StateEventReceiver {
    /// Next pending event, if any.
    pub fn try_next(&self) -> Option<StateEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drain every pending event.
    pub fn drain(&self) -> Vec<StateEvent> {
        self.rx.try_iter().collect()
    }
}

/// Fan-out bus for [`StateEvent`]s.
#[derive(Debug, Default)]
pub struct StateEventBus {
    subscribers: Vec<Sender<StateEvent>>,
}

impl StateEventBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> StateEventReceiver {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        StateEventReceiver { rx }
    }

    /// Deliver `event` to every live subscriber, forgetting dropped ones.
    pub fn publish(&mut self, event: StateEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    /// Number of live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
