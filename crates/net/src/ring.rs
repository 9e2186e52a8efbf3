//! Tick-indexed ring buffer.
//!
//! Every slot remembers the tick it was written for, so a lookup after the
//! ring has wrapped reports the overwrite instead of returning data from
//! another tick.

use arena_core::SimTick;

use crate::SyncError;

#[derive(Debug, Clone)]
struct Slot<T> {
    tick: SimTick,
    value: T,
}

/// Fixed-capacity buffer indexed by `tick mod capacity`.
#[derive(Debug, Clone)]
pub struct TickRing<T> {
    slots: Vec<Option<Slot<T>>>,
}

impl<T> TickRing<T> {
    /// Create an empty ring with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Store `value` for `tick`, replacing whatever occupied its slot.
    pub fn insert(&mut self, tick: SimTick, value: T) {
        let index = tick.slot(self.slots.len());
        self.slots[index] = Some(Slot { tick, value });
    }

    /// Value stored for exactly `tick`.
    pub fn get(&self, tick: SimTick) -> Option<&T> {
        self.lookup(tick).ok()
    }

    /// Value stored for exactly `tick`, or why it is unavailable.
    pub fn lookup(&self, tick: SimTick) -> Result<&T, SyncError> {
        match &self.slots[tick.slot(self.slots.len())] {
            Some(slot) if slot.tick == tick => Ok(&slot.value),
            other => Err(SyncError::StaleBufferSlot {
                expected: tick,
                found: other.as_ref().map(|slot| slot.tick),
            }),
        }
    }

    /// Forget every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}
