//! Fixed-timestep tick clock.

use crate::SimTick;

/// Per-peer tick counter, advanced exactly once per fixed simulation step.
#[derive(Debug, Clone)]
pub struct TickClock {
    current: SimTick,
    fixed_delta: f32,
}

impl TickClock {
    /// Create a clock running at `tick_rate_hz`, starting at [`SimTick::FIRST`].
    pub fn new(tick_rate_hz: u32) -> Self {
        Self {
            current: SimTick::FIRST,
            fixed_delta: 1.0 / tick_rate_hz.max(1) as f32,
        }
    }

    /// Tick currently being simulated.
    pub fn current(&self) -> SimTick {
        self.current
    }

    /// Seconds covered by one tick.
    pub fn fixed_delta(&self) -> f32 {
        self.fixed_delta
    }

    /// Finish the current tick and move to the next one.
    pub fn advance(&mut self) -> SimTick {
        self.current = self.current.next();
        self.current
    }
}

/// Accumulates variable frame time and releases whole fixed ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: f32,
    accumulator: f32,
    max_ticks_per_frame: u32,
}

impl FixedTimestep {
    /// Create an accumulator for `tick_rate_hz`, releasing at most
    /// `max_ticks_per_frame` ticks per call to [`FixedTimestep::accumulate`].
    pub fn new(tick_rate_hz: u32, max_ticks_per_frame: u32) -> Self {
        Self {
            step: 1.0 / tick_rate_hz.max(1) as f32,
            accumulator: 0.0,
            max_ticks_per_frame: max_ticks_per_frame.max(1),
        }
    }

    /// Add `frame_seconds` of wall time and return how many ticks to run now.
    ///
    /// Time beyond the per-frame cap is discarded.
    pub fn accumulate(&mut self, frame_seconds: f32) -> u32 {
        self.accumulator += frame_seconds.max(0.0);
        let mut ticks = 0;
        while self.accumulator >= self.step && ticks < self.max_ticks_per_frame {
            self.accumulator -= self.step;
            ticks += 1;
        }
        if ticks == self.max_ticks_per_frame && self.accumulator >= self.step {
            tracing::debug!(
                dropped_seconds = self.accumulator,
                "fixed timestep fell behind, dropping time"
            );
            self.accumulator = 0.0;
        }
        ticks
    }
}
