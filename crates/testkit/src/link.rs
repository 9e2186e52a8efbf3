//! Simulated network link with latency, jitter and loss.
//!
//! Time is measured in harness ticks. Unreliable sends may be dropped or
//! reordered by jitter; reliable sends are never dropped and arrive in the
//! order they were sent.

use arena_core::SimTick;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Link conditions, one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Base one-way delay in ticks.
    pub latency_ticks: u32,
    /// Extra random delay in `0..=jitter_ticks`, unreliable traffic only.
    pub jitter_ticks: u32,
    /// Probability in `[0, 1]` that an unreliable datagram is lost.
    pub loss: f64,
    /// RNG seed; the same seed replays the same drops and delays.
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            latency_ticks: 3,
            jitter_ticks: 1,
            loss: 0.05,
            seed: 0x4152_454E_41,
        }
    }
}

impl LinkConfig {
    /// Zero delay, zero loss (a host talking to its own server).
    pub fn perfect() -> Self {
        Self {
            latency_ticks: 0,
            jitter_ticks: 0,
            loss: 0.0,
            seed: 0,
        }
    }

    /// Same conditions with another seed.
    pub fn with_seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    /// Verify parameters are usable.
    pub fn verify(&self) -> Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.loss) {
            return Err("loss must be within [0, 1]");
        }
        if self.latency_ticks > 1000 || self.jitter_ticks > 1000 {
            return Err("latency and jitter must be at most 1000 ticks");
        }
        Ok(())
    }
}

/// Delivery counters of one link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Payloads handed to the link.
    pub sent: u64,
    /// Unreliable payloads lost.
    pub dropped: u64,
    /// Payloads delivered.
    pub delivered: u64,
    /// Bytes handed to the link.
    pub bytes_sent: u64,
}

#[derive(Debug)]
struct InFlight {
    deliver_at: SimTick,
    seq: u64,
    payload: Vec<u8>,
}

/// One direction of a simulated connection carrying framed datagrams.
#[derive(Debug)]
pub struct LossyLink {
    config: LinkConfig,
    rng: StdRng,
    in_flight: Vec<InFlight>,
    next_seq: u64,
    last_reliable: SimTick,
    stats: LinkStats,
}

impl LossyLink {
    /// Link with the given conditions; `salt` separates links sharing a seed.
    pub fn new(config: LinkConfig, salt: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            config,
            in_flight: Vec::new(),
            next_seq: 0,
            last_reliable: SimTick::ZERO,
            stats: LinkStats::default(),
        }
    }

    /// Send a datagram that may be lost, delayed or reordered.
    pub fn send_unreliable(&mut self, now: SimTick, payload: Vec<u8>) {
        self.stats.sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        if self.config.loss > 0.0 && self.rng.gen_bool(self.config.loss) {
            self.stats.dropped += 1;
            return;
        }
        let jitter = if self.config.jitter_ticks > 0 {
            self.rng.gen_range(0..=self.config.jitter_ticks)
        } else {
            0
        };
        let deliver_at = now.advance(self.config.latency_ticks + jitter);
        self.enqueue(deliver_at, payload);
    }

    /// Send a message that always arrives, after everything reliable sent earlier.
    pub fn send_reliable(&mut self, now: SimTick, payload: Vec<u8>) {
        self.stats.sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        let deliver_at = now.advance(self.config.latency_ticks).max(self.last_reliable);
        self.last_reliable = deliver_at;
        self.enqueue(deliver_at, payload);
    }

    fn enqueue(&mut self, deliver_at: SimTick, payload: Vec<u8>) {
        self.in_flight.push(InFlight {
            deliver_at,
            seq: self.next_seq,
            payload,
        });
        self.next_seq += 1;
    }

    /// Take every payload due at or before `now`, in arrival order.
    pub fn deliver(&mut self, now: SimTick) -> Vec<Vec<u8>> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|packet| packet.deliver_at <= now);
        self.in_flight = pending;
        due.sort_by_key(|packet| (packet.deliver_at, packet.seq));
        self.stats.delivered += due.len() as u64;
        due.into_iter().map(|packet| packet.payload).collect()
    }

    /// Payloads still travelling.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Delivery counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Conditions of this link.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}
