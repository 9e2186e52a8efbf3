//! Client input sampling with a redundant history window.

use std::collections::VecDeque;

use arena_core::{Action, InputSample, KeyState, RedundancyPolicy, SimTick};
use glam::Vec2;

use crate::protocol::InputMessage;

/// Captures one [`InputSample`] per tick from raw control events.
///
/// Per tick: [`InputSampler::sample`], then [`InputSampler::message`], then
/// [`InputSampler::step_keys`] once the message has been handed off.
#[derive(Debug, Clone)]
pub struct InputSampler {
    policy: RedundancyPolicy,
    cap: usize,
    controls: InputSample,
    latched_release: [bool; Action::ALL.len()],
    recent: VecDeque<InputSample>,
    last_acked: SimTick,
}

impl InputSampler {
    /// Sampler keeping at most `cap` samples according to `policy`.
    pub fn new(policy: RedundancyPolicy, cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            policy,
            cap,
            controls: InputSample::idle(),
            latched_release: [false; Action::ALL.len()],
            recent: VecDeque::with_capacity(cap),
            last_acked: SimTick::ZERO,
        }
    }

    /// Set the stick, clamped to unit length.
    pub fn set_movement(&mut self, movement: Vec2) {
        self.controls.movement = if movement.is_finite() {
            movement.clamp_length_max(1.0)
        } else {
            Vec2::ZERO
        };
    }

    /// A button went down.
    pub fn press(&mut self, action: Action) {
        let key = self.controls.key_mut(action);
        if matches!(*key, KeyState::Off | KeyState::Release) {
            *key = KeyState::Press;
        }
        self.latched_release[action_index(action)] = false;
    }

    /// A button went up.
    pub fn release(&mut self, action: Action) {
        let key = self.controls.key_mut(action);
        match *key {
            KeyState::Held => *key = KeyState::Release,
            // Pressed and released inside one tick: deliver the release next tick.
            KeyState::Press => self.latched_release[action_index(action)] = true,
            KeyState::Release | KeyState::Off => {}
        }
    }

    /// Read the controls for `tick` and add them to the redundant window.
    pub fn sample(&mut self, tick: SimTick) -> InputSample {
        let sample = self.controls;
        self.recent.push_back(sample);
        let keep = self.policy.window_len(tick, self.last_acked, self.cap);
        while self.recent.len() > keep {
            self.recent.pop_front();
        }
        sample
    }

    /// Message carrying the current window, newest sample last.
    pub fn message(&self, tick: SimTick, delta_time: f32) -> InputMessage {
        InputMessage {
            tick,
            delta_time,
            samples: self.recent.iter().copied().collect(),
        }
    }

    /// Advance edge-triggered buttons after the tick's message was sent.
    pub fn step_keys(&mut self) {
        for (index, action) in Action::ALL.into_iter().enumerate() {
            let key = self.controls.key_mut(action);
            if self.latched_release[index] && *key == KeyState::Press {
                *key = KeyState::Release;
                self.latched_release[index] = false;
            } else {
                *key = key.step();
            }
        }
    }

    /// The peer confirmed state up to `tick`.
    pub fn acknowledge(&mut self, tick: SimTick) {
        self.last_acked = self.last_acked.max(tick);
    }

    /// Last acknowledged tick.
    pub fn last_acked(&self) -> SimTick {
        self.last_acked
    }

    /// Samples currently in the redundant window, oldest first.
    pub fn recent(&self) -> impl ExactSizeIterator<Item = &InputSample> {
        self.recent.iter()
    }

    /// Current raw control state.
    pub fn controls(&self) -> &InputSample {
        &self.controls
    }
}

fn action_index(action: Action) -> usize {
    Action::ALL
        .iter()
        .position(|&candidate| candidate == action)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tick_once(sampler: &mut InputSampler, tick: u32) -> InputSample {
        let sample = sampler.sample(SimTick(tick));
        sampler.step_keys();
        sample
    }

    #[test]
    fn test_press_is_seen_once() {
        let mut sampler = InputSampler::new(RedundancyPolicy::AckWindow, 16);
        sampler.press(Action::Dash);
        assert_eq!(tick_once(&mut sampler, 1).dash, KeyState::Press);
        assert_eq!(tick_once(&mut sampler, 2).dash, KeyState::Held);
        sampler.release(Action::Dash);
        assert_eq!(tick_once(&mut sampler, 3).dash, KeyState::Release);
        assert_eq!(tick_once(&mut sampler, 4).dash, KeyState::Off);
    }

    #[test]
    fn test_press_and_release_within_one_tick() {
        let mut sampler = InputSampler::new(RedundancyPolicy::AckWindow, 16);
        sampler.press(Action::Cast2);
        sampler.release(Action::Cast2);
        assert_eq!(tick_once(&mut sampler, 1).casts[1], KeyState::Press);
        assert_eq!(tick_once(&mut sampler, 2).casts[1], KeyState::Release);
        assert_eq!(tick_once(&mut sampler, 3).casts[1], KeyState::Off);
    }

    #[test]
    fn test_movement_clamped() {
        let mut sampler = InputSampler::new(RedundancyPolicy::FixedCap, 16);
        sampler.set_movement(Vec2::new(3.0, 4.0));
        assert!((sampler.controls().movement.length() - 1.0).abs() < 1e-6);
        sampler.set_movement(Vec2::new(f32::NAN, 0.0));
        assert_eq!(sampler.controls().movement, Vec2::ZERO);
    }

    #[test]
    fn test_message_newest_last() {
        let mut sampler = InputSampler::new(RedundancyPolicy::FixedCap, 4);
        for tick in 1..=6 {
            sampler.set_movement(Vec2::new(tick as f32 / 10.0, 0.0));
            tick_once(&mut sampler, tick);
        }
        let msg = sampler.message(SimTick(6), 0.02);
        assert_eq!(msg.samples.len(), 4);
        assert_eq!(msg.newest().map(|s| s.movement.x), Some(0.6));
        assert_eq!(msg.samples[0].movement.x, 0.3);
    }

    #[test]
    fn test_fixed_cap_fills_to_cap() {
        let mut sampler = InputSampler::new(RedundancyPolicy::FixedCap, 16);
        for tick in 1..=40 {
            tick_once(&mut sampler, tick);
            sampler.acknowledge(SimTick(tick));
            assert_eq!(sampler.recent().len(), (tick as usize).min(16));
        }
    }

    proptest! {
        #[test]
        fn ack_window_length_is_clamped(acks in proptest::collection::vec(0u32..6, 1..200)) {
            let mut sampler = InputSampler::new(RedundancyPolicy::AckWindow, 16);
            for (i, lag) in acks.into_iter().enumerate() {
                let tick = SimTick(i as u32 + 1);
                sampler.acknowledge(SimTick(tick.0.saturating_sub(lag)));
                tick_once(&mut sampler, tick.0);
                let expected = (tick.since(sampler.last_acked()) as usize).clamp(1, 16);
                prop_assert_eq!(sampler.recent().len(), expected);
            }
        }
    }
}
