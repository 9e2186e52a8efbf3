//! Client-side prediction and server reconciliation.
//!
//! The locally controlled entity is simulated ahead of the server with the
//! same [`Stepper`] the server uses. Every predicted tick is kept in a ring
//! buffer together with its input; when an authoritative state disagrees
//! with what was predicted for that tick, the simulation is reset to the
//! server's values and the buffered inputs are replayed up to the present.

use arena_core::{ConditionState, InputSample, NetConfig, SimTick};
use arena_physics::{EntityState, Stepper};
use glam::{Quat, Vec3};
use tracing::{debug, warn};

use crate::protocol::{ClientStateSnapshot, StateMessage};
use crate::ring::TickRing;
use crate::smoothing::VisualErrorOffset;
use crate::SyncError;

/// Inputs and predicted states of one entity, one slot per tick.
#[derive(Debug, Clone)]
pub struct PredictionBuffer {
    inputs: TickRing<InputSample>,
    states: TickRing<EntityState>,
}

impl PredictionBuffer {
    /// Buffer with `capacity` ticks of history.
    pub fn new(capacity: usize) -> Self {
        Self {
            inputs: TickRing::new(capacity),
            states: TickRing::new(capacity),
        }
    }

    /// Record the input sampled for `tick`.
    pub fn record_input(&mut self, tick: SimTick, input: InputSample) {
        self.inputs.insert(tick, input);
    }

    /// Record the state predicted for `tick`.
    pub fn record_state(&mut self, tick: SimTick, state: EntityState) {
        self.states.insert(tick, state);
    }

    /// Input sampled for `tick`.
    pub fn input(&self, tick: SimTick) -> Result<&InputSample, SyncError> {
        self.inputs.lookup(tick)
    }

    /// State predicted for `tick`.
    pub fn state(&self, tick: SimTick) -> Result<&EntityState, SyncError> {
        self.states.lookup(tick)
    }

    /// Number of ticks retained.
    pub fn capacity(&self) -> usize {
        self.states.capacity()
    }
}

/// Metrics for tracking prediction accuracy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionMetrics {
    /// Total number of predicted ticks.
    pub total_predictions: u64,
    /// State messages that matched the prediction.
    pub confirmations: u64,
    /// State messages that disagreed with the prediction.
    pub mismatches: u64,
    /// Rewind-and-replay passes performed.
    pub corrections: u64,
    /// Corrections whose visual jump was too large to smooth.
    pub hard_snaps: u64,
    /// Ticks re-simulated during corrections.
    pub replayed_ticks: u64,
    /// Ticks skipped during replay because their input was gone.
    pub skipped_ticks: u64,
    /// Stale or future state messages ignored.
    pub rejected_messages: u64,
    /// Average position error of mismatches.
    pub avg_error_distance: f32,
    /// Maximum position error of mismatches.
    pub max_error_distance: f32,
}

impl PredictionMetrics {
    fn record_mismatch(&mut self, error_distance: f32) {
        self.mismatches += 1;
        self.avg_error_distance = (self.avg_error_distance * (self.mismatches - 1) as f32
            + error_distance)
            / self.mismatches as f32;
        self.max_error_distance = self.max_error_distance.max(error_distance);
    }
}

/// Result of reconciliation with server state.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Message was stale or ahead of the local tick and was not used.
    Rejected(SyncError),
    /// Prediction matched; nothing changed.
    Confirmed {
        /// Confirmed tick.
        tick: SimTick,
    },
    /// Mismatch detected but corrections are disabled.
    Detected {
        /// Tick of the mismatch.
        tick: SimTick,
        /// Squared position error (infinite when the slot was gone).
        position_error_sq: f32,
    },
    /// Simulation was reset and replayed.
    Corrected {
        /// Tick the simulation was reset to.
        tick: SimTick,
        /// Squared position error (infinite when the slot was gone).
        position_error_sq: f32,
        /// Ticks re-simulated.
        replayed: u32,
        /// Ticks skipped because their input slot was stale.
        skipped: u32,
        /// The visual offset was discarded.
        snapped: bool,
    },
}

/// Client-side predictor with rollback and replay.
pub struct ClientPredictor<S> {
    stepper: S,
    config: NetConfig,
    buffer: PredictionBuffer,
    state: EntityState,
    offset: VisualErrorOffset,
    last_reconciled: SimTick,
    hold_until: Option<SimTick>,
    metrics: PredictionMetrics,
}

impl<S: Stepper> ClientPredictor<S> {
    /// Predictor starting from `initial`.
    pub fn new(stepper: S, config: NetConfig, initial: EntityState) -> Self {
        Self {
            stepper,
            buffer: PredictionBuffer::new(config.buffer_size),
            config,
            state: initial,
            offset: VisualErrorOffset::ZERO,
            last_reconciled: SimTick::ZERO,
            hold_until: None,
            metrics: PredictionMetrics::default(),
        }
    }

    /// Simulate `tick` with `input` and buffer both.
    ///
    /// An ability the server would start freezes the prediction until the
    /// server has answered for that tick; the held state is still buffered.
    /// Abilities that are not ready do not hold.
    pub fn predict(&mut self, tick: SimTick, input: InputSample) -> &EntityState {
        let dt = self.config.fixed_delta();
        self.buffer.record_input(tick, input);
        if self.hold_until.is_some() {
            self.state.cool_down(dt);
        } else if let Some(action) = self.stepper.predict_ability(&mut self.state, &input, dt) {
            debug!(%tick, ?action, "prediction held for ability");
            self.hold_until = Some(tick);
        } else {
            self.state = self.stepper.step(&self.state, &input, dt);
        }
        self.buffer.record_state(tick, self.state);
        self.metrics.total_predictions += 1;
        &self.state
    }

    /// Compare an authoritative state against the prediction for its tick
    /// and correct the simulation if they disagree.
    ///
    /// `current` is the newest tick already predicted.
    pub fn reconcile(&mut self, msg: &StateMessage, current: SimTick) -> ReconcileOutcome {
        if msg.tick <= self.last_reconciled {
            return self.reject(SyncError::StaleMessage {
                tick: msg.tick,
                last: self.last_reconciled,
            });
        }
        if msg.tick > current {
            return self.reject(SyncError::FutureTick {
                tick: msg.tick,
                current,
            });
        }
        self.last_reconciled = msg.tick;
        if self.hold_until.is_some_and(|hold| msg.tick >= hold) {
            self.hold_until = None;
        }

        let server = msg.snapshot();
        let (diverged, position_error_sq) = match self.buffer.state(msg.tick) {
            Ok(predicted) => {
                let predicted = ClientStateSnapshot::from(predicted);
                (
                    !predicted.matches(
                        &server,
                        self.config.position_epsilon_sq,
                        self.config.rotation_epsilon,
                    ),
                    predicted.position_error_sq(&server),
                )
            }
            Err(err) => {
                warn!(%err, "no prediction to compare against");
                (true, f32::INFINITY)
            }
        };

        if !diverged && !self.config.force_reconcile {
            self.metrics.confirmations += 1;
            return ReconcileOutcome::Confirmed { tick: msg.tick };
        }
        if diverged {
            let distance = position_error_sq.sqrt();
            if distance.is_finite() {
                self.metrics.record_mismatch(distance);
            } else {
                self.metrics.mismatches += 1;
            }
        }
        if !self.config.correction_enabled {
            debug!(tick = msg.tick.0, position_error_sq, "misprediction left uncorrected");
            return ReconcileOutcome::Detected {
                tick: msg.tick,
                position_error_sq,
            };
        }

        let previous = self.offset.apply(self.state.position, self.state.rotation);
        let (replayed, skipped) = self.rewind_and_replay(msg, current);
        let (offset, snapped) = VisualErrorOffset::between(
            previous,
            (self.state.position, self.state.rotation),
            self.config.snap_distance_sq,
        );
        self.offset = offset;

        self.metrics.corrections += 1;
        self.metrics.replayed_ticks += u64::from(replayed);
        self.metrics.skipped_ticks += u64::from(skipped);
        if snapped {
            self.metrics.hard_snaps += 1;
        }
        debug!(
            tick = msg.tick.0,
            current = current.0,
            replayed,
            skipped,
            snapped,
            "reconciled"
        );

        ReconcileOutcome::Corrected {
            tick: msg.tick,
            position_error_sq,
            replayed,
            skipped,
            snapped,
        }
    }

    fn rewind_and_replay(&mut self, msg: &StateMessage, current: SimTick) -> (u32, u32) {
        let mut state = match self.buffer.state(msg.tick) {
            Ok(predicted) => *predicted,
            Err(_) => self.state,
        };
        state.position = msg.position;
        state.rotation = msg.rotation;
        state.movement = msg.movement_state;
        state.condition = msg.condition_state;
        self.buffer.record_state(msg.tick, state);

        // The server's state axes are assumed to hold over the whole window.
        let free = msg.condition_state == ConditionState::Normal
            && msg.movement_state.is_controllable();
        let dt = self.config.fixed_delta();

        let (mut replayed, mut skipped) = (0u32, 0u32);
        let mut tick = msg.tick.next();
        while tick <= current {
            match self.buffer.input(tick) {
                Ok(input) => {
                    if free {
                        state = self.stepper.step(&state, input, dt);
                    }
                    replayed += 1;
                }
                Err(err) => {
                    warn!(%err, "skipping tick during replay");
                    skipped += 1;
                }
            }
            self.buffer.record_state(tick, state);
            tick = tick.next();
        }

        self.state = state;
        (replayed, skipped)
    }

    fn reject(&mut self, err: SyncError) -> ReconcileOutcome {
        match err {
            SyncError::FutureTick { .. } => warn!(%err, "state message ignored"),
            _ => debug!(%err, "state message ignored"),
        }
        self.metrics.rejected_messages += 1;
        ReconcileOutcome::Rejected(err)
    }

    /// Per-tick offset decay.
    pub fn smooth(&mut self) {
        self.offset
            .decay(self.config.position_decay, self.config.rotation_slerp);
    }

    /// Transform to draw this tick.
    pub fn rendered(&self) -> (Vec3, Quat) {
        if self.config.smoothing_enabled {
            self.offset.apply(self.state.position, self.state.rotation)
        } else {
            (self.state.position, self.state.rotation)
        }
    }

    /// Current simulated state.
    pub fn state(&self) -> &EntityState {
        &self.state
    }

    /// Current visual offset.
    pub fn offset(&self) -> &VisualErrorOffset {
        &self.offset
    }

    /// Prediction history.
    pub fn buffer(&self) -> &PredictionBuffer {
        &self.buffer
    }

    /// Newest tick reconciled against the server.
    pub fn last_reconciled(&self) -> SimTick {
        self.last_reconciled
    }

    /// Whether an ability press is holding the prediction still.
    pub fn is_holding(&self) -> bool {
        self.hold_until.is_some()
    }

    /// Get current prediction metrics.
    pub fn metrics(&self) -> &PredictionMetrics {
        &self.metrics
    }

    /// Tuning in use.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{KeyState, MovementState};
    use arena_physics::{SimContext, TopDownStepper};
    use glam::Vec2;

    fn predictor(config: NetConfig) -> ClientPredictor<TopDownStepper> {
        ClientPredictor::new(
            TopDownStepper::predictive(SimContext::default()),
            config,
            EntityState::default(),
        )
    }

    fn run(predictor: &mut ClientPredictor<TopDownStepper>, ticks: std::ops::RangeInclusive<u32>) {
        for tick in ticks {
            predictor.predict(SimTick(tick), InputSample::moving(Vec2::X));
        }
    }

    fn echo(predictor: &ClientPredictor<TopDownStepper>, tick: u32) -> StateMessage {
        let state = predictor.buffer().state(SimTick(tick)).expect("predicted tick");
        StateMessage::from_state(SimTick(tick), 0.02, state)
    }

    #[test]
    fn test_matching_state_is_noop() {
        let mut predictor = predictor(NetConfig::default());
        run(&mut predictor, 1..=10);
        let before = *predictor.state();

        let outcome = predictor.reconcile(&echo(&predictor, 6), SimTick(10));
        assert_eq!(outcome, ReconcileOutcome::Confirmed { tick: SimTick(6) });
        assert_eq!(*predictor.state(), before);
        assert_eq!(*predictor.offset(), VisualErrorOffset::ZERO);
        assert_eq!(predictor.metrics().replayed_ticks, 0);
    }

    #[test]
    fn test_mismatch_rewinds_and_replays() {
        let mut predictor = predictor(NetConfig::default());
        run(&mut predictor, 1..=10);
        let before = *predictor.state();

        let mut msg = echo(&predictor, 6);
        msg.position.z += 0.5;
        let outcome = predictor.reconcile(&msg, SimTick(10));

        match outcome {
            ReconcileOutcome::Corrected {
                tick,
                replayed,
                skipped,
                snapped,
                ..
            } => {
                assert_eq!(tick, SimTick(6));
                assert_eq!(replayed, 4);
                assert_eq!(skipped, 0);
                assert!(!snapped);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // Same inputs from a shifted start end up shifted by the same amount.
        assert!((predictor.state().position - (before.position + Vec3::new(0.0, 0.0, 0.5))).length() < 1e-4);
        assert_eq!(predictor.buffer().state(SimTick(6)).unwrap().position, msg.position);
        // The model keeps rendering where it was.
        assert!((predictor.rendered().0 - before.position).length() < 1e-4);
        assert_eq!(predictor.metrics().corrections, 1);
    }

    #[test]
    fn test_far_mismatch_hard_snaps() {
        let mut predictor = predictor(NetConfig::default());
        run(&mut predictor, 1..=5);
        let mut msg = echo(&predictor, 5);
        msg.position.x += 4.0;
        let outcome = predictor.reconcile(&msg, SimTick(5));
        assert!(matches!(outcome, ReconcileOutcome::Corrected { snapped: true, replayed: 0, .. }));
        assert_eq!(*predictor.offset(), VisualErrorOffset::ZERO);
        assert_eq!(predictor.rendered().0, msg.position);
    }

    #[test]
    fn test_state_mismatch_alone_triggers_correction() {
        let mut predictor = predictor(NetConfig::default());
        run(&mut predictor, 1..=4);
        let mut msg = echo(&predictor, 3);
        msg.movement_state = MovementState::Casting;
        let outcome = predictor.reconcile(&msg, SimTick(4));
        assert!(matches!(outcome, ReconcileOutcome::Corrected { replayed: 1, .. }));
        // Casting holds the entity still over the replayed window.
        assert_eq!(predictor.state().position, msg.position);
        assert_eq!(predictor.state().movement, MovementState::Casting);
    }

    #[test]
    fn test_stale_and_future_messages_rejected() {
        let mut predictor = predictor(NetConfig::default());
        run(&mut predictor, 1..=8);
        predictor.reconcile(&echo(&predictor, 6), SimTick(8));

        let stale = predictor.reconcile(&echo(&predictor, 4), SimTick(8));
        assert!(matches!(stale, ReconcileOutcome::Rejected(SyncError::StaleMessage { .. })));

        let mut future = echo(&predictor, 8);
        future.tick = SimTick(9);
        let outcome = predictor.reconcile(&future, SimTick(8));
        assert!(matches!(outcome, ReconcileOutcome::Rejected(SyncError::FutureTick { .. })));
        assert_eq!(predictor.last_reconciled(), SimTick(6));
        assert_eq!(predictor.metrics().rejected_messages, 2);
    }

    #[test]
    fn test_overwritten_slot_counts_as_mismatch() {
        let config = NetConfig {
            buffer_size: 4,
            ..NetConfig::default()
        };
        let mut predictor = predictor(config);
        run(&mut predictor, 1..=10);
        let msg = StateMessage::from_state(SimTick(2), 0.02, &EntityState::default());
        let outcome = predictor.reconcile(&msg, SimTick(10));
        match outcome {
            ReconcileOutcome::Corrected {
                position_error_sq,
                replayed,
                skipped,
                ..
            } => {
                assert!(position_error_sq.is_infinite());
                // Ticks 3..=6 were overwritten by 7..=10.
                assert_eq!(skipped, 4);
                assert_eq!(replayed, 4);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(predictor.metrics().skipped_ticks, 4);
    }

    #[test]
    fn test_correction_disabled_only_detects() {
        let config = NetConfig {
            correction_enabled: false,
            ..NetConfig::default()
        };
        let mut predictor = predictor(config);
        run(&mut predictor, 1..=5);
        let before = *predictor.state();
        let mut msg = echo(&predictor, 3);
        msg.position.x -= 1.0;
        let outcome = predictor.reconcile(&msg, SimTick(5));
        assert!(matches!(outcome, ReconcileOutcome::Detected { .. }));
        assert_eq!(*predictor.state(), before);
        assert_eq!(predictor.metrics().mismatches, 1);
        assert_eq!(predictor.metrics().corrections, 0);
    }

    #[test]
    fn test_force_reconcile_replays_matching_state() {
        let config = NetConfig {
            force_reconcile: true,
            ..NetConfig::default()
        };
        let mut predictor = predictor(config);
        run(&mut predictor, 1..=5);
        let before = *predictor.state();
        let outcome = predictor.reconcile(&echo(&predictor, 2), SimTick(5));
        assert!(matches!(outcome, ReconcileOutcome::Corrected { replayed: 3, .. }));
        assert_eq!(*predictor.state(), before);
        assert_eq!(predictor.metrics().mismatches, 0);
    }

    #[test]
    fn test_ability_press_holds_prediction() {
        let mut predictor = predictor(NetConfig::default());
        run(&mut predictor, 1..=3);
        let held_at = predictor.state().position;

        let mut attack = InputSample::moving(Vec2::X);
        attack.basic_attack = KeyState::Press;
        predictor.predict(SimTick(4), attack);
        run(&mut predictor, 5..=6);
        assert!(predictor.is_holding());
        assert_eq!(predictor.state().position, held_at);
        assert!(predictor.buffer().state(SimTick(6)).is_ok());

        predictor.reconcile(&echo(&predictor, 4), SimTick(6));
        assert!(!predictor.is_holding());
        run(&mut predictor, 7..=7);
        assert_ne!(predictor.state().position, held_at);
    }

    #[test]
    fn test_dash_on_cooldown_keeps_predicting() {
        let mut predictor = predictor(NetConfig::default());
        run(&mut predictor, 1..=3);
        let mut dash = InputSample::moving(Vec2::X);
        dash.dash = KeyState::Press;

        predictor.predict(SimTick(4), dash);
        assert!(predictor.is_holding());
        assert_eq!(predictor.state().dash_cooldown, SimContext::default().dash.cooldown);
        predictor.reconcile(&echo(&predictor, 4), SimTick(4));
        assert!(!predictor.is_holding());

        let before = predictor.state().position;
        predictor.predict(SimTick(5), dash);
        assert!(!predictor.is_holding());
        assert_ne!(predictor.state().position, before);
    }
}
