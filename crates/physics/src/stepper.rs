//! Fixed-step movement and ability rules shared by server and client.

use arena_core::{Action, ConditionState, InputSample, MovementState};
use glam::{Quat, Vec2, Vec3};
use tracing::trace;

use crate::{DashProgress, EntityState, SimContext};

/// Advances one entity by exactly one fixed step.
///
/// Implementations must be deterministic: the same state, input and `dt`
/// always produce the same result. Nothing outside the returned state may
/// change.
pub trait Stepper {
    /// Produce the state one step after `state` under `input`.
    fn step(&self, state: &EntityState, input: &InputSample, dt: f32) -> EntityState;

    /// The ability the server would start from `state` under `input` during
    /// the next step, if any.
    ///
    /// When one would start, `state` takes the step's cooldown bookkeeping so
    /// later readiness checks stay close to the server's.
    fn predict_ability(
        &self,
        _state: &mut EntityState,
        _input: &InputSample,
        _dt: f32,
    ) -> Option<Action> {
        None
    }
}

/// Which side of the network a stepper runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Server: may start dashes and cast locks.
    Authoritative,
    /// Client prediction and replay: never starts server-confirmed abilities.
    Predictive,
}

/// Kinematic top-down mover.
#[derive(Debug, Clone)]
pub struct TopDownStepper {
    ctx: SimContext,
    mode: StepMode,
}

impl TopDownStepper {
    /// Server-side stepper.
    pub fn authoritative(ctx: SimContext) -> Self {
        Self {
            ctx,
            mode: StepMode::Authoritative,
        }
    }

    /// Client-side stepper.
    pub fn predictive(ctx: SimContext) -> Self {
        Self {
            ctx,
            mode: StepMode::Predictive,
        }
    }

    /// Simulation context in use.
    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Mode in use.
    pub fn mode(&self) -> StepMode {
        self.mode
    }

    fn ability_to_start(&self, state: &EntityState, input: &InputSample) -> Option<Action> {
        if state.condition != ConditionState::Normal || !state.movement.is_controllable() {
            return None;
        }
        if input.dash.is_active() && state.dash_cooldown <= 0.0 {
            return Some(Action::Dash);
        }
        if input.basic_attack.is_pressed() {
            return Some(Action::BasicAttack);
        }
        if input.heal.is_pressed() {
            return Some(Action::Heal);
        }
        [Action::Cast1, Action::Cast2, Action::Cast3, Action::Cast4]
            .into_iter()
            .find(|&action| input.key(action).is_pressed())
    }

    fn try_start_ability(&self, state: &mut EntityState, input: &InputSample) {
        if self.mode != StepMode::Authoritative {
            return;
        }
        let lock = match self.ability_to_start(state, input) {
            None => return,
            Some(Action::Dash) => {
                let origin = state.position;
                let destination = origin + state.forward() * self.ctx.dash.distance;
                state.reset_motion();
                state.dash = Some(DashProgress {
                    origin,
                    destination,
                    elapsed: 0.0,
                });
                state.movement = MovementState::Dashing;
                state.dash_cooldown = self.ctx.dash.cooldown;
                trace!(?origin, ?destination, "dash started");
                return;
            }
            Some(Action::BasicAttack) => self.ctx.cast.basic_attack,
            Some(Action::Heal) => self.ctx.cast.heal,
            Some(_) => self.ctx.cast.cast,
        };
        state.reset_motion();
        state.movement = MovementState::Casting;
        state.cast_remaining = lock;
    }

    fn advance_dash(&self, state: &mut EntityState, dt: f32) {
        let duration = self.ctx.dash.duration;
        let Some(dash) = state.dash.as_mut() else {
            return;
        };
        if duration <= 0.0 || dash.elapsed >= duration {
            state.dash = None;
            state.movement = MovementState::Idle;
            return;
        }
        let before = dash.elapsed / duration;
        dash.elapsed += dt;
        let after = (dash.elapsed / duration).min(1.0);
        state.position += (dash.destination - dash.origin) * (after - before);
    }

    fn advance_cast(&self, state: &mut EntityState, dt: f32) {
        if self.mode == StepMode::Predictive && state.cast_remaining <= 0.0 {
            return;
        }
        state.cast_remaining -= dt;
        if state.cast_remaining <= 0.0 {
            state.cast_remaining = 0.0;
            state.movement = MovementState::Idle;
        }
    }

    fn locomote(&self, state: &mut EntityState, stick: Vec2, dt: f32) {
        let cfg = &self.ctx.movement;
        let previous_speed = state.velocity.length();

        if previous_speed > cfg.idle_threshold && state.movement == MovementState::Idle {
            state.movement = MovementState::Running;
        }
        if previous_speed <= cfg.idle_threshold
            && matches!(state.movement, MovementState::Running | MovementState::None)
        {
            state.movement = MovementState::Idle;
        }

        if cfg.acceleration == 0.0 || cfg.deceleration == 0.0 {
            state.lerped_input = stick;
        } else if stick.normalize_or_zero() == Vec2::ZERO {
            state.acceleration = lerp(state.acceleration, 0.0, cfg.deceleration * dt);
            state.lerped_input = state
                .lerped_input
                .lerp(state.lerped_input * state.acceleration, dt * cfg.deceleration);
        } else {
            state.acceleration = lerp(state.acceleration, 1.0, cfg.acceleration * dt);
            state.lerped_input = stick.clamp_length_max(state.acceleration);
        }

        let mut velocity = Vec3::new(state.lerped_input.x, 0.0, state.lerped_input.y)
            * cfg.movement_speed;
        velocity = velocity.clamp_length_max(cfg.movement_speed);
        if stick.length() <= cfg.idle_threshold && previous_speed < cfg.idle_threshold {
            velocity = Vec3::ZERO;
        }

        state.velocity = velocity;
        state.position += velocity * dt;
        self.face_movement(state, dt);
    }

    fn face_movement(&self, state: &mut EntityState, dt: f32) {
        let direction = Vec3::new(state.velocity.x, 0.0, state.velocity.z);
        if direction == Vec3::ZERO {
            return;
        }
        let target = Quat::from_rotation_y(direction.x.atan2(direction.z));
        state.rotation = if self.ctx.movement.instant_rotation {
            target
        } else {
            let t = (dt * self.ctx.movement.rotation_speed).clamp(0.0, 1.0);
            state.rotation.slerp(target, t).normalize()
        };
    }
}

impl Stepper for TopDownStepper {
    fn step(&self, state: &EntityState, input: &InputSample, dt: f32) -> EntityState {
        let mut next = *state;

        match next.condition {
            ConditionState::Dead | ConditionState::Paused => {
                next.velocity = Vec3::ZERO;
                return next;
            }
            ConditionState::Frozen | ConditionState::Stunned => {
                next.velocity = Vec3::ZERO;
                next.lerped_input = Vec2::ZERO;
                next.acceleration = 0.0;
                next.cool_down(dt);
                return next;
            }
            ConditionState::ForcedMovement => {
                next.position += next.velocity * dt;
                next.cool_down(dt);
                return self.clamp(next);
            }
            ConditionState::Normal => {}
        }

        next.cool_down(dt);
        self.try_start_ability(&mut next, input);

        match next.movement {
            MovementState::Dashing => self.advance_dash(&mut next, dt),
            MovementState::Casting => self.advance_cast(&mut next, dt),
            MovementState::None | MovementState::Idle | MovementState::Running => {
                let stick = input.movement.clamp_length_max(1.0);
                self.locomote(&mut next, stick, dt);
            }
        }

        self.clamp(next)
    }

    fn predict_ability(
        &self,
        state: &mut EntityState,
        input: &InputSample,
        dt: f32,
    ) -> Option<Action> {
        let mut next = *state;
        next.cool_down(dt);
        let action = self.ability_to_start(&next, input)?;
        if action == Action::Dash {
            next.dash_cooldown = self.ctx.dash.cooldown;
        }
        *state = next;
        Some(action)
    }
}

impl TopDownStepper {
    fn clamp(&self, mut state: EntityState) -> EntityState {
        if let Some(bounds) = self.ctx.bounds {
            state.position = bounds.clamp_point(state.position);
        }
        state
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t.clamp(0.0, 1.0)
}
