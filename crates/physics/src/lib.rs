#![warn(missing_docs)]
//! Simulation stepping for arena entities.
//!
//! The netcode only relies on the [`Stepper`] contract: given a state, one
//! input sample and a delta time, produce the next state with no side
//! effects. [`TopDownStepper`] is the kinematic mover used by the game and
//! by the tests.

mod bounds;
mod context;
mod entity;
mod stepper;

pub use bounds::Aabb;
pub use context::{CastConfig, DashConfig, MovementConfig, SimContext};
pub use entity::{DashProgress, EntityState};
pub use stepper::{StepMode, Stepper, TopDownStepper};
