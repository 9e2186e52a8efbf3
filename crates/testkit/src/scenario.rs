//! Scripted input for harness runs.

use anyhow::{anyhow, Result};
use arena_core::Action;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::harness::LoopbackHarness;

/// A deterministic session script.
///
/// Every client walks in a slowly turning circle, dashes and attacks on a
/// fixed beat, then lets go of the stick after `input_ticks` so the run can
/// check that everyone settles on the server's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Predicting clients.
    pub clients: usize,
    /// Add one extra client that hosts the server.
    pub with_host: bool,
    /// Total ticks to run.
    pub ticks: u32,
    /// Ticks during which input is applied.
    pub input_ticks: u32,
    /// Distance between spawn points.
    pub spawn_spacing: f32,
    /// Dash every this many ticks; zero disables.
    pub dash_every: u32,
    /// Basic attack every this many ticks; zero disables.
    pub attack_every: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            clients: 2,
            with_host: false,
            ticks: 400,
            input_ticks: 250,
            spawn_spacing: 4.0,
            dash_every: 90,
            attack_every: 0,
        }
    }
}

impl ScenarioConfig {
    /// Verify the script is runnable.
    pub fn verify(&self) -> Result<(), &'static str> {
        if self.clients == 0 && !self.with_host {
            return Err("scenario needs at least one client");
        }
        if self.input_ticks > self.ticks {
            return Err("input_ticks must not exceed ticks");
        }
        if !self.spawn_spacing.is_finite() {
            return Err("spawn_spacing must be finite");
        }
        Ok(())
    }

    /// Spawn every client of the script into `harness`.
    pub fn populate(&self, harness: &mut LoopbackHarness) -> Result<()> {
        self.verify()
            .map_err(|err| anyhow!("Invalid scenario: {err}"))?;
        if self.with_host {
            harness.add_client(Vec3::ZERO, true)?;
        }
        for index in 0..self.clients {
            let x = (index + 1) as f32 * self.spawn_spacing;
            harness.add_client(Vec3::new(x, 0.0, 0.0), false)?;
        }
        Ok(())
    }

    /// Set every client's controls for script step `step` (0-based).
    pub fn drive(&self, harness: &mut LoopbackHarness, step: u32) {
        for index in 0..harness.client_count() {
            if step >= self.input_ticks {
                harness.set_movement(index, Vec2::ZERO);
                continue;
            }
            let angle = step as f32 * 0.02 + index as f32;
            harness.set_movement(index, Vec2::new(angle.cos(), angle.sin()));

            for (every, action) in [
                (self.dash_every, Action::Dash),
                (self.attack_every, Action::BasicAttack),
            ] {
                if every == 0 {
                    continue;
                }
                // Stagger clients so they do not all act on the same tick.
                let phase = (step + index as u32 * 7) % every;
                if phase == every - 1 {
                    harness.press(index, action);
                } else if phase == 0 && step > 0 {
                    harness.release(index, action);
                }
            }
        }
    }

    /// Populate `harness` and run the whole script.
    pub fn run(&self, harness: &mut LoopbackHarness) -> Result<()> {
        self.populate(harness)?;
        for step in 0..self.ticks {
            self.drive(harness, step);
            harness.step()?;
        }
        Ok(())
    }
}
