#![warn(missing_docs)]
//! Authoritative simulation host.
//!
//! The server owns the ground truth: it steps each entity from the inputs
//! its client sends, catching up over gaps with the redundant input window,
//! and broadcasts the resulting states.

pub mod character;
pub mod multiplayer;

pub use character::{ServerCharacter, TickReport};
pub use multiplayer::ServerSession;
