#![warn(missing_docs)]
//! Client side of a match: the predicted local entity, smoothed remote
//! entities and the session that routes server messages to them.

pub mod character;
pub mod multiplayer;

pub use character::{LocalCharacter, LocalTick, RemoteCharacter};
pub use multiplayer::ClientSession;
