#![warn(missing_docs)]
//! Networking abstractions shared by the client/server.
//!
//! Message shapes and their wire codec, latest-wins inbound queues, the
//! client input sampler, prediction with reconciliation and remote-entity
//! smoothing.

mod channel;
mod codec;
mod error;
mod interpolation;
mod prediction;
mod protocol;
mod ring;
mod sampler;
mod smoothing;

pub use channel::{ChannelType, InboundQueue};
pub use codec::{
    compute_schema_hash, decode_client_message, decode_server_message, encode_client_message,
    encode_server_message, peek_channel,
};
pub use error::SyncError;
pub use interpolation::{RemoteInterpolator, RemoteOutcome};
pub use prediction::{ClientPredictor, PredictionBuffer, PredictionMetrics, ReconcileOutcome};
pub use protocol::{
    ClientMessage, ClientStateSnapshot, InputMessage, ServerMessage, StateMessage,
    MAX_DATAGRAM_LEN, MAX_REDUNDANT_INPUTS, PROTOCOL_VERSION,
};
pub use ring::TickRing;
pub use sampler::InputSampler;
pub use smoothing::VisualErrorOffset;
