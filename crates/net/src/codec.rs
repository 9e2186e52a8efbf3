//! Message encoding and decoding with framing.
//!
//! Frame format: `[length: u32][channel: u8][payload: postcard bytes]`,
//! where `length` counts the channel byte and the payload.

use crate::protocol::{ClientMessage, ServerMessage, MAX_DATAGRAM_LEN, PROTOCOL_VERSION};
use crate::{ChannelType, SyncError};
use anyhow::{bail, Context, Result};

/// Compute schema hash from protocol definitions.
///
/// Peers built from different protocol revisions disagree on this value.
pub fn compute_schema_hash() -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&PROTOCOL_VERSION.to_le_bytes());
    for name in [
        "ClientMessage",
        "ServerMessage",
        "InputMessage",
        "StateMessage",
        "InputSample",
    ] {
        hasher.update(name.as_bytes());
    }
    let hash = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

/// Encode a client message with length prefix.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(msg).context("Failed to serialize client message")?;
    frame(msg.channel(), &payload)
}

/// Encode a server message with length prefix.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(msg).context("Failed to serialize server message")?;
    frame(msg.channel(), &payload)
}

/// Decode and verify a client message from frame data.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage> {
    let (channel, payload) = unframe(data)?;
    let msg: ClientMessage =
        postcard::from_bytes(payload).context("Failed to deserialize client message")?;
    if msg.channel() != channel {
        bail!("Client message arrived on {:?}", channel);
    }
    msg.verify()
        .map_err(SyncError::Limit)
        .context("Client message rejected")?;
    Ok(msg)
}

/// Decode and verify a server message from frame data.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage> {
    let (channel, payload) = unframe(data)?;
    let msg: ServerMessage =
        postcard::from_bytes(payload).context("Failed to deserialize server message")?;
    if msg.channel() != channel {
        bail!("Server message arrived on {:?}", channel);
    }
    msg.verify()
        .map_err(SyncError::Limit)
        .context("Server message rejected")?;
    Ok(msg)
}

/// Channel a frame is tagged with, without decoding the payload.
pub fn peek_channel(data: &[u8]) -> Result<ChannelType> {
    unframe(data).map(|(channel, _)| channel)
}

fn frame(channel: ChannelType, payload: &[u8]) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(4 + 1 + payload.len());

    // Length (excluding length field itself)
    let length = u32::try_from(1 + payload.len()).context("Payload too large to frame")?;
    frame.extend_from_slice(&length.to_le_bytes());
    frame.push(channel as u8);
    frame.extend_from_slice(payload);

    if channel.is_unreliable() && frame.len() > MAX_DATAGRAM_LEN {
        bail!(
            "Frame of {} bytes exceeds datagram limit of {} on {:?}",
            frame.len(),
            MAX_DATAGRAM_LEN,
            channel
        );
    }
    Ok(frame)
}

fn unframe(data: &[u8]) -> Result<(ChannelType, &[u8])> {
    if data.len() < 5 {
        bail!("Frame too short: {} bytes (minimum 5)", data.len());
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if length == 0 || data.len() - 4 < length {
        bail!(
            "Incomplete frame: expected {} bytes, got {}",
            length.saturating_add(4),
            data.len()
        );
    }

    let channel = ChannelType::try_from(data[4])?;
    Ok((channel, &data[5..4 + length]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InputMessage, StateMessage, MAX_REDUNDANT_INPUTS};
    use arena_core::{InputSample, KeyState, SimTick};
    use arena_physics::EntityState;
    use glam::{Quat, Vec2, Vec3};

    fn full_input() -> ClientMessage {
        let mut sample = InputSample::moving(Vec2::new(-1.0, 1.0));
        sample.dash = KeyState::Release;
        sample.casts = [KeyState::Held; 4];
        ClientMessage::Input(InputMessage {
            tick: SimTick(u32::MAX),
            delta_time: 0.02,
            samples: vec![sample; MAX_REDUNDANT_INPUTS],
        })
    }

    #[test]
    fn test_schema_hash_deterministic() {
        assert_eq!(compute_schema_hash(), compute_schema_hash());
        assert_ne!(compute_schema_hash(), 0);
    }

    #[test]
    fn test_encode_decode_input() {
        let msg = full_input();
        let encoded = encode_client_message(&msg).expect("Failed to encode");
        assert_eq!(encoded[4], ChannelType::Input as u8);
        let decoded = decode_client_message(&encoded).expect("Failed to decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_full_input_fits_datagram() {
        let encoded = encode_client_message(&full_input()).expect("Failed to encode");
        assert!(encoded.len() <= MAX_DATAGRAM_LEN, "{} bytes", encoded.len());
    }

    #[test]
    fn test_encode_decode_state() {
        let state = EntityState::spawned(Vec3::new(3.0, 0.0, -4.0), Quat::from_rotation_y(1.0));
        let msg = ServerMessage::State {
            entity_id: 9,
            state: StateMessage::from_state(SimTick(104), 0.02, &state),
        };
        let encoded = encode_server_message(&msg).expect("Failed to encode");
        assert_eq!(peek_channel(&encoded).unwrap(), ChannelType::State);
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_rejects_mismatched_channel() {
        let mut encoded = encode_server_message(&ServerMessage::Despawn { entity_id: 1 }).unwrap();
        encoded[4] = ChannelType::State as u8;
        assert!(decode_server_message(&encoded).is_err());
    }

    #[test]
    fn test_rejects_invalid_limits() {
        let msg = ClientMessage::Input(InputMessage {
            tick: SimTick(1),
            delta_time: 0.02,
            samples: vec![],
        });
        let encoded = encode_client_message(&msg).unwrap();
        let err = decode_client_message(&encoded).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SyncError>(),
            Some(&SyncError::Limit("Input message without samples"))
        );
    }

    #[test]
    fn test_decode_incomplete_frame() {
        let data = vec![10, 0, 0, 0, 0];
        assert!(decode_client_message(&data).is_err());
    }

    #[test]
    fn test_decode_too_short() {
        assert!(decode_client_message(&[1, 2, 3]).is_err());
    }
}
