//! Fuzz-style property tests for network codec
//!
//! These tests validate that message decoders handle arbitrary
//! network input gracefully without crashing.

use arena_core::{InputSample, KeyState, SimTick};
use arena_net::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ClientMessage, InputMessage, ServerMessage, StateMessage, MAX_DATAGRAM_LEN,
    MAX_REDUNDANT_INPUTS,
};
use arena_physics::EntityState;
use glam::{Quat, Vec2, Vec3};
use proptest::prelude::*;

fn key_state() -> impl Strategy<Value = KeyState> {
    prop_oneof![
        Just(KeyState::Off),
        Just(KeyState::Press),
        Just(KeyState::Held),
        Just(KeyState::Release),
    ]
}

fn input_sample() -> impl Strategy<Value = InputSample> {
    (
        -1.0f32..=1.0,
        -1.0f32..=1.0,
        key_state(),
        key_state(),
        key_state(),
        prop::array::uniform4(key_state()),
    )
        .prop_map(|(x, y, dash, heal, basic_attack, casts)| InputSample {
            movement: Vec2::new(x, y),
            dash,
            heal,
            basic_attack,
            casts,
        })
}

proptest! {
    /// Property: Arbitrary bytes don't crash client decoder
    #[test]
    fn arbitrary_bytes_dont_crash_client(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = decode_client_message(&random_bytes);
        // No panic = success
    }

    /// Property: Arbitrary bytes don't crash server decoder
    #[test]
    fn arbitrary_bytes_dont_crash_server(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = decode_server_message(&random_bytes);
        // No panic = success
    }

    /// Property: Framed garbage with a valid header doesn't crash either
    #[test]
    fn framed_garbage_doesnt_crash(
        tag in 0u8..4,
        payload in prop::collection::vec(any::<u8>(), 0..600),
    ) {
        let mut frame = ((payload.len() + 1) as u32).to_le_bytes().to_vec();
        frame.push(tag);
        frame.extend_from_slice(&payload);
        let _ = decode_client_message(&frame);
        let _ = decode_server_message(&frame);
    }

    /// Property: Input messages up to the redundancy cap roundtrip and fit a datagram
    #[test]
    fn input_messages_roundtrip_within_datagram(
        tick in any::<u32>(),
        samples in prop::collection::vec(input_sample(), 1..=MAX_REDUNDANT_INPUTS),
    ) {
        let msg = ClientMessage::Input(InputMessage {
            tick: SimTick(tick),
            delta_time: 0.02,
            samples,
        });

        let encoded = encode_client_message(&msg).unwrap();
        prop_assert!(encoded.len() <= MAX_DATAGRAM_LEN);
        let decoded = decode_client_message(&encoded).unwrap();

        prop_assert_eq!(msg, decoded);
    }

    /// Property: State envelopes roundtrip
    #[test]
    fn state_envelopes_roundtrip(
        entity_id in any::<u64>(),
        tick in any::<u32>(),
        x in -1000.0f32..1000.0,
        z in -1000.0f32..1000.0,
        yaw in -3.0f32..3.0,
    ) {
        let state = EntityState::spawned(Vec3::new(x, 0.0, z), Quat::from_rotation_y(yaw));
        let msg = ServerMessage::State {
            entity_id,
            state: StateMessage::from_state(SimTick(tick), 0.02, &state),
        };

        let encoded = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&encoded).unwrap();

        prop_assert_eq!(msg, decoded);
    }
}
