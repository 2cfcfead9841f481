//! Property-based tests for the signed-hex digest and the dispatch table.

use lodestone_core::{DispatchTable, hex_digest};
use lodestone_proto::ProtocolState;
use proptest::prelude::*;

fn any_state() -> impl Strategy<Value = ProtocolState> {
    prop_oneof![
        Just(ProtocolState::Handshaking),
        Just(ProtocolState::Status),
        Just(ProtocolState::Login),
        Just(ProtocolState::Play),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: 16-byte digests format exactly like a signed 128-bit integer
    #[test]
    fn prop_matches_signed_integer_formatting(bytes in any::<[u8; 16]>()) {
        let value = i128::from_be_bytes(bytes);
        let expected = if value < 0 {
            format!("-{:x}", value.unsigned_abs())
        } else {
            format!("{value:x}")
        };

        prop_assert_eq!(hex_digest(&bytes), expected);
    }

    /// Property: non-negative digests are plain hex without leading zeros
    #[test]
    fn prop_non_negative_is_stripped_hex(mut bytes in any::<[u8; 20]>()) {
        bytes[0] &= 0x7f;

        let plain = hex::encode(bytes);
        let stripped = plain.trim_start_matches('0');
        let expected = if stripped.is_empty() { "0" } else { stripped };

        prop_assert_eq!(hex_digest(&bytes), expected);
    }

    /// Property: the sign prefix appears exactly when the high bit is set
    #[test]
    fn prop_sign_follows_high_bit(bytes in any::<[u8; 20]>()) {
        let digest = hex_digest(&bytes);
        prop_assert_eq!(digest.starts_with('-'), bytes[0] & 0x80 != 0);
        prop_assert!(!digest.trim_start_matches('-').is_empty());
        prop_assert!(digest.len() <= 41);
    }

    /// Property: a one-shot route is returned by exactly one take
    #[test]
    fn prop_once_routes_fire_once(
        state in any_state(),
        id in any::<u8>(),
        takes in 1usize..8
    ) {
        let mut table = DispatchTable::new();
        table.once(state, id, 42u32);

        let fired: usize = (0..takes).map(|_| table.take(state, id).len()).sum();
        prop_assert_eq!(fired, 1);
        prop_assert!(table.is_empty());
    }
}
