//! Fuzz target for the signed hex digest formatter
//!
//! # Invariants
//!
//! - Output is lowercase hex with an optional leading `-`
//! - No leading zeros; zero is exactly `"0"` and never negative
//! - The sign follows the high bit of the first byte
//! - Digests that fit in an `i128` match Rust's own signed formatting

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lodestone_core::{hex_digest, server_hash};

#[derive(Debug, Arbitrary)]
struct DigestInput {
    digest: Vec<u8>,
    server_id: String,
    shared_secret: Vec<u8>,
    public_key: Vec<u8>,
}

fn check_shape(formatted: &str, digest: &[u8]) {
    let (negative, digits) = match formatted.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, formatted),
    };

    assert!(!digits.is_empty(), "no digits for {digest:02x?}");
    assert!(
        digits.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
        "non-hex output {formatted:?}"
    );
    assert!(digits == "0" || !digits.starts_with('0'), "leading zero in {formatted:?}");
    assert!(!(negative && digits == "0"), "negative zero for {digest:02x?}");

    let high_bit = digest.first().is_some_and(|b| b & 0x80 != 0);
    assert_eq!(negative, high_bit, "sign of {formatted:?} for {digest:02x?}");
}

fuzz_target!(|input: DigestInput| {
    let formatted = hex_digest(&input.digest);
    check_shape(&formatted, &input.digest);

    if !input.digest.is_empty() && input.digest.len() <= 16 {
        let mut bytes = [0u8; 16];
        let fill = if input.digest[0] & 0x80 != 0 { 0xff } else { 0x00 };
        let pad = 16 - input.digest.len();
        bytes[..pad].fill(fill);
        bytes[pad..].copy_from_slice(&input.digest);

        let value = i128::from_be_bytes(bytes);
        let expected = if value < 0 {
            format!("-{:x}", value.unsigned_abs())
        } else {
            format!("{value:x}")
        };
        assert_eq!(formatted, expected);
    }

    let hash = server_hash(&input.server_id, &input.shared_secret, &input.public_key);
    assert!(hash.len() <= 41, "SHA-1 digest formats to at most 41 chars, got {hash:?}");
});
