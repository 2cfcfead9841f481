//! Signed hexadecimal digests.
//!
//! The session service identifies a server join by a SHA-1 digest printed as
//! a signed big integer: the 20 digest bytes are read as a big-endian two's
//! complement number and written in lowercase hex without leading zeros,
//! with a `-` for negative values. Most hex encoders get this wrong, so it
//! lives here on its own.

use sha1::{Digest, Sha1};

/// Format raw digest bytes as a signed big-endian hex integer.
///
/// An all-zero (or empty) digest formats as `"0"`.
pub fn hex_digest(digest: &[u8]) -> String {
    let negative = digest.first().is_some_and(|byte| byte & 0x80 != 0);

    let mut magnitude = digest.to_vec();
    if negative {
        twos_complement(&mut magnitude);
    }

    let digits = hex::encode(&magnitude);
    let digits = match digits.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };

    if negative { format!("-{digits}") } else { digits.to_string() }
}

/// Server hash sent to the session service when joining a server.
///
/// SHA-1 over the server id, the shared secret and the server's encoded
/// public key, formatted with [`hex_digest`].
pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    hex_digest(&hasher.finalize())
}

/// Negate a big-endian integer in place: invert every byte, then add one.
fn twos_complement(bytes: &mut [u8]) {
    let mut carry = true;
    for byte in bytes.iter_mut().rev() {
        let inverted = !*byte;
        if carry {
            let (sum, overflow) = inverted.overflowing_add(1);
            *byte = sum;
            carry = overflow;
        } else {
            *byte = inverted;
        }
    }
}
