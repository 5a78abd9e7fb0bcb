//! Session identifier generation.

use std::time::{SystemTime, UNIX_EPOCH};

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Generate a fresh session id.
///
/// A nanosecond timestamp and a random 64-bit value are hashed separately,
/// the two digests are concatenated and hashed again. The result is 32
/// uppercase hex characters.
pub fn generate_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let nonce: u64 = rand::random();

    let combined = md5_hex(&nanos.to_string()) + &md5_hex(&nonce.to_string());
    md5_hex(&combined).to_uppercase()
}
