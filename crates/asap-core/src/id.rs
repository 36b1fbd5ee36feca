// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sortable lexicographic identifiers and clock helpers (C1).

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const ID_LEN: usize = 26;
const TIME_CHARS: usize = 10;
const RANDOM_BITS: u32 = 80;

struct MonotonicState {
    last_ms: u64,
    last_random: u128,
}

static STATE: Mutex<MonotonicState> = Mutex::new(MonotonicState {
    last_ms: 0,
    last_random: 0,
});

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// Generate a 26-character lexicographic identifier (ULID-shaped): a
/// 48-bit millisecond timestamp followed by 80 bits of randomness,
/// Crockford base32 encoded. IDs generated within the same millisecond on
/// this process are monotonically increasing, by incrementing the random
/// component instead of drawing a fresh one on a timestamp collision.
#[must_use]
pub fn generate_id() -> String {
    let ms = now_millis();
    let random = {
        let mut state = STATE.lock().expect("id generator lock poisoned");
        if ms == state.last_ms {
            state.last_random = state.last_random.wrapping_add(1);
        } else {
            state.last_ms = ms;
            state.last_random = random_80_bits();
        }
        state.last_random
    };
    encode(ms, random)
}

fn random_80_bits() -> u128 {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes[6..]);
    u128::from_be_bytes(bytes) & ((1u128 << RANDOM_BITS) - 1)
}

fn encode(ms: u64, random: u128) -> String {
    let mut out = [0u8; ID_LEN];
    // 48-bit timestamp, 10 base32 characters (5 bits each).
    for (i, slot) in out.iter_mut().take(TIME_CHARS).enumerate() {
        let shift = (TIME_CHARS - 1 - i) * 5;
        *slot = CROCKFORD[((ms >> shift) & 0x1F) as usize];
    }
    // 80-bit randomness, 16 base32 characters.
    for (i, slot) in out.iter_mut().skip(TIME_CHARS).enumerate() {
        let shift = (ID_LEN - TIME_CHARS - 1 - i) * 5;
        *slot = CROCKFORD[((random >> shift) & 0x1F) as usize];
    }
    String::from_utf8(out.to_vec()).expect("crockford alphabet is ASCII")
}

fn decode_char(c: u8) -> Option<u64> {
    CROCKFORD.iter().position(|&x| x == c.to_ascii_uppercase()).map(|p| p as u64)
}

/// Recover the millisecond timestamp encoded in an identifier produced by
/// [`generate_id`]. Not authoritative: callers must not rely on it for
/// anything but debugging, since a malicious or legacy client can present
/// any value in the time field of an identifier it minted itself.
#[must_use]
pub fn extract_timestamp(id: &str) -> Option<u64> {
    if id.len() != ID_LEN {
        return None;
    }
    let mut ms: u64 = 0;
    for &b in id.as_bytes().iter().take(TIME_CHARS) {
        ms = (ms << 5) | decode_char(b)?;
    }
    Some(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_expected_length() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.bytes().all(|b| CROCKFORD.contains(&b)));
    }

    #[test]
    fn ids_are_monotonically_increasing() {
        let ids: Vec<String> = (0..200).map(|_| generate_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted, "ids generated in sequence must sort in generation order");
    }

    #[test]
    fn extract_timestamp_roundtrips_through_encode() {
        let ms = now_millis();
        let encoded = encode(ms, 0);
        assert_eq!(extract_timestamp(&encoded), Some(ms));
    }

    #[test]
    fn extract_timestamp_rejects_wrong_length() {
        assert_eq!(extract_timestamp("too-short"), None);
    }

    #[test]
    fn ids_are_unique_across_many_calls() {
        use std::collections::HashSet;
        let ids: HashSet<String> = (0..500).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 500);
    }
}
