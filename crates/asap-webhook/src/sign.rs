// SPDX-License-Identifier: MIT OR Apache-2.0
//! HMAC-SHA256 request signing for webhook deliveries.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Header carrying the hex-encoded signature of the request body.
pub const SIGNATURE_HEADER: &str = "X-Asap-Signature-256";

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 of `body` under `secret`.
#[must_use]
pub fn sign_body(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify `signature` (hex-encoded) against `body` under `secret` in
/// constant time.
#[must_use]
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(given) = hex::decode(signature) else { return false };
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(&given).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_against_the_same_body() {
        let sig = sign_body(b"secret", b"payload");
        assert!(verify_signature(b"secret", b"payload", &sig));
    }

    #[test]
    fn signature_rejects_a_tampered_body() {
        let sig = sign_body(b"secret", b"payload");
        assert!(!verify_signature(b"secret", b"different", &sig));
    }

    #[test]
    fn signature_rejects_the_wrong_secret() {
        let sig = sign_body(b"secret", b"payload");
        assert!(!verify_signature(b"other-secret", b"payload", &sig));
    }

    #[test]
    fn malformed_signature_is_rejected_not_panicking() {
        assert!(!verify_signature(b"secret", b"payload", "not-hex!"));
    }
}
