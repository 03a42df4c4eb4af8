//! HMAC-SHA256 payload signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature of the request body.
pub const SIGNATURE_HEADER: &str = "X-Conductor-Signature";

/// Header carrying the RFC 3339 send time.
pub const TIMESTAMP_HEADER: &str = "X-Conductor-Timestamp";

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign(payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a hex signature in constant time.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2.
        let signature = sign(b"what do ya want for nothing?", "Jefe");
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify() {
        let body = br#"{"task_id":"t-1"}"#;
        let signature = sign(body, "s3cret");
        assert!(verify_signature(body, &signature, "s3cret"));
        assert!(!verify_signature(body, &signature, "other"));
        assert!(!verify_signature(b"{}", &signature, "s3cret"));
        assert!(!verify_signature(body, "not-hex", "s3cret"));
    }
}
