use ring::hmac;

/// HMAC-SHA256 over a payload, hex-encoded.
pub fn sign(payload: &str, key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, payload.as_bytes()).as_ref())
}

/// Constant-time verification of a hex signature. Malformed hex is simply
/// a failed verification.
pub fn verify(payload: &str, signature: &str, key: &[u8]) -> bool {
    let Ok(decoded) = hex::decode(signature) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload.as_bytes(), &decoded).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-signing-key";

    #[test]
    fn sign_then_verify() {
        let sig = sign("QR-001", KEY);
        assert!(verify("QR-001", &sig, KEY));
    }

    #[test]
    fn tampered_payload_fails() {
        let sig = sign("QR-001", KEY);
        assert!(!verify("QR-002", &sig, KEY));
    }

    #[test]
    fn wrong_key_fails() {
        let sig = sign("QR-001", KEY);
        assert!(!verify("QR-001", &sig, b"other-key"));
    }

    #[test]
    fn garbage_signature_fails() {
        assert!(!verify("QR-001", "not hex at all", KEY));
        assert!(!verify("QR-001", "deadbeef", KEY));
    }
}
