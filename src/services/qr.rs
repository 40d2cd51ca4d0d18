use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};

use crate::services::signature;

#[derive(thiserror::Error, Debug)]
pub enum QrError {
    #[error("QR code generation failed: {0}")]
    QrCode(#[from] qrcode::types::QrError),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What goes into the QR image: the opaque credential token plus an
/// HMAC so gates can reject forged payloads before touching the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub token: String,
    pub sig: String,
}

/// Builds the signed JSON payload for a credential token.
pub fn signed_payload(token: &str, key: &[u8]) -> Result<String, QrError> {
    let payload = CredentialPayload {
        token: token.to_string(),
        sig: signature::sign(token, key),
    };
    Ok(serde_json::to_string(&payload)?)
}

/// Extracts the credential token from a scanned payload. Gates may
/// present either the bare token or the signed JSON form; a signed
/// payload with a bad signature yields `None` (mapped upstream to
/// DENIED/INVALID_QR).
pub fn extract_token(raw: &str, key: &[u8]) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        if trimmed.is_empty() {
            return None;
        }
        return Some(trimmed.to_string());
    }

    let payload: CredentialPayload = serde_json::from_str(trimmed).ok()?;
    signature::verify(&payload.token, &payload.sig, key).then_some(payload.token)
}

/// Renders a signed payload as an SVG QR image for issuance-side
/// distribution.
pub fn render_svg(payload: &str) -> Result<String, QrError> {
    let code = QrCode::new(payload.as_bytes())?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .build();
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-signing-key";

    #[test]
    fn signed_payload_round_trips() {
        let payload = signed_payload("QR-100", KEY).unwrap();
        assert_eq!(extract_token(&payload, KEY), Some("QR-100".to_string()));
    }

    #[test]
    fn bare_token_passes_through() {
        assert_eq!(extract_token("  QR-100 ", KEY), Some("QR-100".to_string()));
        assert_eq!(extract_token("", KEY), None);
    }

    #[test]
    fn forged_signature_is_rejected() {
        let payload = r#"{"token":"QR-100","sig":"deadbeef"}"#;
        assert_eq!(extract_token(payload, KEY), None);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert_eq!(extract_token("{not json", KEY), None);
    }

    #[test]
    fn renders_svg() {
        let payload = signed_payload("QR-100", KEY).unwrap();
        let image = render_svg(&payload).unwrap();
        assert!(image.contains("<svg"));
    }
}
