//! # Webhook Signature Verification
//!
//! Square webhook signature verification using HMAC-SHA1 with constant-time
//! comparison to prevent timing attacks.
//!
//! Square signs `notification_url + raw_body` and sends
//! `base64(HMAC-SHA1(...))` in the `x-square-signature` header. Verification
//! MUST run against the raw, unparsed body, and the notification URL must
//! byte-for-byte match what Square was configured to call.

use axum::http::StatusCode;
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the Square webhook signature.
pub const SQUARE_SIGNATURE_HEADER: &str = "x-square-signature";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::MissingSignature { .. } => StatusCode::UNAUTHORIZED,
            VerificationError::VerificationFailed => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Computes the expected Square signature for a notification URL and raw body.
pub fn square_signature(signing_key: &str, notification_url: &str, body: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(notification_url.as_bytes());
    mac.update(body);
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Verifies a Square webhook signature against the raw request body.
pub fn verify_square_signature(
    body: &[u8],
    signature_header: &str,
    signing_key: &str,
    notification_url: &str,
) -> VerificationResult<()> {
    tracing::debug!(
        body_size = body.len(),
        "Starting Square signature verification"
    );

    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: SQUARE_SIGNATURE_HEADER.to_string(),
        });
    }

    let expected = square_signature(signing_key, notification_url, body);

    // Constant-time comparison; a length mismatch fails the same way as a
    // content mismatch.
    if subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), signature_header.as_bytes()).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}
