use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-provider-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Verified,
    /// No secret configured; payload accepted unverified.
    Skipped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {SIGNATURE_HEADER} header")]
    Missing,
    #[error("signature header is not valid hex")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
}

pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify `provided` against an HMAC-SHA256 of the raw body.
///
/// A `None` or blank secret puts the endpoint in relaxed mode and every
/// payload is accepted.
pub fn verify_signature(
    secret: Option<&str>,
    payload: &[u8],
    provided: Option<&str>,
) -> Result<SignatureCheck, SignatureError> {
    let secret = match secret.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => secret,
        None => return Ok(SignatureCheck::Skipped),
    };

    let provided = provided
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let provided = hex::decode(provided).map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    if expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() == 1 {
        Ok(SignatureCheck::Verified)
    } else {
        Err(SignatureError::Mismatch)
    }
}
