#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signature headers in lookup order.
pub const SIGNATURE_HEADERS: [&str; 2] = ["x-kommo-signature", "x-signature"];

const DIGEST_PREFIX: &str = "sha256=";

/// Lowercase hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn compute_signature(body: &[u8], secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|err| {
        AppError::new(
            ErrorCategory::InternalError,
            format!("failed to initialise HMAC: {}", err),
        )
    })?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` (hex, optionally `sha256=`-prefixed) against the exact body bytes.
///
/// Digests are compared in constant time. An empty secret or undecodable hex is a mismatch.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let signature = signature.trim();
    let hex_digest = signature.strip_prefix(DIGEST_PREFIX).unwrap_or(signature);
    let Ok(supplied) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(supplied.as_slice()).into()
}

/// First non-empty signature header, `x-kommo-signature` taking precedence.
pub fn signature_from_headers(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    })
}
