//! Webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery body with the webhook secret and sends the
//! digest in the `X-Hub-Signature-256` header as `sha256=<hex>`. Deliveries
//! are verified before their body is even parsed as JSON.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Parses a `sha256=<hex>` header value into raw digest bytes.
///
/// Returns `None` for a missing prefix, another algorithm, or bad hex.
///
/// # Examples
///
/// ```
/// use git_activity_sync::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

fn keyed_mac(secret: &[u8]) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret).ok()
}

/// Computes the `sha256=<hex>` header value GitHub would send for `payload`.
///
/// Returns `None` only if the secret is rejected as an HMAC key.
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verifies a delivery signature against the shared secret.
///
/// An empty secret rejects every delivery: an unconfigured receiver must not
/// accept unsigned traffic. The digest comparison is constant-time.
///
/// # Examples
///
/// ```
/// use git_activity_sync::webhooks::{sign_payload, verify_signature};
///
/// let body = b"{\"zen\":\"Design for failure.\"}";
/// let header = sign_payload(body, b"my-secret").unwrap();
///
/// assert!(verify_signature(body, &header, b"my-secret"));
/// assert!(!verify_signature(body, &header, b"wrong-secret"));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Some(mut mac) = keyed_mac(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
