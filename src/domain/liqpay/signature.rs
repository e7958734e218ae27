//! LiqPay request/callback signatures.
//!
//! LiqPay signs every envelope as `base64(sha1(private_key + data + private_key))`
//! where `data` is the base64 JSON envelope exactly as transmitted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Computes the LiqPay signature for an encoded envelope.
pub fn sign(data: &str, private_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(private_key.as_bytes());
    hasher.update(data.as_bytes());
    hasher.update(private_key.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Verifies a callback signature against the shared private key.
///
/// Returns false for an empty key; callers check configuration first so an
/// unconfigured integration is reported as such rather than as a bad signature.
pub fn verify(data: &str, signature: &str, private_key: &str) -> bool {
    if private_key.is_empty() {
        return false;
    }
    let expected = sign(data, private_key);
    constant_time_compare(expected.as_bytes(), signature.trim().as_bytes())
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
