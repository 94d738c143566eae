//! Payload fingerprinting for no-op save suppression.

use sha2::{Digest, Sha256};

use crate::model::DraftPayload;

/// Computes a stable hex fingerprint of a payload.
///
/// The digest is taken over the serde_json serialization of the payload.
/// Struct field order is fixed, so equal payloads always serialize to the
/// same bytes and produce the same fingerprint.
pub fn payload_fingerprint(payload: &DraftPayload) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
