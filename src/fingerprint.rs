//! Request fingerprinting
//!
//! Turns a request-parameter mapping into a stable, order-independent cache
//! key. The fingerprint is not a security boundary; it only needs to be
//! deterministic and collision-resistant at cache scale.

use sha2::{Digest, Sha256};

use crate::Params;

/// Digest bytes kept from the SHA-256 output (128 bits, 32 hex chars).
const FINGERPRINT_BYTES: usize = 16;

/// Computes a deterministic fingerprint for a set of request parameters.
///
/// Two mappings holding the same key/value pairs produce the same
/// fingerprint regardless of how they were built; [`Params`] iterates in key
/// order, so the hashed byte stream is canonical. Values are folded in via
/// their JSON rendering, which keeps `"1"` and `1` distinct.
pub fn fingerprint(params: &Params) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.to_string().as_bytes());
        hasher.update([0x1e]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..FINGERPRINT_BYTES])
}
