// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! accountable-verifier
//!
//! Standalone verification for AccountabilityMe ledger artifacts. A verifier
//! with no access to the ledger can use this crate to:
//! - recompute canonical payload bytes and event hashes
//! - check hash-chain linkage between events
//! - verify Ed25519 editor signatures over raw event-hash bytes
//! - verify Merkle inclusion proofs against an anchored root
//! - classify an exported claim bundle as VERIFIED / TAMPERED /
//!   INCOMPLETE / INVALID_FORMAT
//!
//! The implementation is deliberately self-contained: it must not depend on
//! the ledger core, so that bundle verification stays meaningful even when
//! the ledger itself is the artifact under suspicion.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod bundle;

pub use bundle::{verify_bundle, BundleReport, BundleVerdict};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub type Hash32 = [u8; 32];

/// Version tag injected into every canonical payload as `__canon_v`.
pub const CANON_VERSION: u64 = 1;

const CANON_VERSION_KEY: &str = "__canon_v";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalError {
    #[error("top-level canonical value must be an object")]
    TopLevelNotObject,
    #[error("floating point numbers are not allowed in canonical payloads")]
    FloatNotAllowed,
    #[error("previous event hash must be 64 hex characters")]
    InvalidPreviousHash,
    #[error("canonical serialization failed")]
    Serialize,
}

pub fn sha256(bytes: &[u8]) -> Hash32 {
    let mut h = Sha256::new();
    h.update(bytes);
    h.finalize().into()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// True when `s` is a 64-character hex string (either case).
pub fn is_hex_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Case-insensitive, constant-time comparison of two hex hashes.
pub fn hashes_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| {
            acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase())
        })
        == 0
}

fn canonical_value(v: &Value) -> Result<Value, CanonicalError> {
    match v {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(v.clone()),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(CanonicalError::FloatNotAllowed);
            }
            Ok(v.clone())
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(canonical_value)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            let mut sorted = Map::new();
            for (key, value) in entries {
                if value.is_null() {
                    continue;
                }
                sorted.insert(key.clone(), canonical_value(value)?);
            }
            Ok(Value::Object(sorted))
        }
    }
}

/// Deterministic byte representation of a payload.
///
/// Null-valued keys are dropped, keys are sorted in UTF-8 byte order, and the
/// `__canon_v` version tag is inserted at the top level where it sorts with
/// the payload's own keys. Output is compact UTF-8 JSON with no BOM.
pub fn canonicalize(payload: &Value) -> Result<Vec<u8>, CanonicalError> {
    let Value::Object(map) = payload else {
        return Err(CanonicalError::TopLevelNotObject);
    };
    let mut tagged = map.clone();
    tagged.insert(CANON_VERSION_KEY.to_string(), Value::from(CANON_VERSION));
    let sorted = canonical_value(&Value::Object(tagged))?;
    serde_json::to_vec(&sorted).map_err(|_| CanonicalError::Serialize)
}

/// Compute an event hash from canonical payload bytes and the previous hash.
///
/// Genesis events hash the canonical bytes alone; chained events hash
/// `lowercase_hex(previous) || ":" || canonical_bytes`. Output is lowercase
/// hex.
pub fn event_hash(canonical: &[u8], previous: Option<&str>) -> Result<String, CanonicalError> {
    match previous {
        None => Ok(hex::encode(sha256(canonical))),
        Some(prev) => {
            if !is_hex_hash(prev) {
                return Err(CanonicalError::InvalidPreviousHash);
            }
            let mut input = Vec::with_capacity(65 + canonical.len());
            input.extend_from_slice(prev.to_ascii_lowercase().as_bytes());
            input.push(b':');
            input.extend_from_slice(canonical);
            Ok(hex::encode(sha256(&input)))
        }
    }
}

/// Verify an editor signature over the raw 32 bytes of an event hash.
///
/// The hex hash is decoded before verification; signatures over the hex
/// string itself do not verify.
pub fn verify_event_signature(
    event_hash_hex: &str,
    signature_b64: &str,
    public_key_b64: &str,
) -> bool {
    let Ok(hash_bytes) = hex::decode(event_hash_hex) else {
        return false;
    };
    if hash_bytes.len() != 32 {
        return false;
    }
    let Ok(key_bytes) = B64.decode(public_key_b64) else {
        return false;
    };
    let Ok(key_arr) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_arr) else {
        return false;
    };
    let Ok(sig_bytes) = B64.decode(signature_b64) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    key.verify(&hash_bytes, &signature).is_ok()
}

/// Which side of the current node a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiblingPosition {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

/// One bottom-up step of a Merkle inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling_hash: String,
    pub position: SiblingPosition,
}

/// Interior node hash: SHA-256 over the concatenated 32-byte children.
pub fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256(&buf)
}

/// Recompute a root from a leaf event hash and a sibling path; compare with
/// the expected root, case-insensitively.
pub fn verify_inclusion_proof(
    leaf_event_hash: &str,
    path: &[ProofStep],
    expected_root: &str,
) -> bool {
    let Ok(leaf) = hex::decode(leaf_event_hash) else {
        return false;
    };
    let Ok(mut current) = <Hash32>::try_from(leaf.as_slice()) else {
        return false;
    };
    for step in path {
        let Ok(sibling) = hex::decode(&step.sibling_hash) else {
            return false;
        };
        let Ok(sibling) = <Hash32>::try_from(sibling.as_slice()) else {
            return false;
        };
        current = match step.position {
            SiblingPosition::Left => node_hash(&sibling, &current),
            SiblingPosition::Right => node_hash(&current, &sibling),
        };
    }
    hashes_equal(&hex::encode(current), expected_root)
}
