// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! SHA-256 hashing and hash-chain composition.
//!
//! An event hash commits to the canonical payload bytes and to the previous
//! event's hash: genesis events hash the canonical bytes alone, chained
//! events hash `lowercase_hex(previous) || ":" || canonical_bytes`. Hex
//! output is lowercase; comparison is case-insensitive.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::{canonicalize, CanonicalError};

pub type Hash32 = [u8; 32];

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

/// Compute an event hash from canonical payload bytes.
pub fn chain_hash(canonical: &[u8], previous: Option<&str>) -> Result<String, CanonicalError> {
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

/// Canonicalize a payload and compute its chained event hash.
pub fn hash_event_payload(
    payload: &Value,
    previous: Option<&str>,
) -> Result<String, CanonicalError> {
    let canonical = canonicalize(payload)?;
    chain_hash(&canonical, previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn genesis_and_chained_hashes_match_reference_vectors() {
        let payload = json!({
            "statement": "Median rent will fall",
            "claim_type": "predictive",
        });
        let genesis = hash_event_payload(&payload, None).expect("genesis");
        assert_eq!(
            genesis,
            "2d9a8930767f5d206e485c722de888c201e66fdc91bd7cf9fe14e0384956d79c"
        );
        let chained = hash_event_payload(&payload, Some(&genesis)).expect("chained");
        assert_eq!(
            chained,
            "fa03e0f189226a58adb9a9f912c28d1244177fe0e19a952caf2fc902331e8071"
        );
    }

    #[test]
    fn previous_hash_case_is_normalized() {
        let payload = json!({"note": "follow-up"});
        let prev = "2d9a8930767f5d206e485c722de888c201e66fdc91bd7cf9fe14e0384956d79c";
        let lower = hash_event_payload(&payload, Some(prev)).expect("lower");
        let upper =
            hash_event_payload(&payload, Some(&prev.to_ascii_uppercase())).expect("upper");
        assert_eq!(lower, upper);
        assert_eq!(
            lower,
            "e7efbdd3ed7fb77eaf82ab8a78514522d209a1f1b9160eb0477ff51f45b8b050"
        );
    }

    #[test]
    fn malformed_previous_hash_is_rejected() {
        let payload = json!({"note": "x"});
        assert!(hash_event_payload(&payload, Some("abc")).is_err());
        assert!(hash_event_payload(&payload, Some(&"zz".repeat(32))).is_err());
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let h = sha256_hex(b"x");
        assert!(hashes_equal(&h, &h.to_ascii_uppercase()));
        assert!(!hashes_equal(&h, &sha256_hex(b"y")));
    }
}
