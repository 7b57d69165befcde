// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ed25519 signing for editorial accountability.
//!
//! Every event is signed by the editor who created it, over the raw 32 bytes
//! of the event hash (hex-decoded, not the hex string). Keys and signatures
//! are base64-encoded at rest.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::{LedgerError, LedgerResult};

/// Fixed challenge used to check that a private key corresponds to a
/// registered public key. Correspondence only; replay is not a concern here.
const KEY_CHALLENGE: &[u8] = b"accountable-key-verification-challenge-v1";

pub const SYSTEM_PRIVATE_KEY_ENV: &str = "ACCOUNTABLE_SYSTEM_PRIVATE_KEY";
pub const SYSTEM_PUBLIC_KEY_ENV: &str = "ACCOUNTABLE_SYSTEM_PUBLIC_KEY";

/// A base64-encoded Ed25519 keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypair {
    pub private_key: String,
    pub public_key: String,
}

impl Keypair {
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        Self {
            private_key: B64.encode(signing.to_bytes()),
            public_key: B64.encode(signing.verifying_key().to_bytes()),
        }
    }
}

fn signing_key_from_b64(private_b64: &str) -> LedgerResult<SigningKey> {
    let bytes = B64
        .decode(private_b64)
        .map_err(|_| LedgerError::Validation("private key is not valid base64".to_string()))?;
    let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        LedgerError::Validation("private key must decode to 32 bytes".to_string())
    })?;
    Ok(SigningKey::from_bytes(&seed))
}

fn verifying_key_from_b64(public_b64: &str) -> LedgerResult<VerifyingKey> {
    let bytes = B64
        .decode(public_b64)
        .map_err(|_| LedgerError::Validation("public key is not valid base64".to_string()))?;
    let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        LedgerError::Validation("public key must decode to 32 bytes".to_string())
    })?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|_| LedgerError::Validation("public key is not a valid Ed25519 point".to_string()))
}

/// Sign arbitrary message bytes; returns a base64 signature.
pub fn sign(private_key_b64: &str, message: &[u8]) -> LedgerResult<String> {
    let key = signing_key_from_b64(private_key_b64)?;
    Ok(B64.encode(key.sign(message).to_bytes()))
}

/// Verify a base64 signature over arbitrary message bytes.
pub fn verify(public_key_b64: &str, message: &[u8], signature_b64: &str) -> bool {
    let Ok(key) = verifying_key_from_b64(public_key_b64) else {
        return false;
    };
    let Ok(sig_bytes) = B64.decode(signature_b64) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Sign an event hash. The hex hash is decoded first; the signature covers
/// the raw 32 bytes.
pub fn sign_event_hash(private_key_b64: &str, event_hash_hex: &str) -> LedgerResult<String> {
    let hash_bytes = hex::decode(event_hash_hex)
        .map_err(|_| LedgerError::Validation("event hash is not valid hex".to_string()))?;
    if hash_bytes.len() != 32 {
        return Err(LedgerError::Validation(
            "event hash must decode to 32 bytes".to_string(),
        ));
    }
    sign(private_key_b64, &hash_bytes)
}

/// Verify an event-hash signature against a base64 public key.
pub fn verify_event_hash(
    public_key_b64: &str,
    event_hash_hex: &str,
    signature_b64: &str,
) -> bool {
    accountable_verifier::verify_event_signature(event_hash_hex, signature_b64, public_key_b64)
}

/// Check that a private key corresponds to a registered public key.
pub fn key_matches(private_key_b64: &str, public_key_b64: &str) -> bool {
    match sign(private_key_b64, KEY_CHALLENGE) {
        Ok(signature) => verify(public_key_b64, KEY_CHALLENGE, &signature),
        Err(_) => false,
    }
}

/// The process-wide system keypair.
///
/// Used for events not directly attributable to a human editor, such as
/// automated anchoring bookkeeping. Loaded from the environment; when no key
/// is configured an ephemeral pair is generated and signatures will not
/// survive a restart.
#[derive(Debug, Clone)]
pub struct SystemKeys {
    keypair: Keypair,
    ephemeral: bool,
}

impl SystemKeys {
    pub fn from_env() -> LedgerResult<Self> {
        let private = std::env::var(SYSTEM_PRIVATE_KEY_ENV).ok().filter(|v| !v.is_empty());
        let public = std::env::var(SYSTEM_PUBLIC_KEY_ENV).ok().filter(|v| !v.is_empty());

        match (private, public) {
            (Some(private_key), Some(public_key)) => {
                if !key_matches(&private_key, &public_key) {
                    return Err(LedgerError::Validation(
                        "system keypair validation failed: private and public keys do not match"
                            .to_string(),
                    ));
                }
                tracing::info!("system signing key loaded from environment");
                Ok(Self {
                    keypair: Keypair {
                        private_key,
                        public_key,
                    },
                    ephemeral: false,
                })
            }
            _ => {
                tracing::warn!(
                    "system signing key not configured; generated an ephemeral keypair, \
                     signatures will not survive restart"
                );
                Ok(Self {
                    keypair: Keypair::generate(),
                    ephemeral: true,
                })
            }
        }
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair,
            ephemeral: false,
        }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> &str {
        &self.keypair.public_key
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256_hex;

    #[test]
    fn sign_and_verify_round_trip() {
        let pair = Keypair::generate();
        let signature = sign(&pair.private_key, b"message").expect("sign");
        assert!(verify(&pair.public_key, b"message", &signature));
        assert!(!verify(&pair.public_key, b"other", &signature));
    }

    #[test]
    fn event_hash_signature_covers_raw_bytes() {
        let pair = Keypair::generate();
        let hash = sha256_hex(b"payload");
        let signature = sign_event_hash(&pair.private_key, &hash).expect("sign");
        assert!(verify_event_hash(&pair.public_key, &hash, &signature));

        // A signature over the hex string itself must not verify.
        let over_hex = sign(&pair.private_key, hash.as_bytes()).expect("sign hex");
        assert!(!verify_event_hash(&pair.public_key, &hash, &over_hex));
    }

    #[test]
    fn key_matches_detects_mismatched_pairs() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        assert!(key_matches(&a.private_key, &a.public_key));
        assert!(!key_matches(&a.private_key, &b.public_key));
    }

    #[test]
    fn tampering_with_signature_fails_verification() {
        let pair = Keypair::generate();
        let hash = sha256_hex(b"payload");
        let signature = sign_event_hash(&pair.private_key, &hash).expect("sign");
        let mut bytes = B64.decode(&signature).expect("b64");
        bytes[0] ^= 0x01;
        assert!(!verify_event_hash(&pair.public_key, &hash, &B64.encode(bytes)));
    }
}
