// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Claim bundle export.
//!
//! A bundle is a self-contained snapshot of one claim: its events in
//! sequence, plus the public key of every editor that signed them. A
//! verifier with no ledger access can recompute every hash, check linkage
//! and verify every signature; see the `accountable-verifier` crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canonical::CANON_VERSION;
use crate::error::{LedgerError, LedgerResult};
use crate::event::{datetime_micros, now_utc_micros, LedgerEvent};
use crate::ledger::LedgerService;
use crate::projection::ClaimStatus;
use crate::store::EventStore as _;

pub const BUNDLE_VERSION: &str = "1";
pub const SPEC_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMeta {
    pub bundle_version: String,
    pub spec_version: String,
    #[serde(with = "datetime_micros")]
    pub exported_at: DateTime<Utc>,
    pub claim_id: Uuid,
    pub chain_valid_at_export: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleVerification {
    pub canonicalization_version: u64,
    pub hash_algorithm: String,
    pub signature_algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleClaim {
    pub claim_id: Uuid,
    pub status: ClaimStatus,
    pub event_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEditor {
    pub public_key: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimBundle {
    #[serde(rename = "_meta")]
    pub meta: BundleMeta,
    #[serde(rename = "_verification")]
    pub verification: BundleVerification,
    pub claim: BundleClaim,
    pub events: Vec<LedgerEvent>,
    /// Keyed by editor id; every `created_by` in `events` must appear here.
    pub editors: BTreeMap<Uuid, BundleEditor>,
}

impl ClaimBundle {
    pub fn to_json(&self) -> LedgerResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| LedgerError::Validation(format!("bundle serialization failed: {err}")))
    }
}

impl LedgerService {
    pub fn export_bundle(&self, claim_id: Uuid) -> LedgerResult<ClaimBundle> {
        let claim = self
            .with_projections(|p| p.claim(claim_id).cloned())
            .ok_or_else(|| LedgerError::UnknownEntity(format!("claim {claim_id}")))?;

        let events = self.store().list_for_claim(claim_id)?;
        if events.is_empty() {
            return Err(LedgerError::UnknownEntity(format!(
                "claim {claim_id} has no events"
            )));
        }

        let mut editors = BTreeMap::new();
        for event in &events {
            if editors.contains_key(&event.created_by) {
                continue;
            }
            let editor = self
                .get_editor(event.created_by)
                .ok_or_else(|| {
                    LedgerError::UnknownEntity(format!(
                        "editor {} referenced by event {} is not in the registry",
                        event.created_by, event.event_id
                    ))
                })?;
            editors.insert(
                event.created_by,
                BundleEditor {
                    public_key: editor.public_key,
                    username: editor.username,
                },
            );
        }

        Ok(ClaimBundle {
            meta: BundleMeta {
                bundle_version: BUNDLE_VERSION.to_string(),
                spec_version: SPEC_VERSION.to_string(),
                exported_at: now_utc_micros(),
                claim_id,
                chain_valid_at_export: !self.is_write_suspended(),
            },
            verification: BundleVerification {
                canonicalization_version: CANON_VERSION,
                hash_algorithm: "SHA-256".to_string(),
                signature_algorithm: "Ed25519".to_string(),
            },
            claim: BundleClaim {
                claim_id,
                status: claim.status,
                event_count: events.len() as u64,
            },
            events,
            editors,
        })
    }
}
