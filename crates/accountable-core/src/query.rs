// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Read-only lookups over projections, plus timeline reconstruction from the
//! event log. Readers never block writers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::event::LedgerEvent;
use crate::ledger::LedgerService;
use crate::payloads::ClaimType;
use crate::projection::{ClaimProjection, ClaimStatus, EditorProjection, EvidenceProjection};
use crate::store::EventStore as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimOrder {
    #[default]
    DeclaredAtDesc,
    DeclaredAtAsc,
    LastUpdatedDesc,
}

#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub status: Option<ClaimStatus>,
    pub claim_type: Option<ClaimType>,
    pub order: ClaimOrder,
    pub limit: Option<usize>,
}

/// Projection fields merged with the claim's reconstructed timeline.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimDetail {
    pub claim: ClaimProjection,
    pub timeline: Vec<LedgerEvent>,
    pub evidence: Vec<EvidenceProjection>,
}

/// Cached chain status surfaced to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityStatus {
    pub ledger_integrity_valid: bool,
    pub event_count: u64,
    pub last_event_hash: Option<String>,
}

impl LedgerService {
    pub fn list_claims(&self, filter: &ClaimFilter) -> Vec<ClaimProjection> {
        let mut claims: Vec<ClaimProjection> = self.with_projections(|p| {
            p.claims()
                .filter(|c| filter.status.map(|s| c.status == s).unwrap_or(true))
                .filter(|c| {
                    filter
                        .claim_type
                        .map(|t| c.claim_type == t)
                        .unwrap_or(true)
                })
                .cloned()
                .collect()
        });

        match filter.order {
            ClaimOrder::DeclaredAtDesc => {
                claims.sort_by(|a, b| b.declared_at.cmp(&a.declared_at));
            }
            ClaimOrder::DeclaredAtAsc => {
                claims.sort_by(|a, b| a.declared_at.cmp(&b.declared_at));
            }
            ClaimOrder::LastUpdatedDesc => {
                claims.sort_by(|a, b| b.last_event_sequence.cmp(&a.last_event_sequence));
            }
        }

        if let Some(limit) = filter.limit {
            claims.truncate(limit);
        }
        claims
    }

    pub fn claim_detail(&self, claim_id: Uuid) -> LedgerResult<ClaimDetail> {
        let (claim, evidence) = self.with_projections(|p| {
            (
                p.claim(claim_id).cloned(),
                p.evidence_for_claim(claim_id)
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>(),
            )
        });
        let claim = claim.ok_or_else(|| LedgerError::UnknownEntity(format!("claim {claim_id}")))?;
        let timeline = self.store().list_for_claim(claim_id)?;
        Ok(ClaimDetail {
            claim,
            timeline,
            evidence,
        })
    }

    pub fn get_editor(&self, editor_id: Uuid) -> Option<EditorProjection> {
        self.with_projections(|p| p.editor(editor_id).cloned())
    }

    pub fn list_editors(&self, active_only: bool) -> Vec<EditorProjection> {
        self.with_projections(|p| {
            p.editors()
                .filter(|e| !active_only || e.is_active)
                .cloned()
                .collect()
        })
    }

    pub fn integrity_status(&self) -> LedgerResult<IntegrityStatus> {
        let head = self.store().head()?;
        Ok(IntegrityStatus {
            ledger_integrity_valid: !self.is_write_suspended(),
            event_count: self.store().count()?,
            last_event_hash: head.last_event_hash,
        })
    }
}
