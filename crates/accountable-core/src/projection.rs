// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Read-model projections.
//!
//! A pure fold over the event stream. Projections are caches: the event log
//! is always the source of truth, and a full rebuild from sequence 0 must
//! reproduce them byte-for-byte. Writes originate only from the ledger
//! service's notification path.
//!
//! The editor registry is itself a projection over EDITOR_REGISTERED and
//! EDITOR_DEACTIVATED; public keys are immutable once registered.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::event::{datetime_micros, EventType, LedgerEvent};
use crate::payloads::{
    AddEvidence, ClaimScope, ClaimType, DeactivateEditor, DeclareClaim, EditorRole,
    OperationalizeClaim, RegisterEditor, Resolution, ResolveClaim,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Declared,
    Operationalized,
    /// Derived by the projector when evidence arrives on an operationalized
    /// claim; never emitted as its own event.
    Observing,
    Resolved,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Declared => "declared",
            ClaimStatus::Operationalized => "operationalized",
            ClaimStatus::Observing => "observing",
            ClaimStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimProjection {
    pub claim_id: Uuid,
    pub statement: String,
    pub status: ClaimStatus,
    pub claim_type: ClaimType,
    pub source_url: String,
    pub scope: ClaimScope,
    #[serde(with = "datetime_micros")]
    pub declared_at: DateTime<Utc>,
    #[serde(with = "datetime_micros::option")]
    pub operationalized_at: Option<DateTime<Utc>>,
    #[serde(with = "datetime_micros::option")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
    pub resolution_summary: Option<String>,
    pub outcome_description: Option<String>,
    pub evidence_count: u32,
    pub supporting_evidence_count: u32,
    pub contradicting_evidence_count: u32,
    pub last_event_sequence: u64,
    pub last_event_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorProjection {
    pub editor_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: EditorRole,
    /// Immutable after registration.
    pub public_key: String,
    pub is_active: bool,
    #[serde(with = "datetime_micros")]
    pub registered_at: DateTime<Utc>,
    pub registered_by: Option<Uuid>,
    #[serde(with = "datetime_micros::option")]
    pub deactivated_at: Option<DateTime<Utc>>,
    pub claim_count: u32,
    pub evidence_count: u32,
    #[serde(with = "datetime_micros::option")]
    pub last_action_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceProjection {
    pub evidence_id: Uuid,
    pub claim_id: Uuid,
    pub source_url: String,
    pub source_title: String,
    pub supports_claim: bool,
    #[serde(with = "datetime_micros")]
    pub added_at: DateTime<Utc>,
    pub added_by: Uuid,
}

/// The folded read model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionState {
    claims: BTreeMap<Uuid, ClaimProjection>,
    editors: BTreeMap<Uuid, EditorProjection>,
    evidence: BTreeMap<Uuid, EvidenceProjection>,
    claim_evidence: HashMap<Uuid, Vec<Uuid>>,
    username_index: HashMap<String, Uuid>,
    public_key_index: HashMap<String, Uuid>,
    last_processed_sequence: Option<u64>,
}

fn decode<T: serde::de::DeserializeOwned>(event: &LedgerEvent) -> LedgerResult<T> {
    serde_json::from_value(event.payload.clone()).map_err(|err| {
        LedgerError::Validation(format!(
            "projection could not decode {} payload at sequence {}: {err}",
            event.event_type, event.sequence_number
        ))
    })
}

impl ProjectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_processed_sequence(&self) -> Option<u64> {
        self.last_processed_sequence
    }

    /// Apply one event. Idempotent given sequence numbers: events at or below
    /// the last processed sequence are ignored.
    pub fn apply(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        if let Some(last) = self.last_processed_sequence {
            if event.sequence_number <= last {
                return Ok(());
            }
        }

        match event.event_type {
            EventType::EditorRegistered => self.on_editor_registered(event)?,
            EventType::EditorDeactivated => self.on_editor_deactivated(event)?,
            EventType::ClaimDeclared => self.on_claim_declared(event)?,
            EventType::ClaimOperationalized => self.on_claim_operationalized(event)?,
            EventType::EvidenceAdded => self.on_evidence_added(event)?,
            EventType::ClaimResolved => self.on_claim_resolved(event)?,
        }

        self.last_processed_sequence = Some(event.sequence_number);
        Ok(())
    }

    /// Truncate everything and replay from sequence 0.
    pub fn rebuild<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a LedgerEvent>,
    ) -> LedgerResult<()> {
        *self = Self::default();
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    fn on_editor_registered(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        let payload: RegisterEditor = decode(event)?;
        let editor = EditorProjection {
            editor_id: payload.editor_id,
            username: payload.username.clone(),
            display_name: payload.display_name,
            role: payload.role,
            public_key: payload.public_key.clone(),
            is_active: true,
            registered_at: event.created_at,
            registered_by: payload.registered_by,
            deactivated_at: None,
            claim_count: 0,
            evidence_count: 0,
            last_action_at: None,
        };
        self.username_index
            .insert(payload.username, payload.editor_id);
        self.public_key_index
            .insert(payload.public_key, payload.editor_id);
        self.editors.insert(payload.editor_id, editor);
        Ok(())
    }

    fn on_editor_deactivated(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        let payload: DeactivateEditor = decode(event)?;
        if let Some(editor) = self.editors.get_mut(&payload.editor_id) {
            editor.is_active = false;
            editor.deactivated_at = Some(event.created_at);
        }
        Ok(())
    }

    fn on_claim_declared(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        let payload: DeclareClaim = decode(event)?;
        let claim = ClaimProjection {
            claim_id: payload.claim_id,
            statement: payload.statement,
            status: ClaimStatus::Declared,
            claim_type: payload.claim_type,
            source_url: payload.source_url,
            scope: payload.scope,
            declared_at: event.created_at,
            operationalized_at: None,
            resolved_at: None,
            resolution: None,
            resolution_summary: None,
            outcome_description: None,
            evidence_count: 0,
            supporting_evidence_count: 0,
            contradicting_evidence_count: 0,
            last_event_sequence: event.sequence_number,
            last_event_hash: event.event_hash.clone(),
        };
        self.claims.insert(payload.claim_id, claim);
        self.claim_evidence.insert(payload.claim_id, Vec::new());
        self.touch_editor(event, true, false);
        Ok(())
    }

    fn on_claim_operationalized(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        let payload: OperationalizeClaim = decode(event)?;
        if let Some(claim) = self.claims.get_mut(&payload.claim_id) {
            claim.status = ClaimStatus::Operationalized;
            claim.operationalized_at = Some(event.created_at);
            claim.outcome_description = Some(payload.outcome_description);
            claim.last_event_sequence = event.sequence_number;
            claim.last_event_hash = event.event_hash.clone();
        }
        self.touch_editor(event, false, false);
        Ok(())
    }

    fn on_evidence_added(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        let payload: AddEvidence = decode(event)?;
        let record = EvidenceProjection {
            evidence_id: payload.evidence_id,
            claim_id: payload.claim_id,
            source_url: payload.source_url,
            source_title: payload.source_title,
            supports_claim: payload.supports_claim,
            added_at: event.created_at,
            added_by: event.created_by,
        };
        self.evidence.insert(payload.evidence_id, record);
        self.claim_evidence
            .entry(payload.claim_id)
            .or_default()
            .push(payload.evidence_id);

        if let Some(claim) = self.claims.get_mut(&payload.claim_id) {
            claim.evidence_count += 1;
            if payload.supports_claim {
                claim.supporting_evidence_count += 1;
            } else {
                claim.contradicting_evidence_count += 1;
            }
            if claim.status == ClaimStatus::Operationalized {
                claim.status = ClaimStatus::Observing;
            }
            claim.last_event_sequence = event.sequence_number;
            claim.last_event_hash = event.event_hash.clone();
        }
        self.touch_editor(event, false, true);
        Ok(())
    }

    fn on_claim_resolved(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        let payload: ResolveClaim = decode(event)?;
        if let Some(claim) = self.claims.get_mut(&payload.claim_id) {
            claim.status = ClaimStatus::Resolved;
            claim.resolved_at = Some(event.created_at);
            claim.resolution = Some(payload.resolution);
            claim.resolution_summary = Some(payload.resolution_summary);
            claim.last_event_sequence = event.sequence_number;
            claim.last_event_hash = event.event_hash.clone();
        }
        self.touch_editor(event, false, false);
        Ok(())
    }

    fn touch_editor(&mut self, event: &LedgerEvent, claim: bool, evidence: bool) {
        if let Some(editor) = self.editors.get_mut(&event.created_by) {
            if claim {
                editor.claim_count += 1;
            }
            if evidence {
                editor.evidence_count += 1;
            }
            editor.last_action_at = Some(event.created_at);
        }
    }

    // Accessors. The ledger service validates commands against these; the
    // query layer serves reads from them.

    pub fn claim(&self, claim_id: Uuid) -> Option<&ClaimProjection> {
        self.claims.get(&claim_id)
    }

    pub fn claims(&self) -> impl Iterator<Item = &ClaimProjection> {
        self.claims.values()
    }

    pub fn claim_status(&self, claim_id: Uuid) -> Option<ClaimStatus> {
        self.claims.get(&claim_id).map(|c| c.status)
    }

    pub fn editor(&self, editor_id: Uuid) -> Option<&EditorProjection> {
        self.editors.get(&editor_id)
    }

    pub fn editors(&self) -> impl Iterator<Item = &EditorProjection> {
        self.editors.values()
    }

    pub fn editor_by_username(&self, username: &str) -> Option<&EditorProjection> {
        self.username_index
            .get(username)
            .and_then(|id| self.editors.get(id))
    }

    pub fn editor_by_public_key(&self, public_key: &str) -> Option<&EditorProjection> {
        self.public_key_index
            .get(public_key)
            .and_then(|id| self.editors.get(id))
    }

    pub fn has_editors(&self) -> bool {
        !self.editors.is_empty()
    }

    pub fn active_admin_count(&self) -> usize {
        self.editors
            .values()
            .filter(|e| e.is_active && e.role == EditorRole::Admin)
            .count()
    }

    pub fn evidence(&self, evidence_id: Uuid) -> Option<&EvidenceProjection> {
        self.evidence.get(&evidence_id)
    }

    pub fn evidence_for_claim(&self, claim_id: Uuid) -> Vec<&EvidenceProjection> {
        self.claim_evidence
            .get(&claim_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.evidence.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn evidence_ids_for_claim(&self, claim_id: Uuid) -> &[Uuid] {
        self.claim_evidence
            .get(&claim_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
