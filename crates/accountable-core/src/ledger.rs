// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! The ledger service.
//!
//! Orchestrates every write command: validate payload, check the claim
//! lifecycle, fetch the tail, canonicalize, hash, sign, append under the
//! store's lock, then fold the new event into the projections before
//! returning. Storage contention is retried internally; validation and
//! lifecycle errors surface to the caller; a failed chain verification
//! poisons the ledger and suspends writes until an operator intervenes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::event::{EventType, LedgerEvent};
use crate::hash::hash_event_payload;
use crate::payloads::{
    AddEvidence, DeactivateEditor, DeclareClaim, EditorRole, OperationalizeClaim, RegisterEditor,
    Resolution, ResolveClaim,
};
use crate::projection::{ClaimStatus, EditorProjection, ProjectionState};
use crate::signing::{key_matches, sign_event_hash, SystemKeys};
use crate::store::{ChainVerdict, EventStore};

/// Number of attempts for an append that loses the race on the tail.
const APPEND_RETRIES: usize = 3;

/// What a successful write command returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendReceipt {
    pub event_id: Uuid,
    pub event_hash: String,
    pub sequence_number: u64,
}

pub struct LedgerService {
    store: Arc<dyn EventStore>,
    projections: RwLock<ProjectionState>,
    system_keys: SystemKeys,
    poisoned: AtomicBool,
    corrupted_at: Mutex<Option<u64>>,
    last_known_good: Mutex<Option<u64>>,
}

impl LedgerService {
    /// Load a ledger from a store, verifying the whole chain and replaying
    /// projections. This is the recommended production entry point.
    pub fn load(store: Arc<dyn EventStore>, system_keys: SystemKeys) -> LedgerResult<Self> {
        let events = store.list_all()?;
        let cancel = AtomicBool::new(false);
        match crate::store::verify_event_chain(&events, &cancel) {
            ChainVerdict::Valid | ChainVerdict::Cancelled => {}
            ChainVerdict::BrokenAt(sequence) => {
                return Err(LedgerError::LedgerCorruption(sequence));
            }
        }

        let mut projections = ProjectionState::new();
        projections.rebuild(&events)?;

        let last_good = events.last().map(|e| e.sequence_number);
        Ok(Self {
            store,
            projections: RwLock::new(projections),
            system_keys,
            poisoned: AtomicBool::new(false),
            corrupted_at: Mutex::new(None),
            last_known_good: Mutex::new(last_good),
        })
    }

    /// Load with the system keypair taken from the environment.
    pub fn open(store: Arc<dyn EventStore>) -> LedgerResult<Self> {
        let system_keys = SystemKeys::from_env()?;
        Self::load(store, system_keys)
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn system_keys(&self) -> &SystemKeys {
        &self.system_keys
    }

    /// Run `f` against a read snapshot of the projections.
    pub fn with_projections<R>(&self, f: impl FnOnce(&ProjectionState) -> R) -> R {
        f(&self.projections.read())
    }

    pub fn is_write_suspended(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub fn last_known_good_sequence(&self) -> Option<u64> {
        *self.last_known_good.lock()
    }

    /// Operator acknowledgement after out-of-band repair; re-verifies before
    /// lifting the write suspension.
    pub fn mark_recovered(&self) -> LedgerResult<()> {
        let cancel = AtomicBool::new(false);
        match self.store.verify_chain(&cancel)? {
            ChainVerdict::Valid => {
                self.poisoned.store(false, Ordering::SeqCst);
                *self.corrupted_at.lock() = None;
                tracing::info!("ledger marked recovered; writes resumed");
                Ok(())
            }
            ChainVerdict::BrokenAt(sequence) => Err(LedgerError::LedgerCorruption(sequence)),
            ChainVerdict::Cancelled => Err(LedgerError::StorageUnavailable(
                "verification cancelled".to_string(),
            )),
        }
    }

    // ================================================================
    // Write commands
    // ================================================================

    pub fn declare_claim(
        &self,
        payload: DeclareClaim,
        editor_id: Uuid,
        editor_private_key: &str,
    ) -> LedgerResult<AppendReceipt> {
        payload.validate()?;
        self.authorize_editor(editor_id, editor_private_key, None)?;
        {
            let projections = self.projections.read();
            if projections.claim(payload.claim_id).is_some() {
                return Err(LedgerError::Validation(format!(
                    "claim {} already exists",
                    payload.claim_id
                )));
            }
        }
        self.submit(
            EventType::ClaimDeclared,
            Some(payload.claim_id),
            to_payload_value(&payload)?,
            editor_id,
            editor_private_key,
        )
    }

    pub fn operationalize_claim(
        &self,
        payload: OperationalizeClaim,
        editor_id: Uuid,
        editor_private_key: &str,
    ) -> LedgerResult<AppendReceipt> {
        payload.validate()?;
        self.authorize_editor(editor_id, editor_private_key, None)?;
        {
            let projections = self.projections.read();
            let status = projections
                .claim_status(payload.claim_id)
                .ok_or_else(|| unknown_claim(payload.claim_id))?;
            if status != ClaimStatus::Declared {
                return Err(LedgerError::IllegalTransition(format!(
                    "claim {} has status {}; only declared claims can be operationalized",
                    payload.claim_id,
                    status.as_str()
                )));
            }
        }
        self.submit(
            EventType::ClaimOperationalized,
            Some(payload.claim_id),
            to_payload_value(&payload)?,
            editor_id,
            editor_private_key,
        )
    }

    pub fn add_evidence(
        &self,
        payload: AddEvidence,
        editor_id: Uuid,
        editor_private_key: &str,
    ) -> LedgerResult<AppendReceipt> {
        payload.validate()?;
        self.authorize_editor(editor_id, editor_private_key, None)?;
        {
            let projections = self.projections.read();
            let status = projections
                .claim_status(payload.claim_id)
                .ok_or_else(|| unknown_claim(payload.claim_id))?;
            if status == ClaimStatus::Resolved {
                return Err(LedgerError::IllegalTransition(format!(
                    "claim {} is resolved; no further evidence can be attached",
                    payload.claim_id
                )));
            }
            if projections.evidence(payload.evidence_id).is_some() {
                return Err(LedgerError::Validation(format!(
                    "evidence {} already exists",
                    payload.evidence_id
                )));
            }
        }
        self.submit(
            EventType::EvidenceAdded,
            Some(payload.claim_id),
            to_payload_value(&payload)?,
            editor_id,
            editor_private_key,
        )
    }

    pub fn resolve_claim(
        &self,
        payload: ResolveClaim,
        editor_id: Uuid,
        editor_private_key: &str,
    ) -> LedgerResult<AppendReceipt> {
        payload.validate()?;
        self.authorize_editor(editor_id, editor_private_key, None)?;
        {
            let projections = self.projections.read();
            let status = projections
                .claim_status(payload.claim_id)
                .ok_or_else(|| unknown_claim(payload.claim_id))?;
            match status {
                ClaimStatus::Operationalized | ClaimStatus::Observing => {}
                ClaimStatus::Resolved => {
                    return Err(LedgerError::IllegalTransition(format!(
                        "claim {} is already resolved; resolution is terminal",
                        payload.claim_id
                    )));
                }
                ClaimStatus::Declared => {
                    return Err(LedgerError::IllegalTransition(format!(
                        "claim {} must be operationalized before resolution",
                        payload.claim_id
                    )));
                }
            }
            if payload.resolution != Resolution::Inconclusive {
                let attached = projections.evidence_ids_for_claim(payload.claim_id);
                for evidence_id in &payload.supporting_evidence_ids {
                    if !attached.contains(evidence_id) {
                        return Err(LedgerError::Validation(format!(
                            "evidence {} is not attached to claim {}",
                            evidence_id, payload.claim_id
                        )));
                    }
                }
            }
        }
        self.submit(
            EventType::ClaimResolved,
            Some(payload.claim_id),
            to_payload_value(&payload)?,
            editor_id,
            editor_private_key,
        )
    }

    /// Register an editor. The first registration is the genesis editor and
    /// signs itself; all later registrations require an active admin whose
    /// private key is supplied as `registering_private_key`.
    pub fn register_editor(
        &self,
        payload: RegisterEditor,
        registering_private_key: &str,
    ) -> LedgerResult<AppendReceipt> {
        payload.validate()?;

        let signing_editor_id = {
            let projections = self.projections.read();
            if projections.editor(payload.editor_id).is_some() {
                return Err(LedgerError::Validation(format!(
                    "editor {} is already registered; public keys are immutable",
                    payload.editor_id
                )));
            }
            if projections.editor_by_username(&payload.username).is_some() {
                return Err(LedgerError::Validation(format!(
                    "username '{}' is already taken",
                    payload.username
                )));
            }
            if let Some(existing) = projections.editor_by_public_key(&payload.public_key) {
                return Err(LedgerError::Validation(format!(
                    "public key is already registered to editor {}",
                    existing.editor_id
                )));
            }

            if !projections.has_editors() {
                if payload.registered_by.is_some() {
                    return Err(LedgerError::Validation(
                        "genesis editor must not set registered_by".to_string(),
                    ));
                }
                // Genesis signs their own registration.
                if !key_matches(registering_private_key, &payload.public_key) {
                    return Err(LedgerError::Unauthorized(
                        "genesis private key does not match the registered public key"
                            .to_string(),
                    ));
                }
                payload.editor_id
            } else {
                let admin_id = payload.registered_by.ok_or_else(|| {
                    LedgerError::Validation(
                        "non-genesis editors must set registered_by".to_string(),
                    )
                })?;
                drop(projections);
                self.authorize_editor(
                    admin_id,
                    registering_private_key,
                    Some(EditorRole::Admin),
                )?;
                admin_id
            }
        };

        self.submit(
            EventType::EditorRegistered,
            None,
            to_payload_value(&payload)?,
            signing_editor_id,
            registering_private_key,
        )
    }

    /// Deactivate an editor. Permanent; historical signatures stay valid.
    pub fn deactivate_editor(
        &self,
        payload: DeactivateEditor,
        admin_private_key: &str,
    ) -> LedgerResult<AppendReceipt> {
        payload.validate()?;
        {
            let projections = self.projections.read();
            let target = projections
                .editor(payload.editor_id)
                .ok_or_else(|| {
                    LedgerError::UnknownEntity(format!("editor {}", payload.editor_id))
                })?;
            if !target.is_active {
                return Err(LedgerError::Validation(format!(
                    "editor {} is already deactivated",
                    payload.editor_id
                )));
            }
            if payload.editor_id == payload.deactivated_by
                && projections.active_admin_count() <= 1
            {
                return Err(LedgerError::Validation(
                    "cannot deactivate the only active admin; register another admin first"
                        .to_string(),
                ));
            }
        }
        self.authorize_editor(
            payload.deactivated_by,
            admin_private_key,
            Some(EditorRole::Admin),
        )?;
        self.submit(
            EventType::EditorDeactivated,
            None,
            to_payload_value(&payload)?,
            payload.deactivated_by,
            admin_private_key,
        )
    }

    // ================================================================
    // Integrity
    // ================================================================

    /// Full-scan chain verification. On success the cached last known good
    /// sequence is advanced; on failure the ledger is poisoned and every
    /// further write fails with `LedgerCorruption`.
    pub fn verify_chain(&self) -> LedgerResult<ChainVerdict> {
        self.verify_chain_cancellable(&AtomicBool::new(false))
    }

    pub fn verify_chain_cancellable(&self, cancel: &AtomicBool) -> LedgerResult<ChainVerdict> {
        match self.store.verify_chain(cancel)? {
            ChainVerdict::Valid => {
                let head = self.store.head()?;
                *self.last_known_good.lock() = head.last_sequence;
                Ok(ChainVerdict::Valid)
            }
            ChainVerdict::Cancelled => Ok(ChainVerdict::Cancelled),
            ChainVerdict::BrokenAt(sequence) => {
                self.poisoned.store(true, Ordering::SeqCst);
                *self.corrupted_at.lock() = Some(sequence);
                tracing::error!(
                    sequence,
                    "chain verification failed; suspending writes until operator recovery"
                );
                Err(LedgerError::LedgerCorruption(sequence))
            }
        }
    }

    // ================================================================
    // Internals
    // ================================================================

    fn authorize_editor(
        &self,
        editor_id: Uuid,
        private_key: &str,
        required_role: Option<EditorRole>,
    ) -> LedgerResult<EditorProjection> {
        let projections = self.projections.read();
        let editor = projections.editor(editor_id).ok_or_else(|| {
            LedgerError::Unauthorized(format!(
                "editor {editor_id} is not registered; editors must be registered before acting"
            ))
        })?;
        if !editor.is_active {
            return Err(LedgerError::Unauthorized(format!(
                "editor {} ({}) is deactivated",
                editor_id, editor.username
            )));
        }
        if let Some(role) = required_role {
            if editor.role != role {
                return Err(LedgerError::Unauthorized(format!(
                    "editor {} does not hold the required role",
                    editor_id
                )));
            }
        }
        // Verify against our own record of the key, never a caller-supplied
        // one; a substituted key must not be able to impersonate an editor.
        if !key_matches(private_key, &editor.public_key) {
            return Err(LedgerError::Unauthorized(format!(
                "private key does not match the registered public key of editor {editor_id}"
            )));
        }
        Ok(editor.clone())
    }

    fn submit(
        &self,
        event_type: EventType,
        claim_id: Option<Uuid>,
        payload: Value,
        editor_id: Uuid,
        private_key: &str,
    ) -> LedgerResult<AppendReceipt> {
        if self.poisoned.load(Ordering::SeqCst) {
            let sequence = self.corrupted_at.lock().unwrap_or(0);
            return Err(LedgerError::LedgerCorruption(sequence));
        }

        let mut attempt = 0;
        loop {
            let head = self.store.head()?;
            let previous = head.last_event_hash.clone();
            let event_hash = hash_event_payload(&payload, previous.as_deref())?;
            let editor_signature = sign_event_hash(private_key, &event_hash)?;
            let event = LedgerEvent {
                event_id: Uuid::new_v4(),
                sequence_number: head.next_sequence(),
                event_type,
                claim_id,
                payload: payload.clone(),
                previous_event_hash: previous,
                event_hash,
                created_by: editor_id,
                created_at: crate::event::now_utc_micros(),
                editor_signature,
            };

            match self.store.append(event) {
                Ok(stored) => {
                    // Synchronous projection update: a client that just
                    // appended event N immediately observes its effect.
                    self.projections.write().apply(&stored)?;
                    tracing::info!(
                        sequence = stored.sequence_number,
                        event_type = %stored.event_type,
                        event_id = %stored.event_id,
                        "event appended"
                    );
                    return Ok(AppendReceipt {
                        event_id: stored.event_id,
                        event_hash: stored.event_hash,
                        sequence_number: stored.sequence_number,
                    });
                }
                Err(LedgerError::HashChainBroken(reason)) => {
                    attempt += 1;
                    if attempt >= APPEND_RETRIES {
                        return Err(LedgerError::HashChainBroken(reason));
                    }
                    tracing::debug!(attempt, "append lost the tail race; retrying");
                }
                Err(LedgerError::DuplicateEventId(id)) => {
                    attempt += 1;
                    if attempt >= APPEND_RETRIES {
                        return Err(LedgerError::DuplicateEventId(id));
                    }
                    // A fresh id is generated on the next iteration.
                }
                Err(other) => return Err(other),
            }
        }
    }
}

fn unknown_claim(claim_id: Uuid) -> LedgerError {
    LedgerError::UnknownEntity(format!("claim {claim_id}"))
}

fn to_payload_value<T: Serialize>(payload: &T) -> LedgerResult<Value> {
    serde_json::to_value(payload)
        .map_err(|err| LedgerError::Validation(format!("payload serialization failed: {err}")))
}
