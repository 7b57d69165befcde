// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tamper detection: a doctored payload must fail chain verification at its
//! sequence, poison the ledger against further writes, and turn the claim's
//! bundle TAMPERED.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use accountable_core::error::LedgerError;
use accountable_core::event::LedgerEvent;
use accountable_core::store::{
    verify_event_chain, ChainHead, ChainVerdict, EventStore, InMemoryEventStore,
};

use common::{
    declare_payload, evidence_payload, ledger_over, operationalize_payload, register_genesis,
    resolve_payload,
};

/// Wraps a real store and, once armed, doctors the payload of one sequence
/// in everything it returns. Simulates hostile storage below the ledger.
struct TamperingStore {
    inner: InMemoryEventStore,
    armed: AtomicBool,
    target_sequence: u64,
}

impl TamperingStore {
    fn new(target_sequence: u64) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            armed: AtomicBool::new(false),
            target_sequence,
        }
    }

    fn doctor(&self, mut event: LedgerEvent) -> LedgerEvent {
        if self.armed.load(Ordering::SeqCst) && event.sequence_number == self.target_sequence {
            event.payload["summary"] = json!("a quietly rewritten summary");
        }
        event
    }
}

impl EventStore for TamperingStore {
    fn append(&self, event: LedgerEvent) -> Result<LedgerEvent, LedgerError> {
        self.inner.append(event)
    }

    fn get(&self, event_id: Uuid) -> Result<Option<LedgerEvent>, LedgerError> {
        Ok(self.inner.get(event_id)?.map(|e| self.doctor(e)))
    }

    fn get_by_sequence(&self, sequence: u64) -> Result<Option<LedgerEvent>, LedgerError> {
        Ok(self.inner.get_by_sequence(sequence)?.map(|e| self.doctor(e)))
    }

    fn range(&self, start: u64, end: u64) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(self
            .inner
            .range(start, end)?
            .into_iter()
            .map(|e| self.doctor(e))
            .collect())
    }

    fn head(&self) -> Result<ChainHead, LedgerError> {
        self.inner.head()
    }

    fn tail(&self) -> Result<Option<LedgerEvent>, LedgerError> {
        Ok(self.inner.tail()?.map(|e| self.doctor(e)))
    }

    fn count(&self) -> Result<u64, LedgerError> {
        self.inner.count()
    }

    fn list_all(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(self
            .inner
            .list_all()?
            .into_iter()
            .map(|e| self.doctor(e))
            .collect())
    }

    fn list_for_claim(&self, claim_id: Uuid) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(self
            .inner
            .list_for_claim(claim_id)?
            .into_iter()
            .map(|e| self.doctor(e))
            .collect())
    }
}

fn run_lifecycle(ledger: &accountable_core::ledger::LedgerService) -> Uuid {
    let editor = register_genesis(ledger, "editor-one");
    let claim_id = Uuid::new_v4();
    let evidence_id = Uuid::new_v4();
    ledger
        .declare_claim(declare_payload(claim_id), editor.editor_id, &editor.keys.private_key)
        .expect("declare");
    ledger
        .operationalize_claim(
            operationalize_payload(claim_id),
            editor.editor_id,
            &editor.keys.private_key,
        )
        .expect("operationalize");
    ledger
        .add_evidence(
            evidence_payload(evidence_id, claim_id, true),
            editor.editor_id,
            &editor.keys.private_key,
        )
        .expect("evidence");
    ledger
        .resolve_claim(
            resolve_payload(claim_id, vec![evidence_id]),
            editor.editor_id,
            &editor.keys.private_key,
        )
        .expect("resolve");
    claim_id
}

#[test]
fn mutated_payload_breaks_verification_at_its_sequence() {
    let store = Arc::new(TamperingStore::new(3));
    let ledger = ledger_over(store.clone());
    run_lifecycle(&ledger);

    assert_eq!(ledger.verify_chain().expect("clean verify"), ChainVerdict::Valid);

    store.armed.store(true, Ordering::SeqCst);
    match ledger.verify_chain() {
        Err(LedgerError::LedgerCorruption(sequence)) => assert_eq!(sequence, 3),
        other => panic!("expected corruption at sequence 3, got {other:?}"),
    }

    // The ledger refuses further writes until an operator intervenes.
    assert!(ledger.is_write_suspended());
    let editor_keys = accountable_core::signing::Keypair::generate();
    assert!(matches!(
        ledger.declare_claim(declare_payload(Uuid::new_v4()), Uuid::new_v4(), &editor_keys.private_key),
        Err(LedgerError::LedgerCorruption(_))
    ));

    let status = ledger.integrity_status().expect("status");
    assert!(!status.ledger_integrity_valid);

    // Repairing the storage and acknowledging recovery resumes writes.
    store.armed.store(false, Ordering::SeqCst);
    ledger.mark_recovered().expect("recover");
    assert!(!ledger.is_write_suspended());
}

#[test]
fn bundle_of_a_tampered_claim_is_tampered() {
    let store = Arc::new(TamperingStore::new(3));
    let ledger = ledger_over(store.clone());
    let claim_id = run_lifecycle(&ledger);

    let clean = ledger.export_bundle(claim_id).expect("bundle");
    let clean_json: serde_json::Value =
        serde_json::from_str(&clean.to_json().expect("json")).expect("parse");
    let report = accountable_verifier::verify_bundle(&clean_json);
    assert_eq!(report.verdict, accountable_verifier::BundleVerdict::Verified);

    store.armed.store(true, Ordering::SeqCst);
    let doctored = ledger.export_bundle(claim_id).expect("bundle");
    let doctored_json: serde_json::Value =
        serde_json::from_str(&doctored.to_json().expect("json")).expect("parse");
    let report = accountable_verifier::verify_bundle(&doctored_json);
    assert_eq!(report.verdict, accountable_verifier::BundleVerdict::Tampered);
}

#[test]
fn direct_event_list_verification_pinpoints_the_sequence() {
    let ledger = ledger_over(Arc::new(InMemoryEventStore::new()));
    run_lifecycle(&ledger);

    let cancel = AtomicBool::new(false);
    let mut events = ledger.store().list_all().expect("list");
    assert_eq!(verify_event_chain(&events, &cancel), ChainVerdict::Valid);

    events[2].payload["outcome_description"] = json!("a different outcome");
    assert_eq!(verify_event_chain(&events, &cancel), ChainVerdict::BrokenAt(2));
}
