// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rebuild: truncating projections and replaying the event stream must
//! reproduce identical rows, in memory and in the SQLite cache tables.

mod common;

use std::sync::Arc;

use uuid::Uuid;

use accountable_core::projection::ProjectionState;
use accountable_core::store::EventStore;
use accountable_core::store_sqlite::SqliteEventStore;

use common::{
    declare_payload, evidence_payload, ledger_over, operationalize_payload, register_genesis,
    resolve_payload,
};

fn populate(ledger: &accountable_core::ledger::LedgerService) {
    let editor = register_genesis(ledger, "editor-one");
    for i in 0..3 {
        let claim_id = Uuid::new_v4();
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
        let evidence_id = Uuid::new_v4();
        ledger
            .add_evidence(
                evidence_payload(evidence_id, claim_id, i % 2 == 0),
                editor.editor_id,
                &editor.keys.private_key,
            )
            .expect("evidence");
        if i == 0 {
            ledger
                .resolve_claim(
                    resolve_payload(claim_id, vec![evidence_id]),
                    editor.editor_id,
                    &editor.keys.private_key,
                )
                .expect("resolve");
        }
    }
}

#[test]
fn replay_reproduces_identical_projection_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteEventStore::open(dir.path().join("ledger.db")).expect("open"));
    let ledger = ledger_over(store.clone());
    populate(&ledger);

    let snapshot = ledger.with_projections(|p| p.clone());

    let mut rebuilt = ProjectionState::new();
    rebuilt
        .rebuild(&store.list_all().expect("list"))
        .expect("rebuild");
    assert_eq!(rebuilt, snapshot);
    assert_eq!(
        rebuilt.last_processed_sequence(),
        snapshot.last_processed_sequence()
    );
}

#[test]
fn persisted_projection_rows_match_after_truncate_and_replay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteEventStore::open(dir.path().join("ledger.db")).expect("open"));
    let ledger = ledger_over(store.clone());
    populate(&ledger);

    let state = ledger.with_projections(|p| p.clone());
    store.persist_projections(&state).expect("persist");
    let before = store.projection_fingerprint().expect("fingerprint");

    // Truncate and replay from sequence 0.
    let mut rebuilt = ProjectionState::new();
    rebuilt
        .rebuild(&store.list_all().expect("list"))
        .expect("rebuild");
    store.persist_projections(&rebuilt).expect("persist again");
    let after = store.projection_fingerprint().expect("fingerprint");

    assert_eq!(before, after);
    assert_eq!(
        store.last_processed_sequence().expect("metadata"),
        state.last_processed_sequence()
    );
}

#[test]
fn reopened_ledger_rebuilds_the_same_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");

    let snapshot = {
        let store = Arc::new(SqliteEventStore::open(&path).expect("open"));
        let ledger = ledger_over(store);
        populate(&ledger);
        ledger.with_projections(|p| p.clone())
    };

    let store = Arc::new(SqliteEventStore::open(&path).expect("reopen"));
    let ledger = ledger_over(store);
    let reloaded = ledger.with_projections(|p| p.clone());
    assert_eq!(reloaded, snapshot);
}
