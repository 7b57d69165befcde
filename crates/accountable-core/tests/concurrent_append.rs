// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Concurrency: one logical appender, many racing callers.

mod common;

use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use accountable_core::error::LedgerError;
use accountable_core::hash::hash_event_payload;
use accountable_core::ledger::LedgerService;
use accountable_core::store::{ChainVerdict, EventStore, InMemoryEventStore};

use common::{declare_payload, new_ledger, register_genesis};

mod fixtures {
    use accountable_core::event::{LedgerEvent, EventType};
    use serde_json::json;
    use uuid::Uuid;

    use super::hash_event_payload;

    pub fn raw_event(sequence: u64, previous: Option<&str>, label: &str) -> LedgerEvent {
        let payload = json!({"note": label});
        let event_hash = hash_event_payload(&payload, previous).expect("hash");
        LedgerEvent {
            event_id: Uuid::new_v4(),
            sequence_number: sequence,
            event_type: EventType::EditorRegistered,
            claim_id: None,
            payload,
            previous_event_hash: previous.map(str::to_string),
            event_hash,
            created_by: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            editor_signature: "c2ln".to_string(),
        }
    }
}

/// Two commands race on the same tail: both read the same previous hash, one
/// wins, the loser sees HashChainBroken, rebuilds against the new tail and
/// succeeds. Both land exactly once and the sequence stays contiguous.
#[test]
fn losing_append_retries_against_the_new_tail() {
    let store = InMemoryEventStore::new();
    let genesis = store
        .append(fixtures::raw_event(0, None, "genesis"))
        .expect("genesis");

    // Both contenders observe the same head.
    let first = fixtures::raw_event(1, Some(&genesis.event_hash), "first contender");
    let second = fixtures::raw_event(1, Some(&genesis.event_hash), "second contender");

    let winner = store.append(first).expect("winner");
    let error = store.append(second.clone()).expect_err("loser must fail");
    assert!(matches!(error, LedgerError::HashChainBroken(_)));

    // The loser rebuilds against the fresh tail and succeeds.
    let retried = fixtures::raw_event(2, Some(&winner.event_hash), "second contender");
    store.append(retried).expect("retry succeeds");

    let events = store.list_all().expect("list");
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence_number).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

#[test]
fn racing_service_commands_all_land_exactly_once() {
    let ledger = Arc::new(new_ledger());
    let editor = Arc::new(register_genesis(&ledger, "editor-one"));

    const WRITERS: usize = 8;
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let ledger: Arc<LedgerService> = Arc::clone(&ledger);
        let editor = Arc::clone(&editor);
        handles.push(thread::spawn(move || {
            let claim_id = Uuid::new_v4();
            // The service retries contention internally up to its limit;
            // a caller that still sees HashChainBroken may simply resubmit.
            loop {
                match ledger.declare_claim(
                    declare_payload(claim_id),
                    editor.editor_id,
                    &editor.keys.private_key,
                ) {
                    Ok(receipt) => return Ok(receipt.sequence_number),
                    Err(LedgerError::HashChainBroken(_)) => continue,
                    Err(other) => return Err(other),
                }
            }
        }));
    }

    let mut sequences: Vec<u64> = handles
        .into_iter()
        .map(|h| h.join().expect("join").expect("declare"))
        .collect();
    sequences.sort_unstable();

    // Genesis registration holds sequence 0; the writers fill 1..=WRITERS
    // gap-free, each exactly once.
    assert_eq!(sequences, (1..=WRITERS as u64).collect::<Vec<_>>());
    assert_eq!(ledger.store().count().expect("count"), WRITERS as u64 + 1);
    assert_eq!(ledger.verify_chain().expect("verify"), ChainVerdict::Valid);
}

#[test]
fn projections_are_visible_to_the_writer_immediately() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");
    let claim_id = Uuid::new_v4();

    let receipt = ledger
        .declare_claim(declare_payload(claim_id), editor.editor_id, &editor.keys.private_key)
        .expect("declare");

    // A client that just appended event N observes N's effect right away.
    let claim = ledger
        .with_projections(|p| p.claim(claim_id).cloned())
        .expect("projection present");
    assert_eq!(claim.last_event_sequence, receipt.sequence_number);
    assert_eq!(claim.last_event_hash, receipt.event_hash);
}
