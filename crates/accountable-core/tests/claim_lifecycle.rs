// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end claim lifecycle against the in-memory backend.

mod common;

use uuid::Uuid;

use accountable_core::error::LedgerError;
use accountable_core::payloads::{EditorRole, RegisterEditor, SCHEMA_VERSION};
use accountable_core::projection::ClaimStatus;
use accountable_core::query::ClaimFilter;
use accountable_core::signing::Keypair;
use accountable_core::store::{ChainVerdict, EventStore as _};

use common::{
    declare_payload, evidence_payload, new_ledger, operationalize_payload, register_genesis,
    resolve_payload,
};

#[test]
fn happy_path_from_declaration_to_resolution() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");

    let claim_id = Uuid::new_v4();
    let evidence_id = Uuid::new_v4();

    let declared = ledger
        .declare_claim(declare_payload(claim_id), editor.editor_id, &editor.keys.private_key)
        .expect("declare");
    let operationalized = ledger
        .operationalize_claim(
            operationalize_payload(claim_id),
            editor.editor_id,
            &editor.keys.private_key,
        )
        .expect("operationalize");
    let evidenced = ledger
        .add_evidence(
            evidence_payload(evidence_id, claim_id, true),
            editor.editor_id,
            &editor.keys.private_key,
        )
        .expect("evidence");
    let resolved = ledger
        .resolve_claim(
            resolve_payload(claim_id, vec![evidence_id]),
            editor.editor_id,
            &editor.keys.private_key,
        )
        .expect("resolve");

    // Five events with sequence 0..4 (the genesis editor registration is 0).
    assert_eq!(declared.sequence_number, 1);
    assert_eq!(operationalized.sequence_number, 2);
    assert_eq!(evidenced.sequence_number, 3);
    assert_eq!(resolved.sequence_number, 4);
    assert_eq!(ledger.store().count().expect("count"), 5);

    let claim = ledger
        .with_projections(|p| p.claim(claim_id).cloned())
        .expect("claim projection");
    assert_eq!(claim.status, ClaimStatus::Resolved);
    assert_eq!(claim.evidence_count, 1);
    assert_eq!(claim.supporting_evidence_count, 1);

    assert_eq!(ledger.verify_chain().expect("verify"), ChainVerdict::Valid);
    assert_eq!(ledger.last_known_good_sequence(), Some(4));

    let status = ledger.integrity_status().expect("integrity");
    assert!(status.ledger_integrity_valid);
    assert_eq!(status.event_count, 5);
    assert_eq!(status.last_event_hash.as_deref(), Some(resolved.event_hash.as_str()));
}

#[test]
fn resolving_a_declared_claim_is_an_illegal_transition() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");
    let claim_id = Uuid::new_v4();

    ledger
        .declare_claim(declare_payload(claim_id), editor.editor_id, &editor.keys.private_key)
        .expect("declare");
    let before = ledger.store().count().expect("count");

    let result = ledger.resolve_claim(
        resolve_payload(claim_id, vec![Uuid::new_v4()]),
        editor.editor_id,
        &editor.keys.private_key,
    );
    assert!(matches!(result, Err(LedgerError::IllegalTransition(_))));

    // No event appended; sequence unchanged.
    assert_eq!(ledger.store().count().expect("count"), before);
}

#[test]
fn resolution_is_terminal() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");
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

    assert!(matches!(
        ledger.resolve_claim(
            resolve_payload(claim_id, vec![evidence_id]),
            editor.editor_id,
            &editor.keys.private_key,
        ),
        Err(LedgerError::IllegalTransition(_))
    ));
    assert!(matches!(
        ledger.add_evidence(
            evidence_payload(Uuid::new_v4(), claim_id, false),
            editor.editor_id,
            &editor.keys.private_key,
        ),
        Err(LedgerError::IllegalTransition(_))
    ));
}

#[test]
fn operationalizing_twice_is_rejected() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");
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

    assert!(matches!(
        ledger.operationalize_claim(
            operationalize_payload(claim_id),
            editor.editor_id,
            &editor.keys.private_key,
        ),
        Err(LedgerError::IllegalTransition(_))
    ));
}

#[test]
fn unknown_claims_and_editors_are_rejected() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");

    assert!(matches!(
        ledger.operationalize_claim(
            operationalize_payload(Uuid::new_v4()),
            editor.editor_id,
            &editor.keys.private_key,
        ),
        Err(LedgerError::UnknownEntity(_))
    ));

    let stranger = Keypair::generate();
    assert!(matches!(
        ledger.declare_claim(
            declare_payload(Uuid::new_v4()),
            Uuid::new_v4(),
            &stranger.private_key,
        ),
        Err(LedgerError::Unauthorized(_))
    ));
}

#[test]
fn wrong_private_key_cannot_impersonate_an_editor() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");
    let imposter = Keypair::generate();

    assert!(matches!(
        ledger.declare_claim(
            declare_payload(Uuid::new_v4()),
            editor.editor_id,
            &imposter.private_key,
        ),
        Err(LedgerError::Unauthorized(_))
    ));
}

#[test]
fn resolution_must_reference_attached_evidence() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");
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

    // References evidence that was never attached to this claim.
    assert!(matches!(
        ledger.resolve_claim(
            resolve_payload(claim_id, vec![Uuid::new_v4()]),
            editor.editor_id,
            &editor.keys.private_key,
        ),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn deactivated_editors_cannot_act_and_duplicate_keys_are_rejected() {
    let ledger = new_ledger();
    let admin = register_genesis(&ledger, "admin-one");

    // A second editor registered by the admin.
    let second_keys = Keypair::generate();
    let second_id = Uuid::new_v4();
    ledger
        .register_editor(
            RegisterEditor {
                editor_id: second_id,
                username: "editor-two".to_string(),
                display_name: "Second Editor".to_string(),
                role: EditorRole::Editor,
                public_key: second_keys.public_key.clone(),
                registered_by: Some(admin.editor_id),
                registration_rationale: "additional editorial capacity".to_string(),
                schema_version: SCHEMA_VERSION,
            },
            &admin.keys.private_key,
        )
        .expect("register second");

    // Re-registering the same public key under a new id is rejected.
    assert!(matches!(
        ledger.register_editor(
            RegisterEditor {
                editor_id: Uuid::new_v4(),
                username: "editor-three".to_string(),
                display_name: "Third Editor".to_string(),
                role: EditorRole::Editor,
                public_key: second_keys.public_key.clone(),
                registered_by: Some(admin.editor_id),
                registration_rationale: "attempted key reuse case".to_string(),
                schema_version: SCHEMA_VERSION,
            },
            &admin.keys.private_key,
        ),
        Err(LedgerError::Validation(_))
    ));

    ledger
        .deactivate_editor(
            accountable_core::payloads::DeactivateEditor {
                editor_id: second_id,
                deactivated_by: admin.editor_id,
                reason: "credential rotation for this editor".to_string(),
                schema_version: SCHEMA_VERSION,
            },
            &admin.keys.private_key,
        )
        .expect("deactivate");

    assert!(matches!(
        ledger.declare_claim(
            declare_payload(Uuid::new_v4()),
            second_id,
            &second_keys.private_key,
        ),
        Err(LedgerError::Unauthorized(_))
    ));

    // The record and its key survive deactivation.
    let editor = ledger.get_editor(second_id).expect("projection");
    assert!(!editor.is_active);
    assert_eq!(editor.public_key, second_keys.public_key);

    // The only active admin cannot deactivate themselves.
    assert!(matches!(
        ledger.deactivate_editor(
            accountable_core::payloads::DeactivateEditor {
                editor_id: admin.editor_id,
                deactivated_by: admin.editor_id,
                reason: "attempting to lock the ledger".to_string(),
                schema_version: SCHEMA_VERSION,
            },
            &admin.keys.private_key,
        ),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn queries_reflect_appends_immediately() {
    let ledger = new_ledger();
    let editor = register_genesis(&ledger, "editor-one");
    let claim_id = Uuid::new_v4();

    ledger
        .declare_claim(declare_payload(claim_id), editor.editor_id, &editor.keys.private_key)
        .expect("declare");

    let listed = ledger.list_claims(&ClaimFilter {
        status: Some(ClaimStatus::Declared),
        ..ClaimFilter::default()
    });
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].claim_id, claim_id);

    let detail = ledger.claim_detail(claim_id).expect("detail");
    assert_eq!(detail.timeline.len(), 1);
    assert_eq!(detail.claim.status, ClaimStatus::Declared);

    let report = accountable_core::report::render_claim_report(&detail);
    assert!(report.contains("Median rent will fall"));
    assert!(report.contains("not authoritative"));
}
