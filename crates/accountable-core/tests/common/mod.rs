// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the integration tests.

// Each integration test crate compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use accountable_core::ledger::LedgerService;
use accountable_core::payloads::{
    AddEvidence, ClaimScope, ClaimType, DeclareClaim, DirectionOfChange, EditorRole,
    OperationalizeClaim, RegisterEditor, Resolution, ResolveClaim, SCHEMA_VERSION,
};
use accountable_core::signing::{Keypair, SystemKeys};
use accountable_core::store::{EventStore, InMemoryEventStore};

pub struct TestEditor {
    pub editor_id: Uuid,
    pub keys: Keypair,
}

pub fn new_ledger() -> LedgerService {
    ledger_over(Arc::new(InMemoryEventStore::new()))
}

pub fn ledger_over(store: Arc<dyn EventStore>) -> LedgerService {
    LedgerService::load(store, SystemKeys::from_keypair(Keypair::generate()))
        .expect("load ledger")
}

pub fn register_genesis(ledger: &LedgerService, username: &str) -> TestEditor {
    let keys = Keypair::generate();
    let editor_id = Uuid::new_v4();
    ledger
        .register_editor(
            RegisterEditor {
                editor_id,
                username: username.to_string(),
                display_name: "Genesis Editor".to_string(),
                role: EditorRole::Admin,
                public_key: keys.public_key.clone(),
                registered_by: None,
                registration_rationale: "founding editor of this ledger".to_string(),
                schema_version: SCHEMA_VERSION,
            },
            &keys.private_key,
        )
        .expect("register genesis editor");
    TestEditor { editor_id, keys }
}

pub fn declare_payload(claim_id: Uuid) -> DeclareClaim {
    DeclareClaim {
        claim_id,
        statement: "Median rent will fall".to_string(),
        statement_context: Some("Press conference on the housing bill".to_string()),
        source_url: "https://example.gov/press/ab1234".to_string(),
        claim_type: ClaimType::Predictive,
        scope: ClaimScope {
            geographic: "California".to_string(),
            policy_domain: "housing".to_string(),
            affected_population: "renters".to_string(),
        },
        schema_version: SCHEMA_VERSION,
    }
}

pub fn operationalize_payload(claim_id: Uuid) -> OperationalizeClaim {
    OperationalizeClaim {
        claim_id,
        outcome_description: "Median rent declines over the evaluation window".to_string(),
        metrics: vec!["median_rent_usd".to_string()],
        direction_of_change: DirectionOfChange::Decrease,
        start_date: "2024-01-01".to_string(),
        evaluation_date: "2025-01-01".to_string(),
        tolerance_window_days: 30,
        success_conditions: vec!["median_rent_usd <= 2125".to_string()],
        partial_conditions: None,
        failure_conditions: None,
        operationalization_notes: None,
        schema_version: SCHEMA_VERSION,
    }
}

pub fn evidence_payload(evidence_id: Uuid, claim_id: Uuid, supports: bool) -> AddEvidence {
    AddEvidence {
        evidence_id,
        claim_id,
        source_url: "https://example.org/rent-index".to_string(),
        source_title: "Rent index, fourth quarter".to_string(),
        source_publisher: Some("Example Statistical Office".to_string()),
        source_date: Some("2024-12-20".to_string()),
        source_type: "dataset".to_string(),
        evidence_type: "statistical".to_string(),
        summary: "The quarterly rent index shows an eight percent decline".to_string(),
        supports_claim: supports,
        confidence_score: Some("0.8".to_string()),
        schema_version: SCHEMA_VERSION,
    }
}

pub fn resolve_payload(claim_id: Uuid, evidence_ids: Vec<Uuid>) -> ResolveClaim {
    ResolveClaim {
        claim_id,
        resolution: Resolution::Met,
        resolution_summary: "Rent fell as the operationalized metric required".to_string(),
        supporting_evidence_ids: evidence_ids,
        resolution_details: None,
        schema_version: SCHEMA_VERSION,
    }
}
