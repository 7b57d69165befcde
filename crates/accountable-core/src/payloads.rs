// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed command payloads and their schema validation.
//!
//! The core enforces required fields and value ranges; it takes no view on
//! what claims mean. Optional fields skip serialization when absent, and the
//! canonicalizer drops nulls, so absent and null hash identically.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Predictive,
    Descriptive,
    Causal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionOfChange {
    Increase,
    Decrease,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Met,
    PartiallyMet,
    NotMet,
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorRole {
    Admin,
    Senior,
    Editor,
    Reviewer,
}

/// What a claim is about: where, which policy area, who is affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimScope {
    pub geographic: String,
    pub policy_domain: String,
    pub affected_population: String,
}

fn require_min_chars(field: &str, value: &str, min: usize) -> LedgerResult<()> {
    if value.chars().count() < min {
        return Err(LedgerError::Validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    Ok(())
}

fn require_non_empty_str(field: &str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_non_empty_list<T>(field: &str, values: &[T]) -> LedgerResult<()> {
    if values.is_empty() {
        return Err(LedgerError::Validation(format!(
            "{field} must contain at least one entry"
        )));
    }
    Ok(())
}

fn parse_iso_date(field: &str, value: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        LedgerError::Validation(format!("{field} must be an ISO date (YYYY-MM-DD)"))
    })
}

/// Validate a decimal string in `[0, 1]`.
///
/// Decimals never touch binary floats in the core; the check is performed on
/// the digits themselves.
fn validate_unit_decimal(field: &str, value: &str) -> LedgerResult<()> {
    let err = || {
        LedgerError::Validation(format!(
            "{field} must be a decimal string between 0 and 1"
        ))
    };
    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (value, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
    }
    let int_value = int_part.trim_start_matches('0');
    match int_value {
        "" => Ok(()),
        "1" => {
            let frac_is_zero = frac_part.map(|f| f.bytes().all(|b| b == b'0')).unwrap_or(true);
            if frac_is_zero {
                Ok(())
            } else {
                Err(err())
            }
        }
        _ => Err(err()),
    }
}

/// Payload for CLAIM_DECLARED: initial registration of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclareClaim {
    pub claim_id: Uuid,
    pub statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_context: Option<String>,
    pub source_url: String,
    pub claim_type: ClaimType,
    pub scope: ClaimScope,
    pub schema_version: u32,
}

impl DeclareClaim {
    pub fn validate(&self) -> LedgerResult<()> {
        require_min_chars("statement", &self.statement, 10)?;
        require_non_empty_str("source_url", &self.source_url)?;
        require_non_empty_str("scope.geographic", &self.scope.geographic)?;
        require_non_empty_str("scope.policy_domain", &self.scope.policy_domain)?;
        require_non_empty_str(
            "scope.affected_population",
            &self.scope.affected_population,
        )?;
        Ok(())
    }
}

/// Payload for CLAIM_OPERATIONALIZED: the mapping from a vague claim to
/// measurable conditions with timeframes. This step is interpretation, and
/// is recorded as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalizeClaim {
    pub claim_id: Uuid,
    pub outcome_description: String,
    pub metrics: Vec<String>,
    pub direction_of_change: DirectionOfChange,
    pub start_date: String,
    pub evaluation_date: String,
    pub tolerance_window_days: u32,
    pub success_conditions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_conditions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_conditions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operationalization_notes: Option<String>,
    pub schema_version: u32,
}

impl OperationalizeClaim {
    pub fn validate(&self) -> LedgerResult<()> {
        require_non_empty_str("outcome_description", &self.outcome_description)?;
        require_non_empty_list("metrics", &self.metrics)?;
        for metric in &self.metrics {
            require_non_empty_str("metrics entry", metric)?;
        }
        require_non_empty_list("success_conditions", &self.success_conditions)?;
        for condition in &self.success_conditions {
            require_non_empty_str("success_conditions entry", condition)?;
        }
        let start = parse_iso_date("start_date", &self.start_date)?;
        let evaluation = parse_iso_date("evaluation_date", &self.evaluation_date)?;
        if evaluation < start {
            return Err(LedgerError::Validation(
                "evaluation_date must not precede start_date".to_string(),
            ));
        }
        Ok(())
    }
}

/// Payload for EVIDENCE_ADDED. Evidence can support or contradict a claim;
/// conflicting evidence is allowed and expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddEvidence {
    pub evidence_id: Uuid,
    pub claim_id: Uuid,
    pub source_url: String,
    pub source_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_date: Option<String>,
    pub source_type: String,
    pub evidence_type: String,
    pub summary: String,
    pub supports_claim: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<String>,
    pub schema_version: u32,
}

impl AddEvidence {
    pub fn validate(&self) -> LedgerResult<()> {
        require_non_empty_str("source_url", &self.source_url)?;
        require_non_empty_str("source_title", &self.source_title)?;
        require_non_empty_str("source_type", &self.source_type)?;
        require_non_empty_str("evidence_type", &self.evidence_type)?;
        require_non_empty_str("summary", &self.summary)?;
        if let Some(date) = &self.source_date {
            parse_iso_date("source_date", date)?;
        }
        if let Some(score) = &self.confidence_score {
            validate_unit_decimal("confidence_score", score)?;
        }
        Ok(())
    }
}

/// Payload for CLAIM_RESOLVED: final determination. Resolution is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveClaim {
    pub claim_id: Uuid,
    pub resolution: Resolution,
    pub resolution_summary: String,
    pub supporting_evidence_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_details: Option<String>,
    pub schema_version: u32,
}

impl ResolveClaim {
    pub fn validate(&self) -> LedgerResult<()> {
        require_min_chars("resolution_summary", &self.resolution_summary, 20)?;
        if self.resolution != Resolution::Inconclusive {
            require_non_empty_list("supporting_evidence_ids", &self.supporting_evidence_ids)?;
        }
        Ok(())
    }
}

/// Payload for EDITOR_REGISTERED. Anchors the editor's public key immutably;
/// the first editor (genesis) signs their own registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterEditor {
    pub editor_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: EditorRole,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_by: Option<Uuid>,
    pub registration_rationale: String,
    pub schema_version: u32,
}

impl RegisterEditor {
    pub fn validate(&self) -> LedgerResult<()> {
        require_min_chars("username", &self.username, 3)?;
        require_non_empty_str("display_name", &self.display_name)?;
        require_non_empty_str("public_key", &self.public_key)?;
        require_min_chars("registration_rationale", &self.registration_rationale, 10)?;
        Ok(())
    }
}

/// Payload for EDITOR_DEACTIVATED. Permanent; past signatures remain valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeactivateEditor {
    pub editor_id: Uuid,
    pub deactivated_by: Uuid,
    pub reason: String,
    pub schema_version: u32,
}

impl DeactivateEditor {
    pub fn validate(&self) -> LedgerResult<()> {
        require_min_chars("reason", &self.reason, 10)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare() -> DeclareClaim {
        DeclareClaim {
            claim_id: Uuid::new_v4(),
            statement: "Median rent will fall".to_string(),
            statement_context: None,
            source_url: "https://example.gov/press/1".to_string(),
            claim_type: ClaimType::Predictive,
            scope: ClaimScope {
                geographic: "California".to_string(),
                policy_domain: "housing".to_string(),
                affected_population: "renters".to_string(),
            },
            schema_version: SCHEMA_VERSION,
        }
    }

    #[test]
    fn declare_requires_minimum_statement_length() {
        let mut payload = declare();
        assert!(payload.validate().is_ok());
        payload.statement = "too short".to_string();
        assert!(matches!(
            payload.validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn operationalize_rejects_inverted_dates_and_empty_lists() {
        let mut payload = OperationalizeClaim {
            claim_id: Uuid::new_v4(),
            outcome_description: "median rent declines".to_string(),
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
        };
        assert!(payload.validate().is_ok());

        payload.evaluation_date = "2023-01-01".to_string();
        assert!(payload.validate().is_err());
        payload.evaluation_date = "2025-01-01".to_string();

        payload.metrics.clear();
        assert!(payload.validate().is_err());
        payload.metrics = vec!["median_rent_usd".to_string()];

        payload.success_conditions.clear();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn confidence_score_bounds() {
        for ok in ["0", "0.8", "1", "1.0", "0.999999", "1.000"] {
            assert!(
                validate_unit_decimal("confidence_score", ok).is_ok(),
                "expected {ok} to be accepted"
            );
        }
        for bad in ["1.1", "2", "-0.5", "0.8.1", ".5", "0.", "abc", "1e-3", ""] {
            assert!(
                validate_unit_decimal("confidence_score", bad).is_err(),
                "expected {bad} to be rejected"
            );
        }
    }

    #[test]
    fn resolution_requires_evidence_unless_inconclusive() {
        let mut payload = ResolveClaim {
            claim_id: Uuid::new_v4(),
            resolution: Resolution::Met,
            resolution_summary: "Rent data shows the predicted decline".to_string(),
            supporting_evidence_ids: vec![],
            resolution_details: None,
            schema_version: SCHEMA_VERSION,
        };
        assert!(payload.validate().is_err());

        payload.supporting_evidence_ids = vec![Uuid::new_v4()];
        assert!(payload.validate().is_ok());

        payload.supporting_evidence_ids.clear();
        payload.resolution = Resolution::Inconclusive;
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn resolution_summary_minimum_length() {
        let payload = ResolveClaim {
            claim_id: Uuid::new_v4(),
            resolution: Resolution::Inconclusive,
            resolution_summary: "too short".to_string(),
            supporting_evidence_ids: vec![],
            resolution_details: None,
            schema_version: SCHEMA_VERSION,
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn absent_optionals_are_skipped_in_serialization() {
        let value = serde_json::to_value(declare()).expect("json");
        assert!(value.get("statement_context").is_none());
        assert_eq!(value["claim_type"], "predictive");
    }

    #[test]
    fn enums_use_snake_case_wire_values() {
        assert_eq!(
            serde_json::to_value(DirectionOfChange::NoChange).expect("json"),
            "no_change"
        );
        assert_eq!(
            serde_json::to_value(Resolution::PartiallyMet).expect("json"),
            "partially_met"
        );
        assert_eq!(serde_json::to_value(EditorRole::Admin).expect("json"), "admin");
    }
}
