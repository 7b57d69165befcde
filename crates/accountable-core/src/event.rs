// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! The immutable event record.
//!
//! Events are the only source of truth in the ledger. No update, no delete,
//! ever. Chain integrity rules:
//! - sequence numbers are gap-free, starting at 0
//! - `previous_event_hash` is None only for the genesis event
//! - `event_hash` is reproducible from `(payload, previous_event_hash)`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::hash::is_hex_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "EDITOR_REGISTERED")]
    EditorRegistered,
    #[serde(rename = "EDITOR_DEACTIVATED")]
    EditorDeactivated,
    #[serde(rename = "CLAIM_DECLARED")]
    ClaimDeclared,
    #[serde(rename = "CLAIM_OPERATIONALIZED")]
    ClaimOperationalized,
    #[serde(rename = "EVIDENCE_ADDED")]
    EvidenceAdded,
    #[serde(rename = "CLAIM_RESOLVED")]
    ClaimResolved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EditorRegistered => "EDITOR_REGISTERED",
            EventType::EditorDeactivated => "EDITOR_DEACTIVATED",
            EventType::ClaimDeclared => "CLAIM_DECLARED",
            EventType::ClaimOperationalized => "CLAIM_OPERATIONALIZED",
            EventType::EvidenceAdded => "EVIDENCE_ADDED",
            EventType::ClaimResolved => "CLAIM_RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EDITOR_REGISTERED" => Some(EventType::EditorRegistered),
            "EDITOR_DEACTIVATED" => Some(EventType::EditorDeactivated),
            "CLAIM_DECLARED" => Some(EventType::ClaimDeclared),
            "CLAIM_OPERATIONALIZED" => Some(EventType::ClaimOperationalized),
            "EVIDENCE_ADDED" => Some(EventType::EvidenceAdded),
            "CLAIM_RESOLVED" => Some(EventType::ClaimResolved),
            _ => None,
        }
    }

    /// Claim-related events must carry a claim_id.
    pub fn is_claim_event(&self) -> bool {
        matches!(
            self,
            EventType::ClaimDeclared
                | EventType::ClaimOperationalized
                | EventType::EvidenceAdded
                | EventType::ClaimResolved
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current UTC time truncated to microsecond precision.
///
/// Every recorded timestamp goes through this, so a value that round-trips
/// through its serialized form compares equal to the original.
pub fn now_utc_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// UTC timestamps serialized as ISO-8601 with exactly six microsecond digits
/// and a `Z` suffix, e.g. `2024-01-01T00:00:00.000000Z`.
pub mod datetime_micros {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn to_string(dt: &DateTime<Utc>) -> String {
        dt.format(FORMAT).to_string()
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(raw, FORMAT).map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&to_string(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.serialize_some(&super::to_string(dt)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            raw.map(|r| super::parse(&r).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: Uuid,
    pub sequence_number: u64,
    pub event_type: EventType,
    pub claim_id: Option<Uuid>,
    pub payload: Value,
    pub previous_event_hash: Option<String>,
    pub event_hash: String,
    pub created_by: Uuid,
    #[serde(with = "datetime_micros")]
    pub created_at: DateTime<Utc>,
    pub editor_signature: String,
}

impl LedgerEvent {
    pub fn is_genesis(&self) -> bool {
        self.sequence_number == 0
    }

    /// Validate structural chain rules for this event in isolation.
    pub fn validate_chain_rules(&self) -> LedgerResult<()> {
        if self.sequence_number == 0 {
            if self.previous_event_hash.is_some() {
                return Err(LedgerError::HashChainBroken(
                    "genesis event must not carry a previous event hash".to_string(),
                ));
            }
        } else {
            match &self.previous_event_hash {
                None => {
                    return Err(LedgerError::HashChainBroken(format!(
                        "event at sequence {} is missing its previous event hash",
                        self.sequence_number
                    )));
                }
                Some(prev) if !is_hex_hash(prev) => {
                    return Err(LedgerError::HashChainBroken(format!(
                        "previous event hash at sequence {} is not 64 hex characters",
                        self.sequence_number
                    )));
                }
                Some(_) => {}
            }
        }
        if !is_hex_hash(&self.event_hash) {
            return Err(LedgerError::HashChainBroken(format!(
                "event hash at sequence {} is not 64 hex characters",
                self.sequence_number
            )));
        }
        if self.event_type.is_claim_event() && self.claim_id.is_none() {
            return Err(LedgerError::Validation(format!(
                "{} event requires a claim_id",
                self.event_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256_hex;
    use serde_json::json;

    fn sample_event() -> LedgerEvent {
        LedgerEvent {
            event_id: Uuid::new_v4(),
            sequence_number: 0,
            event_type: EventType::ClaimDeclared,
            claim_id: Some(Uuid::new_v4()),
            payload: json!({"statement": "sample statement"}),
            previous_event_hash: None,
            event_hash: sha256_hex(b"sample"),
            created_by: Uuid::new_v4(),
            created_at: datetime_micros::parse("2024-03-16T09:00:00.000000Z").expect("parse"),
            editor_signature: "c2lnbmF0dXJl".to_string(),
        }
    }

    #[test]
    fn genesis_must_not_have_previous_hash() {
        let mut event = sample_event();
        assert!(event.validate_chain_rules().is_ok());
        event.previous_event_hash = Some(sha256_hex(b"prev"));
        assert!(matches!(
            event.validate_chain_rules(),
            Err(LedgerError::HashChainBroken(_))
        ));
    }

    #[test]
    fn non_genesis_requires_previous_hash() {
        let mut event = sample_event();
        event.sequence_number = 3;
        assert!(matches!(
            event.validate_chain_rules(),
            Err(LedgerError::HashChainBroken(_))
        ));
        event.previous_event_hash = Some(sha256_hex(b"prev"));
        assert!(event.validate_chain_rules().is_ok());
    }

    #[test]
    fn claim_events_require_claim_id() {
        let mut event = sample_event();
        event.claim_id = None;
        assert!(matches!(
            event.validate_chain_rules(),
            Err(LedgerError::Validation(_))
        ));
        event.event_type = EventType::EditorRegistered;
        assert!(event.validate_chain_rules().is_ok());
    }

    #[test]
    fn created_at_round_trips_with_microsecond_precision() {
        let event = sample_event();
        let encoded = serde_json::to_string(&event).expect("encode");
        assert!(encoded.contains("2024-03-16T09:00:00.000000Z"));
        let decoded: LedgerEvent = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, event);
    }

    #[test]
    fn event_type_round_trips_through_strings() {
        for ty in [
            EventType::EditorRegistered,
            EventType::EditorDeactivated,
            EventType::ClaimDeclared,
            EventType::ClaimOperationalized,
            EventType::EvidenceAdded,
            EventType::ClaimResolved,
        ] {
            assert_eq!(EventType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::parse("CLAIM_EDITED"), None);
    }
}
