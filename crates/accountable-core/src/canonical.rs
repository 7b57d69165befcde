// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic canonical serialization of event payloads.
//!
//! Same logical payload, same bytes. Forever, on every platform. Every event
//! hash in the ledger is computed over this representation, so the rules here
//! must never change without bumping `CANON_VERSION`:
//!
//! - the top level must be an object
//! - null-valued keys are dropped before serialization
//! - keys are sorted in UTF-8 byte order
//! - sequences preserve input order (order is semantic)
//! - floats are banned; decimals travel as strings end-to-end
//! - the `__canon_v` tag is inserted at the top level and sorts with the
//!   payload's own keys
//! - output is compact UTF-8 JSON with minimal escaping and no BOM

use serde_json::{Map, Value};
use thiserror::Error;

/// Version of the canonical serialization format.
pub const CANON_VERSION: u64 = 1;

const CANON_VERSION_KEY: &str = "__canon_v";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalError {
    #[error("top-level canonical value must be an object")]
    TopLevelNotObject,

    #[error("floating point numbers are not allowed in canonical payloads; use decimal strings")]
    FloatNotAllowed,

    #[error("previous event hash must be 64 hex characters")]
    InvalidPreviousHash,

    #[error("canonical serialization failed")]
    Serialize,
}

fn canonical_value(v: &Value) -> Result<Value, CanonicalError> {
    match v {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(v.clone()),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(CanonicalError::FloatNotAllowed);
            }
            Ok(v.clone())
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(canonical_value)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            let mut sorted = Map::new();
            for (key, value) in entries {
                if value.is_null() {
                    continue;
                }
                sorted.insert(key.clone(), canonical_value(value)?);
            }
            Ok(Value::Object(sorted))
        }
    }
}

/// Produce the canonical byte representation of a payload.
pub fn canonicalize(payload: &Value) -> Result<Vec<u8>, CanonicalError> {
    let Value::Object(map) = payload else {
        return Err(CanonicalError::TopLevelNotObject);
    };
    let mut tagged = map.clone();
    tagged.insert(CANON_VERSION_KEY.to_string(), Value::from(CANON_VERSION));
    let sorted = canonical_value(&Value::Object(tagged))?;
    serde_json::to_vec(&sorted).map_err(|_| CanonicalError::Serialize)
}
