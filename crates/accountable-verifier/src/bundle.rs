// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Claim bundle verification.
//!
//! A bundle is a self-contained export of one claim's events plus the public
//! keys of every editor that signed them. Verification recomputes every hash,
//! checks chain linkage between successive events, and verifies every
//! signature against the listed keys. No ledger access is required.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{canonicalize, event_hash, hashes_equal, verify_event_signature, CANON_VERSION};

/// Outcome classification for a verified bundle.
///
/// TAMPERED means a hash or signature failed to recompute; INCOMPLETE means
/// the bundle is internally consistent but missing data needed for a full
/// check (an editor key, or a chain link between successive events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleVerdict {
    #[serde(rename = "VERIFIED")]
    Verified,
    #[serde(rename = "TAMPERED")]
    Tampered,
    #[serde(rename = "INCOMPLETE")]
    Incomplete,
    #[serde(rename = "INVALID_FORMAT")]
    InvalidFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleReport {
    pub verdict: BundleVerdict,
    pub claim_id: String,
    pub event_count: usize,
    pub checks_passed: Vec<String>,
    pub checks_failed: Vec<String>,
    pub warnings: Vec<String>,
}

struct BundleChecker<'a> {
    bundle: &'a Value,
    passed: Vec<String>,
    failed: Vec<String>,
    warnings: Vec<String>,
    tampered: bool,
    incomplete: bool,
}

/// Verify a claim bundle parsed from JSON.
pub fn verify_bundle(bundle: &Value) -> BundleReport {
    BundleChecker {
        bundle,
        passed: Vec::new(),
        failed: Vec::new(),
        warnings: Vec::new(),
        tampered: false,
        incomplete: false,
    }
    .run()
}

impl<'a> BundleChecker<'a> {
    fn run(mut self) -> BundleReport {
        if !self.check_structure() {
            return self.report(BundleVerdict::InvalidFormat);
        }
        self.check_meta();
        self.check_hashes();
        self.check_chain_linkage();
        self.check_signatures();
        self.check_editor_completeness();

        let verdict = if self.tampered {
            BundleVerdict::Tampered
        } else if self.incomplete {
            BundleVerdict::Incomplete
        } else {
            BundleVerdict::Verified
        };
        self.report(verdict)
    }

    fn events(&self) -> &'a [Value] {
        self.bundle
            .get("events")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn editor_key(&self, editor_id: &str) -> Option<&'a str> {
        self.bundle
            .get("editors")?
            .get(editor_id)?
            .get("public_key")?
            .as_str()
    }

    fn event_label(event: &Value, index: usize) -> String {
        match event.get("event_id").and_then(Value::as_str) {
            Some(id) => id.chars().take(8).collect(),
            None => format!("event_{index}"),
        }
    }

    fn check_structure(&mut self) -> bool {
        let Value::Object(map) = self.bundle else {
            self.failed.push("bundle is not a JSON object".to_string());
            return false;
        };

        let missing: Vec<&str> = ["_meta", "_verification", "claim", "events", "editors"]
            .into_iter()
            .filter(|key| !map.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            self.failed.push(format!("missing required keys: {missing:?}"));
            return false;
        }

        let Some(events) = map.get("events").and_then(Value::as_array) else {
            self.failed.push("'events' must be an array".to_string());
            return false;
        };
        if events.is_empty() {
            self.failed.push("bundle has no events".to_string());
            return false;
        }

        for (i, event) in events.iter().enumerate() {
            let ok = event.is_object()
                && event.get("event_hash").and_then(Value::as_str).is_some()
                && event.get("payload").map(Value::is_object).unwrap_or(false)
                && event.get("created_by").and_then(Value::as_str).is_some()
                && event
                    .get("editor_signature")
                    .and_then(Value::as_str)
                    .is_some();
            if !ok {
                self.failed
                    .push(format!("event at index {i} is structurally invalid"));
                return false;
            }
        }

        if !map.get("editors").map(Value::is_object).unwrap_or(false) {
            self.failed.push("'editors' must be an object".to_string());
            return false;
        }

        self.passed.push("bundle structure valid".to_string());
        true
    }

    fn check_meta(&mut self) {
        let canon_v = self
            .bundle
            .get("_verification")
            .and_then(|v| v.get("canonicalization_version"))
            .and_then(Value::as_u64);
        if let Some(v) = canon_v {
            if v != CANON_VERSION {
                self.warnings.push(format!(
                    "canonicalization version mismatch: bundle={v}, verifier={CANON_VERSION}"
                ));
            }
        }
        self.passed.push("meta information present".to_string());
    }

    fn check_hashes(&mut self) {
        let events = self.events();
        let mut all_valid = true;

        for (i, event) in events.iter().enumerate() {
            let label = Self::event_label(event, i);
            let stored = event
                .get("event_hash")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let previous = event
                .get("previous_event_hash")
                .and_then(Value::as_str);
            let payload = event.get("payload").cloned().unwrap_or(Value::Null);

            let computed = canonicalize(&payload)
                .and_then(|canonical| event_hash(&canonical, previous));
            match computed {
                Ok(computed) if hashes_equal(&computed, stored) => {}
                Ok(computed) => {
                    self.failed.push(format!(
                        "event {label}: hash mismatch (computed={}..., stored={}...)",
                        &computed[..16.min(computed.len())],
                        &stored[..16.min(stored.len())],
                    ));
                    all_valid = false;
                }
                Err(err) => {
                    self.failed
                        .push(format!("event {label}: failed to compute hash: {err}"));
                    all_valid = false;
                }
            }
        }

        if all_valid {
            self.passed
                .push(format!("all {} event hashes verified", events.len()));
        } else {
            self.tampered = true;
        }
    }

    fn check_chain_linkage(&mut self) {
        let events = self.events();
        let mut all_linked = true;

        let sequences: Vec<i64> = events
            .iter()
            .map(|e| e.get("sequence_number").and_then(Value::as_i64).unwrap_or(-1))
            .collect();

        for i in 1..events.len() {
            if sequences[i] <= sequences[i - 1] {
                self.warnings.push(format!(
                    "non-monotonic sequence at position {i}: {} -> {}",
                    sequences[i - 1],
                    sequences[i]
                ));
                continue;
            }
            // Events of other claims may sit between two bundle events; the
            // intermediate hashes are not in the bundle, so linkage is only
            // locally checkable across consecutive sequence numbers.
            if sequences[i] != sequences[i - 1] + 1 {
                self.warnings.push(format!(
                    "sequence gap before position {i}; linkage across the gap \
                     is not locally verifiable"
                ));
                continue;
            }
            let expected = events[i - 1]
                .get("event_hash")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let actual = events[i]
                .get("previous_event_hash")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !hashes_equal(expected, actual) {
                self.failed.push(format!(
                    "chain break at position {i}: previous_event_hash does not match"
                ));
                all_linked = false;
            }
        }

        if all_linked {
            self.passed.push("chain linkage verified".to_string());
        } else {
            self.incomplete = true;
        }
    }

    fn check_signatures(&mut self) {
        let events = self.events();
        let mut all_valid = true;
        let mut any_checked = false;

        for (i, event) in events.iter().enumerate() {
            let label = Self::event_label(event, i);
            let hash = event
                .get("event_hash")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let signature = event
                .get("editor_signature")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let editor_id = event
                .get("created_by")
                .and_then(Value::as_str)
                .unwrap_or_default();

            let Some(public_key) = self.editor_key(editor_id) else {
                // Reported by check_editor_completeness.
                continue;
            };
            any_checked = true;

            if !verify_event_signature(hash, signature, public_key) {
                self.failed
                    .push(format!("event {label}: signature verification failed"));
                all_valid = false;
            }
        }

        if all_valid && any_checked {
            self.passed
                .push(format!("all {} signatures verified", events.len()));
        } else if !all_valid {
            self.tampered = true;
        }
    }

    fn check_editor_completeness(&mut self) {
        let events = self.events();
        let mut missing: Vec<String> = Vec::new();

        for event in events {
            let editor_id = event
                .get("created_by")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if self.editor_key(editor_id).is_none() && !missing.contains(&editor_id.to_string()) {
                missing.push(editor_id.to_string());
            }
        }

        if missing.is_empty() {
            self.passed.push("all referenced editors present".to_string());
        } else {
            self.failed
                .push(format!("missing editor keys for: {missing:?}"));
            self.incomplete = true;
        }
    }

    fn report(self, verdict: BundleVerdict) -> BundleReport {
        BundleReport {
            verdict,
            claim_id: self
                .bundle
                .get("claim")
                .and_then(|c| c.get("claim_id"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            event_count: self.events().len(),
            checks_passed: self.passed,
            checks_failed: self.failed,
            warnings: self.warnings,
        }
    }
}
