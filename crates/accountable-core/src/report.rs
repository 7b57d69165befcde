// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Human-readable markdown report for a claim.
//!
//! The verifiable artifact is the claim bundle; this rendering exists for
//! people, and says so in its footer.

use std::fmt::Write as _;

use crate::event::datetime_micros;
use crate::query::ClaimDetail;

pub fn render_claim_report(detail: &ClaimDetail) -> String {
    let claim = &detail.claim;
    let mut out = String::new();

    let _ = writeln!(out, "# Claim {}", claim.claim_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "> {}", claim.statement);
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Status**: {}", claim.status.as_str());
    let _ = writeln!(
        out,
        "- **Declared**: {}",
        datetime_micros::to_string(&claim.declared_at)
    );
    let _ = writeln!(out, "- **Source**: {}", claim.source_url);
    let _ = writeln!(
        out,
        "- **Scope**: {} / {} / {}",
        claim.scope.geographic, claim.scope.policy_domain, claim.scope.affected_population
    );
    if let Some(outcome) = &claim.outcome_description {
        let _ = writeln!(out, "- **Operationalized outcome**: {outcome}");
    }
    if let Some(summary) = &claim.resolution_summary {
        let _ = writeln!(out, "- **Resolution**: {summary}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Evidence ({})", claim.evidence_count);
    let _ = writeln!(out);
    if detail.evidence.is_empty() {
        let _ = writeln!(out, "_No evidence attached._");
    } else {
        for evidence in &detail.evidence {
            let stance = if evidence.supports_claim {
                "supports"
            } else {
                "contradicts"
            };
            let _ = writeln!(
                out,
                "- [{}]({}) ({stance})",
                evidence.source_title, evidence.source_url
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Timeline");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Seq | Event | Recorded at |");
    let _ = writeln!(out, "|-----|-------|-------------|");
    for event in &detail.timeline {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            event.sequence_number,
            event.event_type,
            datetime_micros::to_string(&event.created_at)
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "---\n_This report is a human-readable rendering and is not \
         authoritative. Verify the claim bundle cryptographically instead._"
    );
    out
}
