// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Event store abstraction.
//!
//! The store is the single source of truth for sequence numbers, chain
//! linkage and durability. Appends are atomic: the tail is re-validated under
//! an exclusive lock, so a caller whose view of the tail went stale receives
//! `HashChainBroken` and can retry. Readers get consistent snapshots and
//! never observe a partially appended event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::event::LedgerEvent;
use crate::hash::{hash_event_payload, hashes_equal};

/// Current state of the chain head. `last_sequence` is None for an empty
/// ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainHead {
    pub last_sequence: Option<u64>,
    pub last_event_hash: Option<String>,
}

impl ChainHead {
    pub fn next_sequence(&self) -> u64 {
        self.last_sequence.map(|s| s + 1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.last_sequence.is_none()
    }
}

/// Outcome of a full chain verification scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVerdict {
    Valid,
    BrokenAt(u64),
    Cancelled,
}

/// Re-derive every event hash and check linkage over an ordered event slice.
///
/// O(events). Honors cancellation between events: callers may flip `cancel`
/// from another thread and the scan stops at the next event boundary.
pub fn verify_event_chain(events: &[LedgerEvent], cancel: &AtomicBool) -> ChainVerdict {
    let mut previous: Option<&str> = None;
    for (expected_sequence, event) in events.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return ChainVerdict::Cancelled;
        }
        if event.sequence_number != expected_sequence as u64 {
            return ChainVerdict::BrokenAt(expected_sequence as u64);
        }
        let linked = match (previous, event.previous_event_hash.as_deref()) {
            (None, None) => true,
            (Some(prev), Some(claimed)) => hashes_equal(prev, claimed),
            _ => false,
        };
        if !linked {
            return ChainVerdict::BrokenAt(event.sequence_number);
        }
        match hash_event_payload(&event.payload, previous) {
            Ok(computed) if hashes_equal(&computed, &event.event_hash) => {}
            _ => return ChainVerdict::BrokenAt(event.sequence_number),
        }
        previous = Some(event.event_hash.as_str());
    }
    ChainVerdict::Valid
}

/// Validate an event against the current chain head before persisting it.
///
/// Shared by every backend so append semantics cannot drift between them.
pub(crate) fn validate_against_head(event: &LedgerEvent, head: &ChainHead) -> LedgerResult<()> {
    event.validate_chain_rules()?;

    if event.sequence_number != head.next_sequence() {
        return Err(LedgerError::HashChainBroken(format!(
            "sequence mismatch: expected {}, got {}",
            head.next_sequence(),
            event.sequence_number
        )));
    }

    match (&head.last_event_hash, &event.previous_event_hash) {
        (None, None) => {}
        (Some(tail), Some(claimed)) if hashes_equal(tail, claimed) => {}
        (tail, claimed) => {
            return Err(LedgerError::HashChainBroken(format!(
                "previous hash mismatch: tail is {:?}, event claims {:?}",
                tail.as_deref().map(|h| &h[..16]),
                claimed.as_deref().map(|h| &h[..16]),
            )));
        }
    }

    let computed = hash_event_payload(&event.payload, event.previous_event_hash.as_deref())?;
    if !hashes_equal(&computed, &event.event_hash) {
        return Err(LedgerError::HashChainBroken(format!(
            "event hash does not recompute: computed {}..., claimed {}...",
            &computed[..16],
            &event.event_hash[..16.min(event.event_hash.len())],
        )));
    }

    Ok(())
}

/// Durable, sequenced, immutable event log.
pub trait EventStore: Send + Sync {
    /// Atomically append a fully formed event. Re-validates the tail under
    /// the store's exclusive lock; fails with `HashChainBroken` when the tail
    /// moved, `DuplicateEventId` on id collision, `StorageUnavailable` when
    /// the backend is down.
    fn append(&self, event: LedgerEvent) -> LedgerResult<LedgerEvent>;

    fn get(&self, event_id: Uuid) -> LedgerResult<Option<LedgerEvent>>;

    fn get_by_sequence(&self, sequence: u64) -> LedgerResult<Option<LedgerEvent>>;

    /// Events with `start <= sequence_number <= end`, in order.
    fn range(&self, start: u64, end: u64) -> LedgerResult<Vec<LedgerEvent>>;

    fn head(&self) -> LedgerResult<ChainHead>;

    fn tail(&self) -> LedgerResult<Option<LedgerEvent>>;

    fn count(&self) -> LedgerResult<u64>;

    /// All events ordered by sequence number, for projection replay.
    fn list_all(&self) -> LedgerResult<Vec<LedgerEvent>>;

    /// All events carrying the given claim id, in sequence order.
    fn list_for_claim(&self, claim_id: Uuid) -> LedgerResult<Vec<LedgerEvent>>;

    /// Full-scan integrity check; O(events).
    fn verify_chain(&self, cancel: &AtomicBool) -> LedgerResult<ChainVerdict> {
        Ok(verify_event_chain(&self.list_all()?, cancel))
    }
}

#[derive(Default)]
struct MemoryInner {
    events: Vec<LedgerEvent>,
    by_id: HashMap<Uuid, usize>,
    by_claim: HashMap<Uuid, Vec<usize>>,
}

/// In-memory event store for development and tests.
///
/// Appends serialize on the write lock; readers clone snapshots out under
/// short read locks and never observe a partial append.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<MemoryInner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: LedgerEvent) -> LedgerResult<LedgerEvent> {
        let mut inner = self.inner.write();

        if inner.by_id.contains_key(&event.event_id) {
            return Err(LedgerError::DuplicateEventId(event.event_id));
        }

        let head = ChainHead {
            last_sequence: inner.events.last().map(|e| e.sequence_number),
            last_event_hash: inner.events.last().map(|e| e.event_hash.clone()),
        };
        validate_against_head(&event, &head)?;

        let index = inner.events.len();
        inner.by_id.insert(event.event_id, index);
        if let Some(claim_id) = event.claim_id {
            inner.by_claim.entry(claim_id).or_default().push(index);
        }
        inner.events.push(event.clone());
        Ok(event)
    }

    fn get(&self, event_id: Uuid) -> LedgerResult<Option<LedgerEvent>> {
        let inner = self.inner.read();
        Ok(inner
            .by_id
            .get(&event_id)
            .and_then(|&i| inner.events.get(i))
            .cloned())
    }

    fn get_by_sequence(&self, sequence: u64) -> LedgerResult<Option<LedgerEvent>> {
        let inner = self.inner.read();
        Ok(inner.events.get(sequence as usize).cloned())
    }

    fn range(&self, start: u64, end: u64) -> LedgerResult<Vec<LedgerEvent>> {
        let inner = self.inner.read();
        Ok(inner
            .events
            .iter()
            .filter(|e| e.sequence_number >= start && e.sequence_number <= end)
            .cloned()
            .collect())
    }

    fn head(&self) -> LedgerResult<ChainHead> {
        let inner = self.inner.read();
        Ok(ChainHead {
            last_sequence: inner.events.last().map(|e| e.sequence_number),
            last_event_hash: inner.events.last().map(|e| e.event_hash.clone()),
        })
    }

    fn tail(&self) -> LedgerResult<Option<LedgerEvent>> {
        Ok(self.inner.read().events.last().cloned())
    }

    fn count(&self) -> LedgerResult<u64> {
        Ok(self.inner.read().events.len() as u64)
    }

    fn list_all(&self) -> LedgerResult<Vec<LedgerEvent>> {
        Ok(self.inner.read().events.clone())
    }

    fn list_for_claim(&self, claim_id: Uuid) -> LedgerResult<Vec<LedgerEvent>> {
        let inner = self.inner.read();
        Ok(inner
            .by_claim
            .get(&claim_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|&i| inner.events.get(i))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
