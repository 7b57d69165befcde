// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Merkle anchoring.
//!
//! Batches of contiguous events are committed to a single Merkle root that
//! can be published to an out-of-band witness (a git tag, a blockchain
//! transaction, an object-store version). Leaves are the raw 32 bytes of the
//! event hashes; interior nodes are SHA-256 over the concatenated children;
//! a level with an odd node count duplicates its last node. Inclusion proofs
//! list sibling hashes bottom-up with a left/right flag and are verified by
//! the standalone verifier crate.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub use accountable_verifier::{verify_inclusion_proof, ProofStep, SiblingPosition};

use crate::error::{LedgerError, LedgerResult};
use crate::event::{datetime_micros, now_utc_micros};
use crate::hash::Hash32;
use crate::store::EventStore;

fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    accountable_verifier::node_hash(left, right)
}

fn decode_leaf(event_hash: &str) -> LedgerResult<Hash32> {
    let bytes = hex::decode(event_hash)
        .map_err(|_| LedgerError::Validation("event hash is not valid hex".to_string()))?;
    <Hash32>::try_from(bytes.as_slice())
        .map_err(|_| LedgerError::Validation("event hash must decode to 32 bytes".to_string()))
}

/// A Merkle tree over event hashes. Keeps every (padded) level so sibling
/// lookups for proofs stay trivial.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    leaf_count: usize,
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    pub fn from_event_hashes(event_hashes: &[String]) -> LedgerResult<Self> {
        if event_hashes.is_empty() {
            return Err(LedgerError::Validation(
                "cannot build a Merkle tree with no leaves".to_string(),
            ));
        }
        let leaves = event_hashes
            .iter()
            .map(|h| decode_leaf(h))
            .collect::<LedgerResult<Vec<_>>>()?;

        let leaf_count = leaves.len();
        let mut levels: Vec<Vec<Hash32>> = Vec::new();
        let mut current = leaves;
        let mut at_leaf_level = true;
        loop {
            if current.len() % 2 == 1 && (at_leaf_level || current.len() > 1) {
                if let Some(last) = current.last().copied() {
                    current.push(last);
                }
            }
            levels.push(current.clone());
            if current.len() == 1 {
                break;
            }
            current = current
                .chunks(2)
                .map(|pair| node_hash(&pair[0], &pair[1]))
                .collect();
            at_leaf_level = false;
        }

        Ok(Self { leaf_count, levels })
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn root_hex(&self) -> String {
        self.levels
            .last()
            .and_then(|level| level.first())
            .map(hex::encode)
            .unwrap_or_default()
    }

    /// Sibling path for the leaf at `index`, bottom-up.
    pub fn proof_for(&self, index: usize) -> LedgerResult<Vec<ProofStep>> {
        if index >= self.leaf_count {
            return Err(LedgerError::UnknownEntity(format!(
                "leaf index {index} out of range"
            )));
        }
        let mut path = Vec::new();
        let mut position = index;
        for level in &self.levels {
            if level.len() == 1 {
                break;
            }
            let sibling = position ^ 1;
            path.push(ProofStep {
                sibling_hash: hex::encode(level[sibling]),
                position: if position % 2 == 0 {
                    SiblingPosition::Right
                } else {
                    SiblingPosition::Left
                },
            });
            position /= 2;
        }
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Pending,
    Anchored,
    Failed,
}

impl AnchorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorStatus::Pending => "pending",
            AnchorStatus::Anchored => "anchored",
            AnchorStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AnchorStatus::Pending),
            "anchored" => Some(AnchorStatus::Anchored),
            "failed" => Some(AnchorStatus::Failed),
            _ => None,
        }
    }
}

/// Reference to an out-of-band witness holding the published root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAnchor {
    /// e.g. "git-tag", "blockchain-tx", "object-store"
    pub kind: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorBatch {
    pub batch_id: Uuid,
    pub start_sequence: u64,
    pub end_sequence: u64,
    pub event_ids: Vec<Uuid>,
    pub event_hashes: Vec<String>,
    pub merkle_root: String,
    pub status: AnchorStatus,
    pub external_anchor: Option<ExternalAnchor>,
    #[serde(with = "datetime_micros")]
    pub created_at: DateTime<Utc>,
}

/// A self-contained inclusion proof for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub event_id: Uuid,
    pub batch_id: Uuid,
    pub merkle_root: String,
    pub leaf_index: u64,
    pub path: Vec<ProofStep>,
}

#[derive(Default)]
struct AnchorInner {
    batches: Vec<AnchorBatch>,
    /// event_id -> (batch index, leaf index)
    event_index: HashMap<Uuid, (usize, usize)>,
}

impl AnchorInner {
    fn next_sequence(&self) -> u64 {
        self.batches
            .iter()
            .map(|b| b.end_sequence + 1)
            .max()
            .unwrap_or(0)
    }

    fn index_batch(&mut self, batch: AnchorBatch) {
        let batch_index = self.batches.len();
        for (leaf_index, event_id) in batch.event_ids.iter().enumerate() {
            self.event_index.insert(*event_id, (batch_index, leaf_index));
        }
        self.batches.push(batch);
    }
}

/// Batches newly appended events into Merkle trees and issues inclusion
/// proofs. May lag the ledger arbitrarily; anchored never implies
/// appended-recently.
#[derive(Default)]
pub struct AnchorService {
    inner: RwLock<AnchorInner>,
}

impl AnchorService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore service state from previously persisted batches, re-reading
    /// each batch's events from the store to rebuild proof indexes.
    pub fn restore(store: &dyn EventStore, batches: Vec<AnchorBatch>) -> LedgerResult<Self> {
        let service = Self::new();
        {
            let mut inner = service.inner.write();
            for mut batch in batches {
                if batch.event_ids.is_empty() {
                    let events = store.range(batch.start_sequence, batch.end_sequence)?;
                    batch.event_ids = events.iter().map(|e| e.event_id).collect();
                    batch.event_hashes = events.iter().map(|e| e.event_hash.clone()).collect();
                }
                inner.index_batch(batch);
            }
        }
        Ok(service)
    }

    /// Select the next contiguous unanchored range and commit it to a
    /// pending batch. Returns None when no new events exist.
    pub fn create_batch(
        &self,
        store: &dyn EventStore,
        max_events: usize,
    ) -> LedgerResult<Option<AnchorBatch>> {
        if max_events == 0 {
            return Err(LedgerError::Validation(
                "anchor batch size must be positive".to_string(),
            ));
        }

        let mut inner = self.inner.write();
        let start = inner.next_sequence();
        let head = store.head()?;
        let Some(last) = head.last_sequence else {
            return Ok(None);
        };
        if start > last {
            return Ok(None);
        }
        let end = last.min(start + max_events as u64 - 1);

        let events = store.range(start, end)?;
        if events.is_empty() {
            return Ok(None);
        }

        let event_hashes: Vec<String> = events.iter().map(|e| e.event_hash.clone()).collect();
        let tree = MerkleTree::from_event_hashes(&event_hashes)?;
        let batch = AnchorBatch {
            batch_id: Uuid::new_v4(),
            start_sequence: start,
            end_sequence: end,
            event_ids: events.iter().map(|e| e.event_id).collect(),
            event_hashes,
            merkle_root: tree.root_hex(),
            status: AnchorStatus::Pending,
            external_anchor: None,
            created_at: now_utc_micros(),
        };
        tracing::info!(
            batch_id = %batch.batch_id,
            start = batch.start_sequence,
            end = batch.end_sequence,
            root = %batch.merkle_root,
            "anchor batch created"
        );
        inner.index_batch(batch.clone());
        Ok(Some(batch))
    }

    /// Record successful publication to an external witness.
    pub fn mark_anchored(&self, batch_id: Uuid, external: ExternalAnchor) -> LedgerResult<()> {
        let mut inner = self.inner.write();
        let batch = inner
            .batches
            .iter_mut()
            .find(|b| b.batch_id == batch_id)
            .ok_or_else(|| LedgerError::UnknownEntity(format!("anchor batch {batch_id}")))?;
        match batch.status {
            AnchorStatus::Pending | AnchorStatus::Failed => {
                batch.status = AnchorStatus::Anchored;
                batch.external_anchor = Some(external);
                Ok(())
            }
            AnchorStatus::Anchored => Err(LedgerError::Validation(format!(
                "anchor batch {batch_id} is already anchored"
            ))),
        }
    }

    /// Record failed publication; the batch remains and can be retried
    /// without rebuilding the tree.
    pub fn mark_failed(&self, batch_id: Uuid) -> LedgerResult<()> {
        let mut inner = self.inner.write();
        let batch = inner
            .batches
            .iter_mut()
            .find(|b| b.batch_id == batch_id)
            .ok_or_else(|| LedgerError::UnknownEntity(format!("anchor batch {batch_id}")))?;
        match batch.status {
            AnchorStatus::Pending | AnchorStatus::Failed => {
                batch.status = AnchorStatus::Failed;
                Ok(())
            }
            AnchorStatus::Anchored => Err(LedgerError::Validation(format!(
                "anchor batch {batch_id} is already anchored"
            ))),
        }
    }

    /// Locate an event's batch and emit its sibling path.
    pub fn prove_event(&self, event_id: Uuid) -> LedgerResult<MerkleProof> {
        let inner = self.inner.read();
        let (batch_index, leaf_index) = inner
            .event_index
            .get(&event_id)
            .copied()
            .ok_or_else(|| {
                LedgerError::UnknownEntity(format!("event {event_id} is not anchored"))
            })?;
        let batch = &inner.batches[batch_index];
        let tree = MerkleTree::from_event_hashes(&batch.event_hashes)?;
        let path = tree.proof_for(leaf_index)?;
        Ok(MerkleProof {
            event_id,
            batch_id: batch.batch_id,
            merkle_root: batch.merkle_root.clone(),
            leaf_index: leaf_index as u64,
            path,
        })
    }

    pub fn is_anchored(&self, event_id: Uuid) -> bool {
        self.inner.read().event_index.contains_key(&event_id)
    }

    pub fn batch(&self, batch_id: Uuid) -> Option<AnchorBatch> {
        self.inner
            .read()
            .batches
            .iter()
            .find(|b| b.batch_id == batch_id)
            .cloned()
    }

    pub fn batch_for_event(&self, event_id: Uuid) -> Option<AnchorBatch> {
        let inner = self.inner.read();
        inner
            .event_index
            .get(&event_id)
            .map(|&(batch_index, _)| inner.batches[batch_index].clone())
    }

    pub fn batches(&self) -> Vec<AnchorBatch> {
        self.inner.read().batches.clone()
    }
}
