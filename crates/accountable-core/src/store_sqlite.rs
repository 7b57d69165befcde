// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! SQLite-backed event store.
//!
//! A single `ledger_events` table keyed by sequence number, with
//! UPDATE/DELETE triggers that abort: immutability is enforced at the
//! storage layer, not by convention. Appends run inside an IMMEDIATE
//! transaction behind a connection mutex, which serializes writers on the
//! tail while readers keep their own snapshot semantics through SQLite's
//! WAL mode.
//!
//! Projection tables and anchor batches live in the same file as derived
//! caches; they are rebuildable from `ledger_events` at any time.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::anchor::{AnchorBatch, AnchorStatus, ExternalAnchor};
use crate::error::{LedgerError, LedgerResult};
use crate::event::{datetime_micros, EventType, LedgerEvent};
use crate::projection::ProjectionState;
use crate::store::{validate_against_head, ChainHead, EventStore};

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ledger_events (
    sequence_number     INTEGER PRIMARY KEY,
    event_id            TEXT NOT NULL UNIQUE,
    event_type          TEXT NOT NULL,
    claim_id            TEXT,
    payload             TEXT NOT NULL,
    previous_event_hash TEXT,
    event_hash          TEXT NOT NULL,
    created_by          TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    editor_signature    TEXT NOT NULL
);

-- Events are write-once. No UPDATE, no DELETE, ever.
CREATE TRIGGER IF NOT EXISTS ledger_events_no_update
BEFORE UPDATE ON ledger_events
BEGIN
    SELECT RAISE(ABORT, 'ledger_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS ledger_events_no_delete
BEFORE DELETE ON ledger_events
BEGIN
    SELECT RAISE(ABORT, 'ledger_events is append-only');
END;

CREATE INDEX IF NOT EXISTS ledger_events_claim_idx ON ledger_events(claim_id);

CREATE TABLE IF NOT EXISTS claims_projection (
    claim_id                     TEXT PRIMARY KEY,
    statement                    TEXT NOT NULL,
    status                       TEXT NOT NULL,
    claim_type                   TEXT NOT NULL,
    source_url                   TEXT NOT NULL,
    scope_geographic             TEXT NOT NULL,
    scope_policy_domain          TEXT NOT NULL,
    scope_affected_population    TEXT NOT NULL,
    declared_at                  TEXT NOT NULL,
    operationalized_at           TEXT,
    resolved_at                  TEXT,
    resolution                   TEXT,
    resolution_summary           TEXT,
    outcome_description          TEXT,
    evidence_count               INTEGER NOT NULL DEFAULT 0,
    supporting_evidence_count    INTEGER NOT NULL DEFAULT 0,
    contradicting_evidence_count INTEGER NOT NULL DEFAULT 0,
    last_event_sequence          INTEGER NOT NULL,
    last_event_hash              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS editors_projection (
    editor_id      TEXT PRIMARY KEY,
    username       TEXT NOT NULL UNIQUE,
    display_name   TEXT NOT NULL,
    role           TEXT NOT NULL,
    public_key     TEXT NOT NULL UNIQUE,
    is_active      INTEGER NOT NULL,
    registered_at  TEXT NOT NULL,
    registered_by  TEXT,
    deactivated_at TEXT
);

CREATE TABLE IF NOT EXISTS evidence_projection (
    evidence_id    TEXT PRIMARY KEY,
    claim_id       TEXT NOT NULL,
    source_url     TEXT NOT NULL,
    source_title   TEXT NOT NULL,
    supports_claim INTEGER NOT NULL,
    added_at       TEXT NOT NULL,
    added_by       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS anchor_batches (
    batch_id           TEXT PRIMARY KEY,
    start_sequence     INTEGER NOT NULL,
    end_sequence       INTEGER NOT NULL,
    merkle_root        TEXT NOT NULL,
    status             TEXT NOT NULL,
    external_kind      TEXT,
    external_reference TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projection_metadata (
    id                      INTEGER PRIMARY KEY CHECK (id = 1),
    last_processed_sequence INTEGER NOT NULL
);
";

fn storage_err(err: rusqlite::Error) -> LedgerError {
    LedgerError::StorageUnavailable(err.to_string())
}

fn parse_uuid(field: &str, raw: &str) -> LedgerResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| LedgerError::StorageUnavailable(format!("stored {field} is not a uuid")))
}

fn parse_datetime(field: &str, raw: &str) -> LedgerResult<chrono::DateTime<chrono::Utc>> {
    datetime_micros::parse(raw).map_err(|_| {
        LedgerError::StorageUnavailable(format!("stored {field} is not a valid timestamp"))
    })
}

/// Event log persisted in a single SQLite file.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::with_connection(conn)
    }

    /// In-memory database; used by tests.
    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> LedgerResult<Self> {
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEventRow> {
        Ok(RawEventRow {
            sequence_number: row.get(0)?,
            event_id: row.get(1)?,
            event_type: row.get(2)?,
            claim_id: row.get(3)?,
            payload: row.get(4)?,
            previous_event_hash: row.get(5)?,
            event_hash: row.get(6)?,
            created_by: row.get(7)?,
            created_at: row.get(8)?,
            editor_signature: row.get(9)?,
        })
    }

    fn query_events(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> LedgerResult<Vec<LedgerEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params, Self::row_to_event)
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(RawEventRow::into_event).collect()
    }

    fn head_of(conn: &Connection) -> LedgerResult<ChainHead> {
        let row: Option<(u64, String)> = conn
            .query_row(
                "SELECT sequence_number, event_hash FROM ledger_events
                 ORDER BY sequence_number DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(match row {
            Some((sequence, hash)) => ChainHead {
                last_sequence: Some(sequence),
                last_event_hash: Some(hash),
            },
            None => ChainHead::default(),
        })
    }

    // ================================================================
    // Projection persistence (derived caches)
    // ================================================================

    /// Write the folded projection rows, replacing whatever is there.
    pub fn persist_projections(&self, state: &ProjectionState) -> LedgerResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_err)?;

        tx.execute("DELETE FROM claims_projection", [])
            .map_err(storage_err)?;
        tx.execute("DELETE FROM editors_projection", [])
            .map_err(storage_err)?;
        tx.execute("DELETE FROM evidence_projection", [])
            .map_err(storage_err)?;

        for claim in state.claims() {
            tx.execute(
                "INSERT INTO claims_projection (
                    claim_id, statement, status, claim_type, source_url,
                    scope_geographic, scope_policy_domain, scope_affected_population,
                    declared_at, operationalized_at, resolved_at, resolution,
                    resolution_summary, outcome_description, evidence_count,
                    supporting_evidence_count, contradicting_evidence_count,
                    last_event_sequence, last_event_hash
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                params![
                    claim.claim_id.to_string(),
                    claim.statement,
                    claim.status.as_str(),
                    serde_json::to_value(claim.claim_type)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string)),
                    claim.source_url,
                    claim.scope.geographic,
                    claim.scope.policy_domain,
                    claim.scope.affected_population,
                    datetime_micros::to_string(&claim.declared_at),
                    claim.operationalized_at.map(|t| datetime_micros::to_string(&t)),
                    claim.resolved_at.map(|t| datetime_micros::to_string(&t)),
                    claim
                        .resolution
                        .and_then(|r| serde_json::to_value(r).ok())
                        .and_then(|v| v.as_str().map(str::to_string)),
                    claim.resolution_summary,
                    claim.outcome_description,
                    claim.evidence_count,
                    claim.supporting_evidence_count,
                    claim.contradicting_evidence_count,
                    claim.last_event_sequence,
                    claim.last_event_hash,
                ],
            )
            .map_err(storage_err)?;
        }

        for editor in state.editors() {
            tx.execute(
                "INSERT INTO editors_projection (
                    editor_id, username, display_name, role, public_key,
                    is_active, registered_at, registered_by, deactivated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    editor.editor_id.to_string(),
                    editor.username,
                    editor.display_name,
                    serde_json::to_value(editor.role)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string)),
                    editor.public_key,
                    editor.is_active,
                    datetime_micros::to_string(&editor.registered_at),
                    editor.registered_by.map(|id| id.to_string()),
                    editor.deactivated_at.map(|t| datetime_micros::to_string(&t)),
                ],
            )
            .map_err(storage_err)?;
        }

        for claim in state.claims() {
            for evidence in state.evidence_for_claim(claim.claim_id) {
                tx.execute(
                    "INSERT INTO evidence_projection (
                        evidence_id, claim_id, source_url, source_title,
                        supports_claim, added_at, added_by
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        evidence.evidence_id.to_string(),
                        evidence.claim_id.to_string(),
                        evidence.source_url,
                        evidence.source_title,
                        evidence.supports_claim,
                        datetime_micros::to_string(&evidence.added_at),
                        evidence.added_by.to_string(),
                    ],
                )
                .map_err(storage_err)?;
            }
        }

        let last = state
            .last_processed_sequence()
            .map(|s| s as i64)
            .unwrap_or(-1);
        tx.execute(
            "INSERT INTO projection_metadata (id, last_processed_sequence)
             VALUES (1, ?1)
             ON CONFLICT (id) DO UPDATE SET last_processed_sequence = excluded.last_processed_sequence",
            params![last],
        )
        .map_err(storage_err)?;

        tx.commit().map_err(storage_err)
    }

    pub fn last_processed_sequence(&self) -> LedgerResult<Option<u64>> {
        let conn = self.conn.lock();
        let value: Option<i64> = conn
            .query_row(
                "SELECT last_processed_sequence FROM projection_metadata WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(value.filter(|v| *v >= 0).map(|v| v as u64))
    }

    /// Read back the persisted projection rows keyed by id, for comparison
    /// against a freshly folded state.
    pub fn projection_fingerprint(&self) -> LedgerResult<BTreeMap<String, Vec<String>>> {
        let conn = self.conn.lock();
        let mut out = BTreeMap::new();
        for table in ["claims_projection", "editors_projection", "evidence_projection"] {
            let mut stmt = conn
                .prepare(&format!("SELECT * FROM {table} ORDER BY 1"))
                .map_err(storage_err)?;
            let column_count = stmt.column_count();
            let rows = stmt
                .query_map([], |row| {
                    let mut cells = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        let cell: rusqlite::types::Value = row.get(i)?;
                        cells.push(format!("{cell:?}"));
                    }
                    Ok(cells.join("|"))
                })
                .map_err(storage_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(storage_err)?;
            out.insert(table.to_string(), rows);
        }
        Ok(out)
    }

    // ================================================================
    // Anchor batch persistence
    // ================================================================

    pub fn save_anchor_batch(&self, batch: &AnchorBatch) -> LedgerResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO anchor_batches (
                batch_id, start_sequence, end_sequence, merkle_root,
                status, external_kind, external_reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (batch_id) DO UPDATE SET
                status = excluded.status,
                external_kind = excluded.external_kind,
                external_reference = excluded.external_reference",
            params![
                batch.batch_id.to_string(),
                batch.start_sequence,
                batch.end_sequence,
                batch.merkle_root,
                batch.status.as_str(),
                batch.external_anchor.as_ref().map(|e| e.kind.clone()),
                batch.external_anchor.as_ref().map(|e| e.reference.clone()),
                datetime_micros::to_string(&batch.created_at),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub fn load_anchor_batches(&self) -> LedgerResult<Vec<AnchorBatch>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT batch_id, start_sequence, end_sequence, merkle_root,
                        status, external_kind, external_reference, created_at
                 FROM anchor_batches ORDER BY start_sequence",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        drop(stmt);
        drop(conn);

        rows.into_iter()
            .map(|(id, start, end, root, status, kind, reference, created)| {
                Ok(AnchorBatch {
                    batch_id: parse_uuid("batch_id", &id)?,
                    start_sequence: start,
                    end_sequence: end,
                    event_ids: Vec::new(),
                    event_hashes: Vec::new(),
                    merkle_root: root,
                    status: AnchorStatus::parse(&status).ok_or_else(|| {
                        LedgerError::StorageUnavailable(format!(
                            "stored anchor status '{status}' is unknown"
                        ))
                    })?,
                    external_anchor: match (kind, reference) {
                        (Some(kind), Some(reference)) => {
                            Some(ExternalAnchor { kind, reference })
                        }
                        _ => None,
                    },
                    created_at: parse_datetime("created_at", &created)?,
                })
            })
            .collect()
    }
}

struct RawEventRow {
    sequence_number: u64,
    event_id: String,
    event_type: String,
    claim_id: Option<String>,
    payload: String,
    previous_event_hash: Option<String>,
    event_hash: String,
    created_by: String,
    created_at: String,
    editor_signature: String,
}

impl RawEventRow {
    fn into_event(self) -> LedgerResult<LedgerEvent> {
        Ok(LedgerEvent {
            event_id: parse_uuid("event_id", &self.event_id)?,
            sequence_number: self.sequence_number,
            event_type: EventType::parse(&self.event_type).ok_or_else(|| {
                LedgerError::StorageUnavailable(format!(
                    "stored event type '{}' is unknown",
                    self.event_type
                ))
            })?,
            claim_id: self
                .claim_id
                .as_deref()
                .map(|raw| parse_uuid("claim_id", raw))
                .transpose()?,
            payload: serde_json::from_str(&self.payload).map_err(|_| {
                LedgerError::StorageUnavailable("stored payload is not valid JSON".to_string())
            })?,
            previous_event_hash: self.previous_event_hash,
            event_hash: self.event_hash,
            created_by: parse_uuid("created_by", &self.created_by)?,
            created_at: parse_datetime("created_at", &self.created_at)?,
            editor_signature: self.editor_signature,
        })
    }
}

impl EventStore for SqliteEventStore {
    fn append(&self, event: LedgerEvent) -> LedgerResult<LedgerEvent> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_err)?;

        let duplicate: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM ledger_events WHERE event_id = ?1",
                params![event.event_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        if duplicate.is_some() {
            return Err(LedgerError::DuplicateEventId(event.event_id));
        }

        let head = Self::head_of(&tx)?;
        validate_against_head(&event, &head)?;

        let payload = serde_json::to_string(&event.payload).map_err(|_| {
            LedgerError::StorageUnavailable("payload serialization failed".to_string())
        })?;
        tx.execute(
            "INSERT INTO ledger_events (
                sequence_number, event_id, event_type, claim_id, payload,
                previous_event_hash, event_hash, created_by, created_at,
                editor_signature
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.sequence_number,
                event.event_id.to_string(),
                event.event_type.as_str(),
                event.claim_id.map(|id| id.to_string()),
                payload,
                event.previous_event_hash,
                event.event_hash,
                event.created_by.to_string(),
                datetime_micros::to_string(&event.created_at),
                event.editor_signature,
            ],
        )
        .map_err(storage_err)?;

        tx.commit().map_err(storage_err)?;
        Ok(event)
    }

    fn get(&self, event_id: Uuid) -> LedgerResult<Option<LedgerEvent>> {
        Ok(self
            .query_events(
                "SELECT sequence_number, event_id, event_type, claim_id, payload,
                        previous_event_hash, event_hash, created_by, created_at,
                        editor_signature
                 FROM ledger_events WHERE event_id = ?1",
                params![event_id.to_string()],
            )?
            .pop())
    }

    fn get_by_sequence(&self, sequence: u64) -> LedgerResult<Option<LedgerEvent>> {
        Ok(self
            .query_events(
                "SELECT sequence_number, event_id, event_type, claim_id, payload,
                        previous_event_hash, event_hash, created_by, created_at,
                        editor_signature
                 FROM ledger_events WHERE sequence_number = ?1",
                params![sequence],
            )?
            .pop())
    }

    fn range(&self, start: u64, end: u64) -> LedgerResult<Vec<LedgerEvent>> {
        self.query_events(
            "SELECT sequence_number, event_id, event_type, claim_id, payload,
                    previous_event_hash, event_hash, created_by, created_at,
                    editor_signature
             FROM ledger_events
             WHERE sequence_number BETWEEN ?1 AND ?2
             ORDER BY sequence_number",
            params![start, end],
        )
    }

    fn head(&self) -> LedgerResult<ChainHead> {
        let conn = self.conn.lock();
        Self::head_of(&conn)
    }

    fn tail(&self) -> LedgerResult<Option<LedgerEvent>> {
        Ok(self
            .query_events(
                "SELECT sequence_number, event_id, event_type, claim_id, payload,
                        previous_event_hash, event_hash, created_by, created_at,
                        editor_signature
                 FROM ledger_events ORDER BY sequence_number DESC LIMIT 1",
                params![],
            )?
            .pop())
    }

    fn count(&self) -> LedgerResult<u64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM ledger_events", [], |row| row.get(0))
            .map_err(storage_err)
    }

    fn list_all(&self) -> LedgerResult<Vec<LedgerEvent>> {
        self.query_events(
            "SELECT sequence_number, event_id, event_type, claim_id, payload,
                    previous_event_hash, event_hash, created_by, created_at,
                    editor_signature
             FROM ledger_events ORDER BY sequence_number",
            params![],
        )
    }

    fn list_for_claim(&self, claim_id: Uuid) -> LedgerResult<Vec<LedgerEvent>> {
        self.query_events(
            "SELECT sequence_number, event_id, event_type, claim_id, payload,
                    previous_event_hash, event_hash, created_by, created_at,
                    editor_signature
             FROM ledger_events WHERE claim_id = ?1 ORDER BY sequence_number",
            params![claim_id.to_string()],
        )
    }
}
