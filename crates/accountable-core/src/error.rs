// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use uuid::Uuid;

use crate::canonical::CanonicalError;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error surface of the ledger core.
///
/// Validation and lifecycle errors are recoverable at the caller's layer;
/// `HashChainBroken` and `DuplicateEventId` are retried internally by the
/// ledger service; `LedgerCorruption` is fatal and suspends writes until an
/// operator marks the ledger recovered.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("hash chain broken: {0}")]
    HashChainBroken(String),

    #[error("duplicate event id: {0}")]
    DuplicateEventId(Uuid),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("ledger corruption detected at sequence {0}; writes are suspended")]
    LedgerCorruption(u64),

    #[error("signature invalid")]
    SignatureInvalid,

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}
