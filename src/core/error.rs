use super::types::EntityKind;
use std::fmt;
use thiserror::Error;

/// Why a store operation gave up instead of completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another transaction wrote or deleted the same row first.
    WriteConflict,
    /// A table lock could not be acquired within `lock_timeout`.
    LockTimeout,
    /// No pooled connection became available within `connect_timeout`.
    PoolTimeout,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConflictReason::WriteConflict => "write conflict",
            ConflictReason::LockTimeout => "lock timeout",
            ConflictReason::PoolTimeout => "pool timeout",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },

    #[error("{kind} reference not found: missing ids {missing:?} (existing ids {existing:?})")]
    ReferenceNotFound {
        kind: EntityKind,
        missing: Vec<u64>,
        existing: Vec<u64>,
    },

    #[error("{reason}: {detail}")]
    ConflictOrTimeout {
        reason: ConflictReason,
        detail: String,
    },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl CatalogError {
    pub fn not_found(kind: EntityKind, id: impl Into<u64>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn write_conflict(detail: impl Into<String>) -> Self {
        Self::ConflictOrTimeout {
            reason: ConflictReason::WriteConflict,
            detail: detail.into(),
        }
    }

    pub fn timeout(reason: ConflictReason, detail: impl Into<String>) -> Self {
        Self::ConflictOrTimeout {
            reason,
            detail: detail.into(),
        }
    }

    /// Conflicts and timeouts may succeed when the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::ConflictOrTimeout { .. })
    }

    /// Errors caused by the request itself rather than by the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CatalogError::NotFound { .. } | CatalogError::ReferenceNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
