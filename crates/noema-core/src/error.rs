//! Error types for the storage engine and the core facade.
//!
//! Storage-level failures ([`StorageError`]) come out of rusqlite and the
//! on-disk layout; facade-level failures ([`CoreError`]) are the typed kinds
//! a caller of the operation surface (C9) is expected to branch on.

use thiserror::Error;

/// Low-level storage failure.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("initialization error: {0}")]
    Init(String),
    #[error("corrupt bloom sidecar: {0}")]
    BloomSidecar(String),
    #[error("pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by the core facade (C9), matching spec.md §7.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("invalid relation: {0}")]
    InvalidRelation(String),
    #[error("transaction already active")]
    TransactionAlreadyActive,
    #[error("no active transaction")]
    NoActiveTransaction,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("read pool exhausted")]
    PoolExhausted,
    #[error("service temporarily unavailable: circuit breaker open")]
    ServiceTemporarilyUnavailable,
    #[error("backup failed: {0}")]
    BackupFailed(String),
    #[error("restore failed: {0}")]
    RestoreFailed(String),
    #[error("storage corruption detected: {0}")]
    StorageCorruption(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(StorageError::Database(e))
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
