//! Error types for the transaction store.

use crate::types::TransactionId;
use serde::Serialize;
use thiserror::Error;

/// A transaction whose `date` could not be read as a calendar date.
///
/// Aggregation isolates these per record instead of failing, so the type is
/// cheap to clone and collect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
#[error("Malformed date {value:?} on transaction {id}")]
pub struct MalformedDate {
    pub id: TransactionId,
    pub value: String,
}

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate key: {0}")]
    DuplicateKey(TransactionId),

    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    #[error(transparent)]
    MalformedDate(#[from] MalformedDate),

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Category already exists: {0}")]
    CategoryExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported schema version {found} (supported up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

impl StoreError {
    /// True for failures of the storage engine itself.
    ///
    /// These are fatal for the current operation; callers may retry
    /// `open()` later. Key and data errors (`DuplicateKey`, `NotFound`,
    /// `MalformedDate`, ...) return false.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::StoreUnavailable(_)
                | StoreError::Io(_)
                | StoreError::Serialization(_)
                | StoreError::Deserialization(_)
                | StoreError::Corruption(_)
                | StoreError::ChecksumMismatch { .. }
                | StoreError::Locked
                | StoreError::InvalidFormat(_)
                | StoreError::UnsupportedSchema { .. }
        )
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
