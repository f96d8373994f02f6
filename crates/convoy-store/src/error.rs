//! Error types for the Convoy store adapter.
//!
//! Absence is not an error: lookups return `Option`. Everything that can
//! go wrong talking to the backend, including a call outliving its
//! timeout, surfaces as `Unavailable`.

use std::path::PathBuf;

use thiserror::Error;

use crate::tables::Table;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),

    /// Another handle, usually a running daemon, owns the database file.
    #[error("store {} is held by another process (is a convoyd daemon running?)", .0.display())]
    Locked(PathBuf),

    #[error("store unavailable during {op}: {reason}")]
    Unavailable { op: &'static str, reason: String },

    #[error("{table} item {key} already exists")]
    Conflict { table: Table, key: String },

    #[error("malformed {table} item: {reason}")]
    Malformed { table: Table, reason: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    pub(crate) fn malformed(table: Table, reason: impl Into<String>) -> Self {
        StoreError::Malformed {
            table,
            reason: reason.into(),
        }
    }
}
