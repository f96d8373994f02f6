//! Agent error types.

use convoy_core::RevisionHash;
use convoy_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The assignment names a revision with no revision row.
    #[error("assigned revision {0} does not exist")]
    UnknownRevision(RevisionHash),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("unit supervisor failed: {0}")]
    Supervisor(String),
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::UnknownRevision(_) => true,
            AgentError::Store(e) => e.is_transient(),
            AgentError::Supervisor(_) => false,
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
