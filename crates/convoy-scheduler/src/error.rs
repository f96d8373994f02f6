//! Scheduler error types.

use convoy_core::SegmentError;
use convoy_store::StoreError;
use thiserror::Error;

/// Errors that end a reconciliation pass.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid scan segment: {0}")]
    Segment(#[from] SegmentError),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("assignment writes interrupted after {written} of {planned}: {source}")]
    PartialWrite {
        written: usize,
        planned: usize,
        #[source]
        source: StoreError,
    },
}

impl SchedulerError {
    /// Whether the next pass may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            SchedulerError::Segment(_) => false,
            SchedulerError::Store(e) => e.is_transient(),
            SchedulerError::PartialWrite { source, .. } => source.is_transient(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
