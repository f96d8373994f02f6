//! Hash partitioning of table keys into scan segments.
//!
//! Several schedulers can split a table scan by each owning one segment.
//! Segments are disjoint and together cover every key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("segment {index} out of range for {total} total segments")]
pub struct SegmentError {
    pub index: u32,
    pub total: u32,
}

/// One shard of a partitioned scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    index: u32,
    total: u32,
}

impl Segment {
    pub fn new(index: u32, total: u32) -> Result<Self, SegmentError> {
        if total == 0 || index >= total {
            return Err(SegmentError { index, total });
        }
        Ok(Self { index, total })
    }

    /// The single segment covering the whole table.
    pub fn whole() -> Self {
        Self { index: 0, total: 1 }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn contains(&self, key: &str) -> bool {
        self.total == 1 || segment_of(key, self.total) == self.index
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::whole()
    }
}

/// Segment a key falls into out of `total`.
pub fn segment_of(key: &str, total: u32) -> u32 {
    if total <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(total)) as u32
}
